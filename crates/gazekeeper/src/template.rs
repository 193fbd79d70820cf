//! Metadata template filling - best-effort, never fatal to `start`.
//!
//! The device carries a fillable template describing the acquisition. Before
//! a recording starts the known fields are answered from the start command's
//! identifiers. Per-field validation failures are logged and the field is
//! omitted; a missing template or a failed submission only costs metadata,
//! never the recording.

use std::collections::HashMap;

use tracing::{debug, warn};

use gazeproto::Command;

use crate::instrument::Instrument;

/// Fill and submit the device's metadata template from the start command.
pub fn submit_best_effort(device: &dyn Instrument, command: &Command) {
    let template = match device.template() {
        Ok(template) => template,
        Err(e) => {
            warn!("metadata template unavailable: {}", e);
            return;
        }
    };

    let mut answers = HashMap::new();
    for item in &template.items {
        let value = match item.title.as_str() {
            "Subject ID" => command.subject_id,
            "Session ID" => command.session_id,
            "Acquisition ID" => command.acquisition_id,
            _ => {
                debug!("template field '{}' has no mapping; skipping", item.title);
                continue;
            }
        };
        // Absent identifiers still answer the field, as -1.
        let answer = value.unwrap_or(-1).to_string();

        match device.validate_answer(item, &answer) {
            Ok(()) => {
                answers.insert(item.id.clone(), answer);
            }
            Err(reason) => {
                warn!(
                    "template field '{}' rejected answer '{}': {}",
                    item.title, answer, reason
                );
            }
        }
    }

    if answers.is_empty() {
        debug!("no template answers to submit");
        return;
    }

    if let Err(e) = device.post_template_answers(answers) {
        warn!("metadata template submission failed: {}", e);
    }
}
