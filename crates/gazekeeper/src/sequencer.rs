//! Condition event sequencing.
//!
//! Experimenters mark experimental conditions by label while a recording is
//! running. On the wire every condition becomes a `<label>.begin` /
//! `<label>.end` pair, with at most one condition open at any time and a
//! settle delay between consecutive events so the instrument processes one
//! before the next arrives. `close_on_stop` guarantees no span is left open
//! in a saved recording.

use std::time::Duration;

use tracing::info;

use crate::instrument::{Instrument, InstrumentError};

/// Tracks the currently open condition and emits well-formed event pairs.
pub struct ConditionSequencer {
    current: Option<String>,
    /// Delay between a `.end` and the following `.begin` on a label switch.
    switch_settle: Duration,
    /// Delay after the closing `.end` before the stop RPC may be issued.
    close_settle: Duration,
}

impl ConditionSequencer {
    pub fn new(switch_settle: Duration, close_settle: Duration) -> Self {
        Self {
            current: None,
            switch_settle,
            close_settle,
        }
    }

    /// Label of the currently open condition, if any.
    pub fn open_label(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Forget any open condition without emitting events. Called when a
    /// recording session ends outside the normal stop path.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Process one condition command.
    ///
    /// - no open condition: emit `<label>.begin`
    /// - same label already open: no-op (repeats never re-emit)
    /// - different label open: emit `<current>.end`, settle, emit
    ///   `<label>.begin`
    pub async fn send_condition(
        &mut self,
        device: &dyn Instrument,
        label: &str,
    ) -> Result<(), InstrumentError> {
        match self.current.as_deref() {
            None => {
                device.send_event(&format!("{label}.begin"))?;
                info!("condition '{}' opened", label);
                self.current = Some(label.to_string());
            }
            Some(current) if current == label => {}
            Some(current) => {
                let closing = format!("{current}.end");
                device.send_event(&closing)?;
                info!("condition '{}' closed", current);
                // Nothing is open between the .end and the next .begin; if the
                // .begin fails below we must not believe a span is still open.
                self.current = None;
                tokio::time::sleep(self.switch_settle).await;
                device.send_event(&format!("{label}.begin"))?;
                info!("condition '{}' opened", label);
                self.current = Some(label.to_string());
            }
        }
        Ok(())
    }

    /// Close any open condition ahead of a stop-and-save RPC, with a settle
    /// delay so the `.end` lands in the recording before it is finalized.
    pub async fn close_on_stop(
        &mut self,
        device: &dyn Instrument,
    ) -> Result<(), InstrumentError> {
        if let Some(current) = self.current.take() {
            device.send_event(&format!("{current}.end"))?;
            info!("condition '{}' closed for stop", current);
            tokio::time::sleep(self.close_settle).await;
        }
        Ok(())
    }
}
