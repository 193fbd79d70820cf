//! Mock instrument driver - a scriptable simulator.
//!
//! Doubles as the default driver for running the agent without hardware and
//! as the test double for the controller, sequencer, and health monitor
//! suites. Behavior is scripted per-instance: connectivity flips, RPC
//! failures, and estimation that succeeds, fails, or hangs past the deadline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    Discovery, Instrument, InstrumentError, OffsetStats, Template, TemplateItem,
    TimeOffsetEstimate,
};

/// Scripted behavior for `estimate_time_offset`.
#[derive(Debug, Clone)]
pub enum EstimateBehavior {
    Succeed(TimeOffsetEstimate),
    Fail(String),
    /// Block the calling thread for the given duration before returning,
    /// simulating a transport-layer hang.
    Hang(Duration),
}

/// A plausible estimation result for tests and simulation.
pub fn sample_estimate() -> TimeOffsetEstimate {
    TimeOffsetEstimate {
        time_offset_ms: OffsetStats {
            mean: -1.4,
            std: 0.3,
            median: -1.3,
        },
        roundtrip_ms: OffsetStats {
            mean: 6.8,
            std: 1.2,
            median: 6.5,
        },
    }
}

fn default_template() -> Template {
    Template {
        items: vec![
            TemplateItem {
                id: "subject".to_string(),
                title: "Subject ID".to_string(),
            },
            TemplateItem {
                id: "session".to_string(),
                title: "Session ID".to_string(),
            },
            TemplateItem {
                id: "acquisition".to_string(),
                title: "Acquisition ID".to_string(),
            },
        ],
    }
}

/// Simulated instrument handle with an ordered call log.
pub struct MockInstrument {
    connected: AtomicBool,
    probe_error: Mutex<Option<String>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    estimate: Mutex<EstimateBehavior>,
    estimate_calls: AtomicUsize,
    template: Mutex<Template>,
    rejected_titles: Mutex<Vec<String>>,
    posted_answers: Mutex<Option<HashMap<String, String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockInstrument {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            probe_error: Mutex::new(None),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            estimate: Mutex::new(EstimateBehavior::Succeed(sample_estimate())),
            estimate_calls: AtomicUsize::new(0),
            template: Mutex::new(default_template()),
            rejected_titles: Mutex::new(Vec::new()),
            posted_answers: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn log(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    /// Full ordered call log, e.g. `["recording_start", "event:A.begin"]`.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Labels of the events sent, in order.
    pub fn events(&self) -> Vec<String> {
        self.call_log()
            .iter()
            .filter_map(|c| c.strip_prefix("event:").map(str::to_string))
            .collect()
    }

    pub fn estimate_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
    }

    pub fn posted_answers(&self) -> Option<HashMap<String, String>> {
        self.posted_answers.lock().unwrap().clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the next probes raise instead of reporting a clean false.
    pub fn set_probe_error(&self, message: impl Into<String>) {
        *self.probe_error.lock().unwrap() = Some(message.into());
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    pub fn set_estimate(&self, behavior: EstimateBehavior) {
        *self.estimate.lock().unwrap() = behavior;
    }

    pub fn set_template(&self, template: Template) {
        *self.template.lock().unwrap() = template;
    }

    /// Make `validate_answer` reject any item with the given title.
    pub fn reject_title(&self, title: impl Into<String>) {
        self.rejected_titles.lock().unwrap().push(title.into());
    }
}

impl Default for MockInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrument for MockInstrument {
    fn is_connected(&self) -> Result<bool, InstrumentError> {
        self.log("probe");
        if let Some(message) = self.probe_error.lock().unwrap().clone() {
            return Err(InstrumentError::Probe(message));
        }
        Ok(self.connected.load(Ordering::SeqCst))
    }

    fn recording_start(&self) -> Result<String, InstrumentError> {
        self.log("recording_start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(InstrumentError::Rpc("recording refused".to_string()));
        }
        Ok("rec-0001".to_string())
    }

    fn recording_stop_and_save(&self) -> Result<(), InstrumentError> {
        self.log("stop_and_save");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(InstrumentError::Rpc("save failed".to_string()));
        }
        Ok(())
    }

    fn send_event(&self, label: &str) -> Result<(), InstrumentError> {
        self.log(format!("event:{}", label));
        Ok(())
    }

    fn estimate_time_offset(&self) -> Result<TimeOffsetEstimate, InstrumentError> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        self.log("estimate");
        let behavior = self.estimate.lock().unwrap().clone();
        match behavior {
            EstimateBehavior::Succeed(estimate) => Ok(estimate),
            EstimateBehavior::Fail(message) => Err(InstrumentError::Rpc(message)),
            EstimateBehavior::Hang(duration) => {
                std::thread::sleep(duration);
                Err(InstrumentError::Rpc(
                    "estimate returned after the deadline".to_string(),
                ))
            }
        }
    }

    fn template(&self) -> Result<Template, InstrumentError> {
        Ok(self.template.lock().unwrap().clone())
    }

    fn validate_answer(&self, item: &TemplateItem, _answer: &str) -> Result<(), String> {
        if self
            .rejected_titles
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == &item.title)
        {
            Err(format!("value rejected for '{}'", item.title))
        } else {
            Ok(())
        }
    }

    fn post_template_answers(
        &self,
        answers: HashMap<String, String>,
    ) -> Result<(), InstrumentError> {
        self.log("template_posted");
        *self.posted_answers.lock().unwrap() = Some(answers);
        Ok(())
    }

    fn close(&self) {
        self.log("close");
    }
}

/// Discovery that hands out a preconfigured simulated device.
pub struct MockDiscovery {
    device: Mutex<Option<Arc<MockInstrument>>>,
    attempts: AtomicUsize,
}

impl MockDiscovery {
    /// Discovery with a fresh simulated device, for the `mock` driver.
    pub fn simulated() -> Self {
        Self::with_device(Arc::new(MockInstrument::new()))
    }

    pub fn with_device(device: Arc<MockInstrument>) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Discovery that never finds a device.
    pub fn empty() -> Self {
        Self {
            device: Mutex::new(None),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_device(&self, device: Option<Arc<MockInstrument>>) {
        *self.device.lock().unwrap() = device;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Discovery for MockDiscovery {
    fn discover(&self, timeout: Duration) -> Result<Arc<dyn Instrument>, InstrumentError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.device.lock().unwrap().clone() {
            Some(device) => Ok(device),
            None => Err(InstrumentError::NotFound(timeout)),
        }
    }
}
