use std::sync::{Arc, Mutex};

use checktree::status::{EventSink, RunEvent};

/// Sink that stores every published event for later assertion.
pub struct CollectingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of leaves for which a given predicate matched, in publish order.
    pub fn names_matching(&self, predicate: impl Fn(&RunEvent) -> Option<&str>) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| predicate(event).map(str::to_string))
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: RunEvent) {
        self.events.lock().unwrap().push(event);
    }
}
