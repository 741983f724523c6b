//! Shared fixtures for the integration suites

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use steadyload::{DelayPolicy, EventSink, LoadEvent, LoaderOptions, RetryPolicy};

/// Policy with the built-in classifier and a fixed delay.
pub fn fixed_policy(max_retries: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .delay(DelayPolicy::fixed_ms(delay_ms))
        .build()
}

/// Loader options without watchdog or indicator floor.
pub fn bare_options(max_retries: u32, delay_ms: u64) -> LoaderOptions {
    LoaderOptions::default()
        .with_policy(fixed_policy(max_retries, delay_ms))
        .with_timeout(None)
        .with_min_display(Duration::ZERO)
}

/// Collects every emitted event.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<LoadEvent>>>,
}

impl EventLog {
    pub fn sink(&self) -> EventSink {
        let events = Arc::clone(&self.events);
        EventSink::new(move |event| events.lock().unwrap().push(event.clone()))
    }

    pub fn events(&self) -> Vec<LoadEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&LoadEvent) -> bool) -> usize {
        self.events().iter().filter(|event| matches(event)).count()
    }
}
