use tactics_engine::{PresentationEvent, PresentationSink};
use tracing::{info, warn};

/// Writes every presentation event to the log as one JSON object.
#[derive(Debug, Default)]
pub(crate) struct LogSink {
    presented: u64,
}

impl LogSink {
    pub(crate) fn presented(&self) -> u64 {
        self.presented
    }
}

impl PresentationSink for LogSink {
    fn present(&mut self, events: &[PresentationEvent]) {
        for event in events {
            match serde_json::to_string(event) {
                Ok(json) => info!(actor = %event.actor(), event = %json, "presentation_event"),
                Err(error) => warn!(error = %error, "presentation_event_encode_failed"),
            }
        }
        self.presented += events.len() as u64;
    }
}
