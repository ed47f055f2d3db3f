//! Lifecycle events emitted by the core.
//!
//! Components never touch presentation state. They report what happened
//! through an [`EventSink`] and the front-end decides what to enable,
//! disable or print.

use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::models::ArtifactKind;
use crate::transcribe::RunOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Transient message meant for a status line
    Status(String),

    AcquisitionStarted { model: String },
    DownloadStarted { artifact: ArtifactKind, url: String, size_bytes: Option<u64> },
    DownloadProgress { fraction: f64 },
    DownloadCompleted { path: PathBuf },
    DownloadFailed { error: String },
    ExtractionStarted { archive: PathBuf },
    ExtractionCompleted { bundle: PathBuf },
    AcquisitionEnded { model: String, success: bool },

    TranscriptionStarted { argv: Vec<String> },
    ProcessOutput { line: String },
    TranscriptionFinished(RunOutcome),

    TranslationStarted { source: PathBuf },
    TranslationEnded { output: Option<PathBuf> },
}

/// Receiver of lifecycle events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events to an async consumer, typically the CLI renderer
pub struct ChannelSink {
    tx: UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        // The receiver going away only means nobody renders any more
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Status(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(Event::Status("one".to_string()));
        sink.emit(Event::DownloadProgress { fraction: 0.5 });
        sink.emit(Event::Status("two".to_string()));

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.statuses(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.emit(Event::Status("hello".to_string()));
        assert_eq!(rx.recv().await, Some(Event::Status("hello".to_string())));

        drop(rx);
        sink.emit(Event::Status("nobody listens".to_string()));
    }
}
