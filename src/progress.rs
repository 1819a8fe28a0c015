use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Phase of a stitching run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Loading,
    Downloading,
    Processing,
    Finalizing,
    Complete,
    Error,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingStage::Loading => "loading",
            ProcessingStage::Downloading => "downloading",
            ProcessingStage::Processing => "processing",
            ProcessingStage::Finalizing => "finalizing",
            ProcessingStage::Complete => "complete",
            ProcessingStage::Error => "error",
        };
        f.write_str(name)
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub stage: ProcessingStage,
    /// 0..=100
    pub progress: u8,
    pub message: String,
}

pub type ProgressCallback = Arc<dyn Fn(ProcessingProgress) + Send + Sync>;

/// Forwards progress events to an optional caller-supplied callback
///
/// Every event is mirrored to `tracing` at debug level. Panics raised by the
/// callback propagate to the caller.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit<M: Into<String>>(&self, stage: ProcessingStage, progress: u8, message: M) {
        let event = ProcessingProgress {
            stage,
            progress: progress.min(100),
            message: message.into(),
        };
        debug!("[{} {:>3}%] {}", event.stage, event.progress, event.message);

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

/// `floor(done / total * 100)`, with an empty workload counting as finished
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) as u128 * 100 / total as u128) as u8
}

/// Decides when a `Processing` event is due
///
/// An event fires every `interval` frames and once more when the last frame
/// is done, so 100% is reported exactly once.
#[derive(Debug, Clone)]
pub struct FrameProgress {
    total: u64,
    interval: u64,
    processed: u64,
}

impl FrameProgress {
    pub fn new(total: u64, interval: u64) -> Self {
        Self {
            total,
            interval: interval.max(1),
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count one frame; returns the percentage to report when an event is due
    pub fn advance(&mut self) -> Option<u8> {
        self.processed += 1;
        let finished = self.processed == self.total;
        if finished || (self.processed < self.total && self.processed % self.interval == 0) {
            Some(percent(self.processed, self.total))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_percent_floors() {
        assert_eq!(percent(0, 420), 0);
        assert_eq!(percent(10, 420), 2);
        assert_eq!(percent(419, 420), 99);
        assert_eq!(percent(420, 420), 100);
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(u64::MAX, u64::MAX), 100);
        assert_eq!(percent(u64::MAX / 2, u64::MAX), 49);
    }

    #[test]
    fn test_frame_progress_reports_completion_once() {
        let mut tracker = FrameProgress::new(25, 10);
        let reported: Vec<u8> = (0..25).filter_map(|_| tracker.advance()).collect();
        assert_eq!(reported, vec![40, 80, 100]);
    }

    #[test]
    fn test_frame_progress_does_not_double_report_on_interval_boundary() {
        let mut tracker = FrameProgress::new(20, 10);
        let reported: Vec<u8> = (0..20).filter_map(|_| tracker.advance()).collect();
        assert_eq!(reported, vec![50, 100]);
    }

    #[test]
    fn test_reporter_forwards_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = ProgressReporter::new(Some(Arc::new(move |p: ProcessingProgress| {
            sink.lock().unwrap().push(p);
        })));

        reporter.emit(ProcessingStage::Finalizing, 250, "Encoding video...");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, ProcessingStage::Finalizing);
        assert_eq!(events[0].progress, 100);
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&ProcessingStage::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
