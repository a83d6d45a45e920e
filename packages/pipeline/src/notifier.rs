//! Progress notification.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use distort_core::{JobId, ProgressEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Receives status text for a job and renders it somewhere.
///
/// Calls are fire-and-forget: an implementation must not block and must
/// swallow its own delivery failures (a deleted status message, a closed
/// channel). Nothing a notifier does can fail a pipeline.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, job_id: JobId, text: &str);
}

impl<F> Notifier for F
where
    F: Fn(JobId, &str) + Send + Sync + 'static,
{
    fn notify(&self, job_id: JobId, text: &str) {
        self(job_id, text)
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _job_id: JobId, _text: &str) {}
}

/// Writes updates to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    label: Option<String>,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, job_id: JobId, text: &str) {
        match &self.label {
            Some(label) => tracing::info!(job = %job_id, "{}: {}", label, text),
            None => tracing::info!(job = %job_id, "{}", text),
        }
    }
}

/// Forwards updates as [`ProgressEvent`]s over a bounded channel.
///
/// A full or closed channel drops the update.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, job_id: JobId, text: &str) {
        if let Err(e) = self.tx.try_send(ProgressEvent::new(job_id, text)) {
            tracing::debug!(job = %job_id, "Dropped progress update: {}", e);
        }
    }
}

/// Per-job progress handle given to stages.
///
/// `announce` always goes through; `report` is rate limited to one update
/// per interval so per-frame loops don't flood the notifier.
#[derive(Clone)]
pub struct Progress {
    job_id: JobId,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    last_report: Arc<Mutex<Option<Instant>>>,
}

impl Progress {
    pub fn new(job_id: JobId, notifier: Arc<dyn Notifier>, interval: Duration) -> Self {
        Self {
            job_id,
            notifier,
            interval,
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Send a status update unconditionally.
    pub fn announce(&self, text: &str) {
        self.notifier.notify(self.job_id, text);
    }

    /// Send a status update unless one was reported less than an interval
    /// ago. Returns whether the update was sent.
    pub fn report(&self, text: &str) -> bool {
        let now = Instant::now();
        {
            let mut last = self
                .last_report
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.is_some_and(|at| now.duration_since(at) < self.interval) {
                return false;
            }
            *last = Some(now);
        }
        self.announce(text);
        true
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("job_id", &self.job_id)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (Arc<Mutex<Vec<String>>>, Arc<dyn Notifier>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier = move |_job_id: JobId, text: &str| {
            sink.lock().unwrap().push(text.to_string());
        };
        (seen, Arc::new(notifier))
    }

    #[tokio::test(start_paused = true)]
    async fn report_is_throttled() {
        let (seen, notifier) = recording();
        let progress = Progress::new(JobId::new(), notifier, Duration::from_secs(5));

        assert!(progress.report("Distorting frames (0%)"));
        assert!(!progress.report("Distorting frames (1%)"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!progress.report("Distorting frames (2%)"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(progress.report("Distorting frames (40%)"));

        // Announcements bypass the throttle.
        progress.announce("Creating a video...");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "Distorting frames (0%)",
                "Distorting frames (40%)",
                "Creating a video...",
            ]
        );
    }

    #[tokio::test]
    async fn channel_notifier_survives_closed_receiver() {
        let (notifier, mut rx) = ChannelNotifier::channel(1);
        let job_id = JobId::new();

        notifier.notify(job_id, "Downloading...");
        // Buffer full: dropped, not blocked.
        notifier.notify(job_id, "Verifying...");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, job_id);
        assert_eq!(event.text, "Downloading...");

        drop(rx);
        notifier.notify(job_id, "Sending...");
    }
}
