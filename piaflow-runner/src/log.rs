//! Run log buffer
//!
//! Collects the user-facing log of one run. The buffer is owned by the
//! executing task, only grows, and pushes its full contents to an optional
//! observer after every state change so the persisted copy stays current.
//! NUL characters never enter the buffer; text stores reject them.

use async_trait::async_trait;
use std::borrow::Cow;
use std::sync::Arc;

/// Marker written once every step has succeeded
pub const PIPELINE_COMPLETED: &str = "pipeline completed successfully";

/// Prefix of the line carrying the synced commit
pub const COMMIT_PREFIX: &str = "commit: ";

/// Marker opening a step's section of the log
pub fn step_header(name: &str) -> String {
    format!("=== Step: {} ===", name)
}

/// Marker closing a successful step
pub fn step_ok(name: &str) -> String {
    format!("{} step OK", name)
}

/// Marker closing a failed step
pub fn step_failed(name: &str, error: &dyn std::fmt::Display) -> String {
    format!("{} step failed: {}", name, error)
}

/// Finds the last commit line written to a log
pub fn find_commit(log: &str) -> Option<String> {
    log.lines()
        .rev()
        .filter_map(|line| line.trim().strip_prefix(COMMIT_PREFIX))
        .map(str::trim)
        .find(|sha| !sha.is_empty())
        .map(str::to_string)
}

/// Replaces NUL with U+FFFD
fn scrub(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', "\u{FFFD}"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Receives the cumulative log whenever it changes
#[async_trait]
pub trait LogObserver: Send + Sync {
    /// Called with the full log so far, not a delta
    async fn log_updated(&self, log: &str);
}

/// Append-only log of one run
pub struct RunLog {
    buffer: String,
    observer: Option<Arc<dyn LogObserver>>,
}

impl RunLog {
    /// Creates a log without an observer
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            observer: None,
        }
    }

    /// Creates a log that streams to `observer`
    pub fn with_observer(observer: Option<Arc<dyn LogObserver>>) -> Self {
        Self {
            buffer: String::new(),
            observer,
        }
    }

    /// Appends a line and notifies the observer
    pub async fn line(&mut self, line: impl AsRef<str>) {
        self.buffer.push_str(&scrub(line.as_ref()));
        self.buffer.push('\n');
        self.flush().await;
    }

    /// Appends raw subprocess output without notifying
    pub fn push_output(&mut self, output: &str) {
        self.buffer.push_str(&scrub(output));
    }

    /// Appends a block separated from existing text by a blank line
    pub async fn block(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push_str("\n\n");
        }
        self.buffer.push_str(&scrub(text));
        self.flush().await;
    }

    /// Adopts a newer snapshot of a remote log
    ///
    /// Returns `true` and notifies when the snapshot differs from the
    /// current contents.
    pub async fn sync_snapshot(&mut self, snapshot: &str) -> bool {
        let snapshot = scrub(snapshot);
        if *snapshot == self.buffer {
            return false;
        }
        self.buffer.clear();
        self.buffer.push_str(&snapshot);
        self.flush().await;
        true
    }

    /// Pushes the current contents to the observer
    pub async fn flush(&self) {
        if let Some(observer) = &self.observer {
            observer.log_updated(&self.buffer).await;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}
