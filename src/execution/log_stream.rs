use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// One operator-facing message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Set once a reader has drained this entry
    pub consumed: bool,
}

/// Append-only log shared between the engine and an interface
///
/// Readers never iterate the live list: they copy out under the lock.
#[derive(Debug, Clone, Default)]
pub struct LogStream {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.lock().push(LogEntry {
            timestamp: Utc::now(),
            message,
            consumed: false,
        });
    }

    /// Return entries not yet consumed and mark them consumed
    pub fn take_unconsumed(&self) -> Vec<LogEntry> {
        let mut entries = self.lock();
        let mut fresh = Vec::new();
        for entry in entries.iter_mut().filter(|e| !e.consumed) {
            entry.consumed = true;
            fresh.push(LogEntry {
                consumed: false,
                ..entry.clone()
            });
        }
        fresh
    }

    /// Copy of every entry, consumed or not
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_unconsumed_once() {
        let logs = LogStream::new();
        logs.push("first");
        logs.push("second");

        let fresh = logs.take_unconsumed();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].message, "first");
        assert!(logs.take_unconsumed().is_empty());

        logs.push("third");
        let fresh = logs.take_unconsumed();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].message, "third");
    }

    #[test]
    fn test_snapshot_keeps_everything() {
        let logs = LogStream::new();
        logs.push("a");
        logs.take_unconsumed();
        logs.push("b");

        let all = logs.snapshot();
        assert_eq!(all.len(), 2);
        assert!(all[0].consumed);
        assert!(!all[1].consumed);
    }

    #[test]
    fn test_concurrent_appends() {
        use std::thread;

        let logs = LogStream::new();
        let writer = logs.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                writer.push(format!("w{}", i));
            }
        });

        let mut seen = 0;
        while seen < 100 {
            seen += logs.take_unconsumed().len();
            thread::yield_now();
        }
        handle.join().unwrap();

        assert_eq!(seen, 100);
        assert_eq!(logs.len(), 100);
    }
}
