//! Rate limiting for diagnostics
//!
//! A misbehaving producer can submit thousands of bad samples per second.
//! [`LogOnce`] reports each distinct (reason, subject) pair a single time and
//! [`LogThrottle`] caps a recurring warning to one emission per interval.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::registry::SubjectKey;

/// Remembers which (reason, subject) pairs were already reported
#[derive(Debug, Default)]
pub struct LogOnce {
    seen: Mutex<HashSet<(&'static str, Option<SubjectKey>)>>,
}

impl LogOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a pair is seen
    pub fn first(&self, reason: &'static str, key: Option<&SubjectKey>) -> bool {
        self.seen.lock().insert((reason, key.cloned()))
    }

    /// Forget everything reported for one subject
    pub fn forget(&self, key: &SubjectKey) {
        self.seen
            .lock()
            .retain(|(_, seen)| seen.as_ref() != Some(key));
    }
}

/// Lets one message through per interval and counts the rest
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Returns the number of suppressed events when a message may be emitted
    pub fn ready(&self) -> Option<u64> {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                *last = Some(now);
                Some(self.suppressed.swap(0, Ordering::Relaxed))
            }
        }
    }
}
