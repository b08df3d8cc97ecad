//! Buffer-health and ingestion statistics
//!
//! Counters are atomics so producer threads and diagnostics readers can touch
//! them without taking any registry lock. They never affect evaluation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters for one subject's frame buffer
#[derive(Debug, Default)]
pub struct BufferStats {
    frames_received: AtomicU64,
    frames_evicted: AtomicU64,
    underflows: AtomicU64,
    evaluations: AtomicU64,
    last_eval_delta: AtomicU64,
}

impl BufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.frames_evicted
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Request was older than the oldest buffered sample
    pub fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the requested-vs-resolved time delta of one evaluation
    pub fn record_evaluation(&self, delta: f64) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.last_eval_delta
            .store(delta.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BufferHealth {
        BufferHealth {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            underflows: self.underflows.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            last_eval_delta: f64::from_bits(self.last_eval_delta.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of [`BufferStats`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferHealth {
    /// Frames appended to the buffer
    pub frames_received: u64,
    /// Frames evicted because the buffer was full
    pub frames_evicted: u64,
    /// Evaluations that requested a time before the oldest sample
    pub underflows: u64,
    pub evaluations: u64,
    /// Resolved time minus requested time, in seconds, of the last evaluation
    pub last_eval_delta: f64,
}

/// Counters for the ingestion queue
#[derive(Debug, Default)]
pub struct QueueStats {
    statics_pushed: AtomicU64,
    frames_pushed: AtomicU64,
    statics_dropped: AtomicU64,
    frames_dropped: AtomicU64,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_static(&self, dropped: usize) {
        self.statics_pushed.fetch_add(1, Ordering::Relaxed);
        self.statics_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn record_frame(&self, dropped: usize) {
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.frames_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueHealth {
        QueueHealth {
            statics_pushed: self.statics_pushed.load(Ordering::Relaxed),
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            statics_dropped: self.statics_dropped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueHealth {
    pub statics_pushed: u64,
    pub frames_pushed: u64,
    /// Oldest pending static entries dropped on overflow
    pub statics_dropped: u64,
    /// Oldest pending frames dropped on overflow
    pub frames_dropped: u64,
}

/// Client-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Registered sources, virtual ones included
    pub sources: usize,
    /// Registered subjects, virtual ones included
    pub subjects: usize,
    /// Subjects in the current enabled snapshot
    pub enabled_subjects: usize,
    pub pending_static: usize,
    pub pending_frames: usize,
    pub queue: QueueHealth,
    /// Time since the client was created
    pub uptime: Duration,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }
}
