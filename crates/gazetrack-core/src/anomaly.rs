//! Anomaly event log.
//!
//! A multi-producer / multi-consumer FIFO of timestamped classifications.
//! Producers never block: with a bounded capacity the newest record is
//! dropped and counted when the queue is full.

use crate::types::EyeSide;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// No face or landmarks in the frame.
    NotFound,
    /// Landmarks present but one eye's geometry is degenerate.
    EyeNotLocatable { side: EyeSide },
    /// Eyes have read as closed for `frames` consecutive frames.
    BlinkSustained { frames: u32 },
}

impl AnomalyKind {
    pub fn classification(&self) -> &'static str {
        match self {
            AnomalyKind::NotFound => "not found",
            AnomalyKind::EyeNotLocatable { .. } => "eye not locatable",
            AnomalyKind::BlinkSustained { .. } => "blink sustained",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub kind: AnomalyKind,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp.to_rfc3339(), self.kind.classification())?;
        match &self.kind {
            AnomalyKind::EyeNotLocatable { side } => write!(f, " ({side})"),
            AnomalyKind::BlinkSustained { frames } => write!(f, " ({frames} frames)"),
            AnomalyKind::NotFound => Ok(()),
        }
    }
}

/// Create a connected producer/consumer pair.
pub fn channel(capacity: Option<usize>) -> (AnomalySink, AnomalyDrain) {
    let (tx, rx) = match capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    (
        AnomalySink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        AnomalyDrain { rx },
    )
}

/// Producer handle. Clones share the same queue and drop counter.
#[derive(Clone)]
pub struct AnomalySink {
    tx: Sender<Anomaly>,
    dropped: Arc<AtomicU64>,
}

impl AnomalySink {
    /// Timestamp `kind` and enqueue it. Returns the record whether or not it was queued.
    pub fn push(&self, kind: AnomalyKind) -> Anomaly {
        let record = Anomaly {
            timestamp: Utc::now(),
            kind,
        };
        match self.tx.try_send(record.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "anomaly queue full; record dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("anomaly queue has no consumers; record discarded");
            }
        }
        record
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer handle. Clones compete for records; each record is delivered once.
#[derive(Clone)]
pub struct AnomalyDrain {
    rx: Receiver<Anomaly>,
}

impl AnomalyDrain {
    /// Take every record currently queued, oldest first, without blocking.
    pub fn drain(&self) -> Vec<Anomaly> {
        self.rx.try_iter().collect()
    }

    /// Blocking iterator that ends once every producer has been dropped.
    pub fn iter(&self) -> impl Iterator<Item = Anomaly> + '_ {
        self.rx.iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
