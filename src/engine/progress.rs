//! Live progress state for one orchestrated collection.

use std::sync::Arc;

use serde::Serialize;

use crate::source::{CollectError, CollectedData};

/// Callback invoked synchronously on every progress change.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Mutable, process-local progress for a single collection call.
///
/// Lives only for the duration of the call; the orchestrator owns it and
/// mutates it from a single aggregation loop, so no locking is involved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Progress {
    /// Number of valid configs dispatched.
    pub total: usize,
    /// Configs that produced data.
    pub completed: usize,
    /// Configs that produced an error.
    pub failed: usize,
    /// Identifier of the most recently started config, if any.
    pub current: Option<String>,
    /// Every failure observed so far, validation errors included.
    pub errors: Vec<CollectError>,
}

impl Progress {
    /// Fresh progress over `total` dispatched configs, seeded with the
    /// validation failures that will never be dispatched.
    pub fn new(total: usize, errors: Vec<CollectError>) -> Self {
        Self {
            total,
            errors,
            ..Self::default()
        }
    }

    /// Share of dispatched configs that have settled, in percent.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed + self.failed) as f64 / self.total as f64 * 100.0
        }
    }

    /// Whether every dispatched config has settled.
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// Event sent by a collection task to the aggregation loop.
#[derive(Debug)]
pub(crate) enum TaskEvent {
    /// The task was admitted and is about to collect.
    Started { name: String },
    /// The task settled with data or an error.
    Finished {
        name: String,
        outcome: Result<CollectedData, CollectError>,
    },
}
