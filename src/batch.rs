use std::fmt::Display;

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub entity: String,
    pub error: String,
}

/// Outcome of a loop over many students, groups or repositories. One entity
/// failing never stops the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub operation: String,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn success(&mut self, entity: impl Into<String>) {
        let entity = entity.into();
        info!("{}: {entity} done", self.operation);
        self.succeeded.push(entity);
    }

    pub fn skip(&mut self, entity: impl Into<String>, reason: &str) {
        let entity = entity.into();
        info!("{}: skipping {entity} ({reason})", self.operation);
        self.skipped.push(entity);
    }

    pub fn failure(&mut self, entity: impl Into<String>, error: impl Display) {
        let entity = entity.into();
        // `{:#}` keeps the whole anyhow context chain on one line.
        let error = format!("{error:#}");
        warn!("{}: {entity} failed: {error}", self.operation);
        self.failed.push(BatchFailure { entity, error });
    }

    /// Records the outcome of one entity's work.
    pub fn record<T, E: Display>(&mut self, entity: impl Into<String>, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => {
                self.success(entity);
                Some(value)
            }
            Err(err) => {
                self.failure(entity, err);
                None
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} succeeded, {} skipped, {} failed",
            self.operation,
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}
