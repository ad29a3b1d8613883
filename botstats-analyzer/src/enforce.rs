//! Submitting a block plan to a rule sink.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::consolidate::{BlockPlan, PlannedBlock};
use crate::prefix::BlockTarget;

/// Errors from a rule sink.
#[derive(Debug, thiserror::Error)]
pub enum RuleSinkError {
    #[error("rule for {target} rejected: {message}")]
    Rejected { target: String, message: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },
}

/// Where block targets are installed (a firewall, in production).
pub trait RuleSink {
    /// Install a temporary block for `target`.
    fn submit(&mut self, target: &BlockTarget) -> Result<(), RuleSinkError>;

    /// Remove blocks whose duration has elapsed; returns how many were removed.
    fn cleanup_expired(&mut self) -> Result<usize, RuleSinkError>;
}

/// Counts from one [`submit_plan`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub submitted: usize,
    pub failed: usize,
}

impl SubmissionSummary {
    pub fn attempted(&self) -> usize {
        self.submitted + self.failed
    }
}

/// Submit every planned block once, in order.
///
/// A failure is passed to `on_outcome` and does not stop later submissions.
pub fn submit_plan<S, F>(plan: &BlockPlan, sink: &mut S, mut on_outcome: F) -> SubmissionSummary
where
    S: RuleSink + ?Sized,
    F: FnMut(&PlannedBlock, &Result<(), RuleSinkError>),
{
    let mut summary = SubmissionSummary::default();
    for block in &plan.blocks {
        let result = sink.submit(&block.target);
        match result {
            Ok(()) => summary.submitted += 1,
            Err(_) => summary.failed += 1,
        }
        on_outcome(block, &result);
    }
    summary
}

/// In-memory sink that records submissions.
/// Cloning creates a new handle to the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    submitted: Arc<Mutex<Vec<BlockTarget>>>,
    reject: Arc<Mutex<HashSet<String>>>,
    expired: Arc<Mutex<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject submissions whose display form equals `target`.
    pub fn reject(&self, target: impl Into<String>) {
        self.reject.lock().unwrap().insert(target.into());
    }

    /// Number of rules the next cleanup reports as removed.
    pub fn set_expired(&self, count: usize) {
        *self.expired.lock().unwrap() = count;
    }

    /// Targets accepted so far, in order.
    pub fn submitted(&self) -> Vec<BlockTarget> {
        self.submitted.lock().unwrap().clone()
    }
}

impl RuleSink for RecordingSink {
    fn submit(&mut self, target: &BlockTarget) -> Result<(), RuleSinkError> {
        let display = target.to_string();
        if self.reject.lock().unwrap().contains(&display) {
            return Err(RuleSinkError::Rejected {
                target: display,
                message: "rejected by test sink".to_string(),
            });
        }
        self.submitted.lock().unwrap().push(*target);
        Ok(())
    }

    fn cleanup_expired(&mut self) -> Result<usize, RuleSinkError> {
        Ok(std::mem::take(&mut *self.expired.lock().unwrap()))
    }
}
