pub mod calculator;
pub mod late_days;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::records::{GroupRecord, StudentRecord};

pub use calculator::{compute, distribution, export_rows, Gradebook};

/// Everything the calculator needs, already fetched and aggregated.
#[derive(Debug, Clone, Default)]
pub struct GradebookInputs {
    pub students: Vec<StudentRecord>,
    pub groups: Vec<GroupRecord>,
    /// assignment id -> github -> total
    pub assignments: BTreeMap<String, BTreeMap<String, u32>>,
    pub quiz: BTreeMap<String, u32>,
    /// iteration id -> group id -> total
    pub iterations: BTreeMap<String, BTreeMap<String, u32>>,
    /// (assignment id, github) -> late days
    pub late_days: BTreeMap<(String, String), u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentResult {
    pub assignment: String,
    pub score: u32,
    pub late_days: u32,
    pub ignored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationResult {
    pub iteration: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalGradeRecord {
    pub github: String,
    pub hopkins: String,
    pub assignments: Vec<AssignmentResult>,
    pub late_days: u32,
    pub late_days_penalty: f64,
    pub assignments_average: f64,
    pub assignments_total: f64,
    pub quiz: u32,
    pub group: Option<String>,
    pub iterations: Vec<IterationResult>,
    pub iterations_total: f64,
    pub project: f64,
    pub adjustment: f64,
    pub project_total: f64,
    pub weighted: f64,
    pub letter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupGradeRecord {
    pub identifier: String,
    pub members: Vec<String>,
    pub iterations: Vec<IterationResult>,
    pub iterations_total: f64,
    pub project: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionRow {
    pub letter: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub hopkins: String,
    pub grade: String,
}

/// Orders identifiers numerically when both are numbers, textually otherwise.
pub fn compare_sequence(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering_is_numeric() {
        let mut ids = vec!["10", "2", "final", "1"];
        ids.sort_by(|a, b| compare_sequence(a, b));
        assert_eq!(ids, vec!["1", "2", "10", "final"]);
    }
}
