use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use super::{
    compare_sequence, AssignmentResult, DistributionRow, ExportRow, FinalGradeRecord,
    GradebookInputs, GroupGradeRecord, IterationResult,
};
use crate::config::{Cutoff, GradingPolicy};
use crate::records::GroupRecord;

// Keeps 92.99999999 from missing a 93 cutoff.
const CUTOFF_EPSILON: f64 = 1e-9;

pub const UNSET_LETTER: &str = "unset";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gradebook {
    pub assignments: Vec<String>,
    pub iterations: Vec<String>,
    pub students: Vec<FinalGradeRecord>,
    pub groups: Vec<GroupGradeRecord>,
}

pub fn compute(inputs: &GradebookInputs, policy: &GradingPolicy) -> Gradebook {
    let assignments = sorted_ids(inputs.assignments.keys());
    let iterations = sorted_ids(inputs.iterations.keys());

    let groups = latest_groups(&inputs.groups)
        .into_iter()
        .map(|group| {
            let scores = iteration_scores(&iterations, &inputs.iterations, &group.identifier);
            let (iterations_total, project) = summarize_iterations(&scores);
            GroupGradeRecord {
                identifier: group.identifier.clone(),
                members: group.members.clone(),
                iterations: scores,
                iterations_total,
                project,
            }
        })
        .collect::<Vec<_>>();

    let students = inputs
        .students
        .iter()
        .map(|student| {
            let group = groups.iter().find(|g| g.members.iter().any(|m| m == &student.github));
            if group.is_none() {
                warn!(
                    "{} is not in any group; iteration and project scores are 0",
                    student.github
                );
            }
            compute_student(
                &student.github,
                &student.hopkins,
                &assignments,
                inputs,
                group,
                policy,
            )
        })
        .collect();

    Gradebook {
        assignments,
        iterations,
        students,
        groups,
    }
}

fn sorted_ids<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut ids = ids.cloned().collect::<Vec<_>>();
    ids.sort_by(|a, b| compare_sequence(a, b));
    ids
}

/// One record per group identifier; a later record replaces an earlier one.
fn latest_groups(records: &[GroupRecord]) -> Vec<&GroupRecord> {
    let mut latest: Vec<&GroupRecord> = Vec::new();
    for record in records {
        match latest.iter_mut().find(|g| g.identifier == record.identifier) {
            Some(slot) => *slot = record,
            None => latest.push(record),
        }
    }
    latest
}

fn iteration_scores(
    iterations: &[String],
    totals: &BTreeMap<String, BTreeMap<String, u32>>,
    group: &str,
) -> Vec<IterationResult> {
    iterations
        .iter()
        .map(|iteration| IterationResult {
            iteration: iteration.clone(),
            score: totals
                .get(iteration)
                .and_then(|by_group| by_group.get(group))
                .copied()
                .unwrap_or(0),
        })
        .collect()
}

/// (mean of every iteration but the last, the last iteration)
pub fn summarize_iterations(scores: &[IterationResult]) -> (f64, f64) {
    match scores.split_last() {
        None => (0.0, 0.0),
        Some((last, [])) => (0.0, f64::from(last.score)),
        Some((last, rest)) => (mean(rest.iter().map(|s| f64::from(s.score))), f64::from(last.score)),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn compute_student(
    github: &str,
    hopkins: &str,
    assignment_ids: &[String],
    inputs: &GradebookInputs,
    group: Option<&GroupGradeRecord>,
    policy: &GradingPolicy,
) -> FinalGradeRecord {
    let ignored = policy
        .ignored_assignments
        .get(github)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let assignments = assignment_ids
        .iter()
        .map(|assignment| {
            let is_ignored = ignored.contains(assignment);
            let score = inputs
                .assignments
                .get(assignment)
                .and_then(|by_student| by_student.get(github))
                .copied()
                .unwrap_or(0);
            let late_days = inputs
                .late_days
                .get(&(assignment.clone(), github.to_string()))
                .copied()
                .unwrap_or(0);
            AssignmentResult {
                assignment: assignment.clone(),
                score,
                late_days: if is_ignored { 0 } else { late_days },
                ignored: is_ignored,
            }
        })
        .collect::<Vec<_>>();

    let counted = assignments.iter().filter(|a| !a.ignored);
    let late_days = counted.clone().map(|a| a.late_days).sum::<u32>();
    let late_days_penalty = penalty(late_days, policy);
    let assignments_average = mean(counted.map(|a| f64::from(a.score)));
    let assignments_total = (assignments_average + late_days_penalty).max(0.0);

    let quiz = inputs.quiz.get(github).copied().unwrap_or(0);

    let (iterations, iterations_total, project) = match group {
        Some(g) => (g.iterations.clone(), g.iterations_total, g.project),
        None => (Vec::new(), 0.0, 0.0),
    };
    let adjustment = policy.adjustments.get(github).copied().unwrap_or(0.0);
    let project_total = (project + adjustment).max(0.0);

    let weights = &policy.weights;
    let weighted = weights.assignments * assignments_total
        + weights.quiz * f64::from(quiz)
        + weights.iterations * iterations_total
        + weights.project * project_total;

    FinalGradeRecord {
        github: github.to_string(),
        hopkins: hopkins.to_string(),
        assignments,
        late_days,
        late_days_penalty,
        assignments_average,
        assignments_total,
        quiz,
        group: group.map(|g| g.identifier.clone()),
        iterations,
        iterations_total,
        project,
        adjustment,
        project_total,
        weighted,
        letter: letter_for(weighted, &policy.cutoffs),
    }
}

pub fn penalty(late_days: u32, policy: &GradingPolicy) -> f64 {
    let excess = late_days.saturating_sub(policy.allowed_late_days);
    policy.late_days_penalty * f64::from(excess)
}

/// First cutoff, in table order, whose threshold the score reaches.
pub fn letter_for(weighted: f64, cutoffs: &[Cutoff]) -> Option<String> {
    cutoffs
        .iter()
        .find(|c| weighted + CUTOFF_EPSILON >= c.points)
        .map(|c| c.grade.clone())
}

pub fn distribution(records: &[FinalGradeRecord], cutoffs: &[Cutoff]) -> Vec<DistributionRow> {
    let count = |letter: Option<&str>| {
        records
            .iter()
            .filter(|r| r.letter.as_deref() == letter)
            .count()
    };
    let mut rows = cutoffs
        .iter()
        .map(|c| DistributionRow {
            letter: c.grade.clone(),
            count: count(Some(&c.grade)),
        })
        .collect::<Vec<_>>();
    let unset = count(None);
    if unset > 0 {
        rows.push(DistributionRow {
            letter: UNSET_LETTER.to_string(),
            count: unset,
        });
    }
    rows
}

pub fn export_rows(records: &[FinalGradeRecord]) -> Vec<ExportRow> {
    records
        .iter()
        .map(|r| ExportRow {
            hopkins: r.hopkins.clone(),
            grade: r.letter.clone().unwrap_or_default(),
        })
        .collect()
}
