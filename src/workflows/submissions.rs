use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use super::Course;
use crate::batch::BatchReport;
use crate::database::Table;
use crate::github::NewIssue;
use crate::records::{self, AssignmentSubmission, IterationSubmission};

pub fn assignment_path(assignment: &str) -> String {
    format!("assignments/{assignment}.md")
}

pub fn template_path(assignment: &str) -> String {
    format!("templates/{}", assignment_path(assignment))
}

/// Writes the staff-repository template of `assignment` into every student
/// repository.
pub async fn distribute_template(course: &Course<'_>, assignment: &str) -> Result<BatchReport> {
    let source = template_path(assignment);
    let content = course
        .forge
        .read_text(&course.settings.staff_repo(), &source, None)
        .await
        .with_context(|| format!("failed reading {source} from the staff repository"))?;
    let destination = assignment_path(assignment);

    let mut report = BatchReport::new(format!("distribute {destination}"));
    for student in course.students().await? {
        let repo = course.settings.student_repo(&student.github);
        let result = course
            .forge
            .write_file(&repo, &destination, &content, &format!("Add assignment {assignment}"))
            .await;
        report.record(student.github, result);
    }
    Ok(report)
}

pub async fn submit_assignment(
    course: &Course<'_>,
    assignment: &str,
    github: &str,
    commit: &str,
    time: Option<DateTime<Utc>>,
) -> Result<AssignmentSubmission> {
    if course.config.assignment(assignment).is_none() {
        bail!("unknown assignment {assignment}");
    }
    let repo = course.settings.student_repo(github);
    let sha = course
        .forge
        .commit_sha(&repo, commit)
        .await
        .with_context(|| format!("commit {commit} not found in {repo}"))?;
    let record = AssignmentSubmission {
        assignment: assignment.to_string(),
        github: github.to_string(),
        commit: sha,
        time: time.unwrap_or_else(Utc::now),
    };
    course.database().insert(Table::Assignments, &record).await?;
    info!("recorded assignment {assignment} for {github} at {}", record.commit);
    Ok(record)
}

/// Submission through the web form: the assignment file must exist at the
/// submitted commit, and the student gets a receipt issue.
pub async fn receive_assignment(
    course: &Course<'_>,
    assignment: &str,
    github: &str,
    commit: &str,
) -> Result<AssignmentSubmission> {
    let repo = course.settings.student_repo(github);
    let path = assignment_path(assignment);
    course
        .forge
        .read_text(&repo, &path, Some(commit))
        .await
        .with_context(|| format!("{path} not found in {repo} at {commit}"))?;

    let record = submit_assignment(course, assignment, github, commit, None).await?;
    let receipt = NewIssue {
        title: format!("Submission of assignment {assignment}"),
        body: format!("{}\n/cc @{github}\n", records::serialize(&record)?),
        labels: vec!["submission".to_string()],
        milestone: None,
    };
    course
        .forge
        .create_issue(&repo, &receipt)
        .await
        .with_context(|| format!("failed opening receipt issue in {repo}"))?;
    Ok(record)
}

pub async fn submit_iteration(
    course: &Course<'_>,
    iteration: &str,
    group: &str,
    commit: &str,
    time: Option<DateTime<Utc>>,
) -> Result<IterationSubmission> {
    if course.config.iteration(iteration).is_none() {
        bail!("unknown iteration {iteration}");
    }
    let repo = course.settings.group_repo(group);
    let sha = course
        .forge
        .commit_sha(&repo, commit)
        .await
        .with_context(|| format!("commit {commit} not found in {repo}"))?;
    let record = IterationSubmission {
        iteration: iteration.to_string(),
        group: group.to_string(),
        commit: sha,
        time: time.unwrap_or_else(Utc::now),
    };
    course.database().insert(Table::Iterations, &record).await?;
    info!("recorded iteration {iteration} for group {group} at {}", record.commit);
    Ok(record)
}
