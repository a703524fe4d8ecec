use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use tracing::info;

use super::Course;
use crate::batch::BatchReport;
use crate::database::Table;
use crate::github::{repo_url, NewIssue};
use crate::grading::skeleton::skeleton;
use crate::grading::{aggregate, Aggregation, EntityKind, GradingFailed, PartSource, Subject};
use crate::records::{AssignmentSubmission, GradeRecord, IterationSubmission};

pub const GRADE_LABEL: &str = "grade";

pub fn issue_title(subject: &Subject) -> String {
    format!("Grade for {subject}")
}

/// Repository that receives the published grade of `entity`.
pub fn entity_repo(course: &Course<'_>, subject: &Subject, entity: &str) -> String {
    match subject.entity() {
        EntityKind::Student => course.settings.student_repo(entity),
        EntityKind::Group => course.settings.group_repo(entity),
    }
}

/// (entity, link to what is being graded) in roster order. The link points
/// at the latest submitted commit when there is one.
pub async fn gradable_entities(course: &Course<'_>, subject: &Subject) -> Result<Vec<(String, String)>> {
    let org = course.org().to_string();
    let db = course.database();
    let link = |repo: &str, commit: Option<&String>| match commit {
        Some(commit) => format!("{}/tree/{commit}", repo_url(&org, repo)),
        None => repo_url(&org, repo),
    };

    match subject {
        Subject::Iteration(iteration) => {
            let submissions: Vec<IterationSubmission> = db.select(Table::Iterations).await?;
            let latest = latest_commits(
                submissions
                    .iter()
                    .filter(|s| &s.iteration == iteration)
                    .map(|s| (s.group.clone(), s.time, s.commit.clone())),
            );
            let mut seen = BTreeSet::new();
            Ok(course
                .groups()
                .await?
                .into_iter()
                .filter(|g| seen.insert(g.identifier.clone()))
                .map(|g| {
                    let repo = course.settings.group_repo(&g.identifier);
                    let url = link(&repo, latest.get(&g.identifier));
                    (g.identifier, url)
                })
                .collect())
        }
        Subject::Assignment(assignment) => {
            let submissions: Vec<AssignmentSubmission> = db.select(Table::Assignments).await?;
            let latest = latest_commits(
                submissions
                    .iter()
                    .filter(|s| &s.assignment == assignment)
                    .map(|s| (s.github.clone(), s.time, s.commit.clone())),
            );
            Ok(course
                .students()
                .await?
                .into_iter()
                .map(|s| {
                    let repo = course.settings.student_repo(&s.github);
                    let url = link(&repo, latest.get(&s.github));
                    (s.github, url)
                })
                .collect())
        }
        Subject::Quiz => Ok(course
            .students()
            .await?
            .into_iter()
            .map(|s| {
                let url = link(&course.settings.student_repo(&s.github), None);
                (s.github, url)
            })
            .collect()),
    }
}

fn latest_commits<T: Ord>(
    submissions: impl Iterator<Item = (String, T, String)>,
) -> BTreeMap<String, String> {
    let mut latest: BTreeMap<String, (T, String)> = BTreeMap::new();
    for (entity, time, commit) in submissions {
        match latest.get(&entity) {
            Some((seen, _)) if *seen >= time => {}
            _ => {
                latest.insert(entity, (time, commit));
            }
        }
    }
    latest
        .into_iter()
        .map(|(entity, (_, commit))| (entity, commit))
        .collect()
}

pub fn part_path(subject: &Subject, part: &str) -> String {
    format!("{}/{part}.md", subject.directory())
}

/// Writes one skeleton part file per part name. Existing part files are
/// never overwritten.
pub async fn start(course: &Course<'_>, subject: &Subject, parts: &[String]) -> Result<BatchReport> {
    let entities = gradable_entities(course, subject).await?;
    let staff = course.settings.staff_repo();
    let mut report = BatchReport::new(format!("start grading {subject}"));
    for part in parts {
        let path = part_path(subject, part);
        match course.forge.read_text(&staff, &path, None).await {
            Ok(_) => {
                report.skip(path, "part file already exists");
                continue;
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                report.failure(path, err);
                continue;
            }
        }
        let text = skeleton(&format!("{subject}: {part}"), &entities);
        let result = course
            .forge
            .write_file(&staff, &path, &text, &format!("Start grading {subject} ({part})"))
            .await;
        report.record(path, result);
    }
    Ok(report)
}

pub async fn load_parts(course: &Course<'_>, subject: &Subject) -> Result<Vec<PartSource>> {
    let staff = course.settings.staff_repo();
    let directory = subject.directory();
    let names = course
        .forge
        .list_names(&staff, &directory)
        .await
        .with_context(|| format!("no part files found in {directory}"))?;
    let mut parts = Vec::new();
    for name in names.into_iter().filter(|n| n.ends_with(".md")) {
        let path = format!("{directory}/{name}");
        let text = course
            .forge
            .read_text(&staff, &path, None)
            .await
            .with_context(|| format!("failed reading {path}"))?;
        parts.push(PartSource::new(name, text));
    }
    Ok(parts)
}

/// Parses and merges every part file of `subject` without publishing.
pub async fn check(course: &Course<'_>, subject: &Subject) -> Result<Aggregation> {
    let staff = course.staff_roster().await?;
    let parts = load_parts(course, subject).await?;
    info!("aggregating {} part file(s) for {subject}", parts.len());
    Ok(aggregate(subject, &parts, &staff))
}

/// Publishes one grade issue per entity. Refuses to publish anything when
/// the part files have errors; entities already published are skipped.
pub async fn publish(course: &Course<'_>, subject: &Subject) -> Result<BatchReport> {
    let grades = check(course, subject)
        .await?
        .into_result()
        .map_err(|errors| GradingFailed {
            subject: subject.to_string(),
            errors,
        })?;

    let db = course.database();
    let slug = subject.slug();
    let published = db
        .select::<GradeRecord>(Table::Grades)
        .await?
        .into_iter()
        .filter(|r| r.subject == slug)
        .map(|r| r.entity)
        .collect::<BTreeSet<_>>();
    let title = issue_title(subject);
    let mut report = BatchReport::new(format!("publish {subject}"));

    for grade in grades {
        if published.contains(&grade.entity) {
            report.skip(grade.entity, "grade record exists");
            continue;
        }
        let repo = entity_repo(course, subject, &grade.entity);
        match publish_one(course, &repo, &title, subject, &grade.document).await {
            Ok(false) => {
                report.skip(grade.entity, "grade issue exists");
                continue;
            }
            Ok(true) => {}
            Err(err) => {
                report.failure(grade.entity, err);
                continue;
            }
        }
        let record = GradeRecord {
            subject: slug.clone(),
            entity: grade.entity.clone(),
            grade: grade.document,
        };
        let result = db.insert(Table::Grades, &record).await;
        report.record(grade.entity, result);
    }
    Ok(report)
}

/// Opens the grade issue; `false` when one with the same title is there.
async fn publish_one(
    course: &Course<'_>,
    repo: &str,
    title: &str,
    subject: &Subject,
    document: &str,
) -> Result<bool> {
    let forge = course.forge;
    let issues = forge
        .list_issues(repo)
        .await
        .with_context(|| format!("failed listing issues of {repo}"))?;
    if issues.iter().any(|i| i.title == title) {
        return Ok(false);
    }
    let milestone_title = subject.to_string();
    let milestone = forge
        .list_milestones(repo)
        .await
        .with_context(|| format!("failed listing milestones of {repo}"))?
        .into_iter()
        .find(|m| m.title == milestone_title)
        .map(|m| m.number);
    let issue = NewIssue {
        title: title.to_string(),
        body: document.to_string(),
        labels: vec![GRADE_LABEL.to_string()],
        milestone,
    };
    let number = forge
        .create_issue(repo, &issue)
        .await
        .with_context(|| format!("failed opening grade issue in {repo}"))?;
    info!("published {title} as {repo}#{number}");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::memory::InMemoryForge;
    use crate::records::StudentRecord;
    use crate::workflows::testing::{config, course_forge, settings};
    use chrono::{TimeZone, Utc};

    async fn enroll(course: &Course<'_>, students: &[&str]) {
        for github in students {
            course
                .database()
                .insert(
                    Table::Students,
                    &StudentRecord {
                        github: github.to_string(),
                        hopkins: format!("H-{github}"),
                    },
                )
                .await
                .expect("insert");
        }
    }

    fn graded_part(entries: &[(&str, &str)]) -> String {
        let mut text = "# Part 1\n\n# Rubric\n\n## late\n**-10** Late\n\n# Grades\n".to_string();
        for (student, line) in entries {
            text.push_str(&format!(
                "\n## [`{student}`](https://example.com)\n\n{line}\n\n**Grader:** `ta1`\n"
            ));
        }
        text
    }

    fn forge_with_part(part: &str) -> InMemoryForge {
        course_forge()
            .with_repo("cs-student-alice")
            .with_repo("cs-student-bob")
            .with_file("cs-staff", "grades/assignments/1/part-1.md", part)
    }

    #[tokio::test]
    async fn start_writes_skeletons_with_submission_links() {
        let forge = course_forge();
        let settings = settings();
        let course = Course::new(&forge, &settings, config());
        enroll(&course, &["alice", "bob"]).await;
        for (hour, commit) in [(1, "old"), (5, "new")] {
            course
                .database()
                .insert(
                    Table::Assignments,
                    &AssignmentSubmission {
                        assignment: "1".to_string(),
                        github: "alice".to_string(),
                        commit: commit.to_string(),
                        time: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
                    },
                )
                .await
                .expect("insert");
        }

        let subject = Subject::Assignment("1".to_string());
        let parts = vec!["part-1".to_string(), "part-2".to_string()];
        let report = start(&course, &subject, &parts).await.expect("start");
        assert_eq!(report.succeeded.len(), 2);

        let text = forge
            .file("cs-staff", "grades/assignments/1/part-1.md")
            .expect("part file");
        assert!(text.starts_with("# Assignment 1: part-1\n"));
        assert!(text.contains("(https://github.com/course-org/cs-student-alice/tree/new)"));
        assert!(text.contains("[`bob`](https://github.com/course-org/cs-student-bob)"));

        let again = start(&course, &subject, &parts).await.expect("start");
        assert_eq!(again.skipped.len(), 2);
    }

    #[tokio::test]
    async fn publish_creates_issues_once() {
        let forge = forge_with_part(&graded_part(&[("alice", "late"), ("bob", "**+2** bonus")]))
            .with_milestone("cs-student-alice", 3, "Assignment 1");
        let settings = settings();
        let course = Course::new(&forge, &settings, config());
        let subject = Subject::Assignment("1".to_string());

        let report = publish(&course, &subject).await.expect("publish");
        assert_eq!(report.succeeded, vec!["alice", "bob"]);

        let issues = forge.issues("cs-student-alice");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].title, "Grade for Assignment 1");
        assert_eq!(issues[0].milestone, Some(3));
        assert!(issues[0].body.contains("**Total:** 90"));

        let records: Vec<GradeRecord> = course.database().select(Table::Grades).await.expect("grades");
        assert_eq!(records.len(), 2);

        let again = publish(&course, &subject).await.expect("publish");
        assert_eq!(again.skipped.len(), 2);
        assert_eq!(forge.issues("cs-student-alice").len(), 1);
    }

    #[tokio::test]
    async fn existing_grade_issue_is_not_duplicated() {
        let forge = forge_with_part(&graded_part(&[("alice", "late")]))
            .with_issue("cs-student-alice", 1, "Grade for Assignment 1");
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let report = publish(&course, &Subject::Assignment("1".to_string()))
            .await
            .expect("publish");
        assert_eq!(report.skipped, vec!["alice"]);
        assert_eq!(forge.issues("cs-student-alice").len(), 1);
    }

    #[tokio::test]
    async fn errors_block_publication() {
        let forge = forge_with_part(&graded_part(&[("alice", "lat")]));
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let err = publish(&course, &Subject::Assignment("1".to_string()))
            .await
            .expect_err("unknown rubric item");
        let failed = err.downcast_ref::<GradingFailed>().expect("grading failure");
        assert_eq!(failed.errors.len(), 1);
        assert!(forge.issues("cs-student-alice").is_empty());
    }

    #[tokio::test]
    async fn failing_repository_does_not_stop_others() {
        let forge = forge_with_part(&graded_part(&[("alice", "late"), ("bob", "late")]))
            .with_broken_repo("cs-student-alice");
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let report = publish(&course, &Subject::Assignment("1".to_string()))
            .await
            .expect("publish");
        assert_eq!(report.failed[0].entity, "alice");
        assert_eq!(report.succeeded, vec!["bob"]);
    }
}
