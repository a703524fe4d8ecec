use anyhow::{Context, Result};
use tracing::info;

use super::Course;
use crate::batch::BatchReport;
use crate::database::Table;
use crate::github::{NewRepository, Permission};
use crate::records::StudentRecord;

pub async fn onboard(course: &Course<'_>, github: &str, hopkins: &str) -> Result<StudentRecord> {
    let settings = course.settings;
    let forge = course.forge;
    let record = StudentRecord {
        github: github.trim().to_string(),
        hopkins: hopkins.trim().to_string(),
    };
    let github = record.github.as_str();
    let repo = settings.student_repo(github);

    course.database().insert(Table::Students, &record).await?;

    let students_team = settings.students_team();
    forge
        .add_team_member(&students_team, github)
        .await
        .with_context(|| format!("failed adding {github} to {students_team}"))?;

    forge
        .create_repo(&NewRepository::private(
            &repo,
            format!("Assignments of {github}"),
        ))
        .await
        .with_context(|| format!("failed creating repository {repo}"))?;
    forge
        .grant_team(&settings.staff_team(), &repo, Permission::Admin)
        .await
        .with_context(|| format!("failed granting staff access to {repo}"))?;
    forge
        .add_collaborator(&repo, github, Permission::Admin)
        .await
        .with_context(|| format!("failed adding {github} to {repo}"))?;

    course
        .copy_templates(&repo, &course.config.templates.onboarding)
        .await?;
    info!("onboarded {github} ({})", record.hopkins);
    Ok(record)
}

#[derive(Debug)]
pub struct Removal {
    pub report: BatchReport,
    /// Steps the tool cannot do for the operator.
    pub follow_ups: Vec<String>,
}

/// Removes a student's organization membership and repository. Both steps
/// are attempted even if one fails.
pub async fn delete(course: &Course<'_>, github: &str) -> Removal {
    let mut report = BatchReport::new(format!("delete student {github}"));
    let repo = course.settings.student_repo(github);

    report.record(
        format!("membership of {github}"),
        course.forge.remove_org_member(github).await,
    );
    report.record(repo.clone(), course.forge.delete_repo(&repo).await);

    let mut follow_ups = Vec::new();
    if let Some(issue) = course.config.database.students {
        follow_ups.push(format!(
            "Delete the record of {github} from {}#{issue}.",
            course.settings.staff_repo()
        ));
    }
    // The API cannot cancel a pending invitation.
    follow_ups.push(format!(
        "If {github} never accepted the organization invitation, cancel it at \
         https://github.com/orgs/{}/people.",
        course.org()
    ));
    Removal { report, follow_ups }
}

/// Confirms every student repository has `assignments/<assignment>.md`.
pub async fn check(course: &Course<'_>, assignment: &str) -> Result<BatchReport> {
    let path = format!("assignments/{assignment}.md");
    let mut report = BatchReport::new(format!("check {path}"));
    for student in course.students().await? {
        let repo = course.settings.student_repo(&student.github);
        let result = course
            .forge
            .read_text(&repo, &path, None)
            .await
            .with_context(|| format!("{path} missing in {repo}"));
        report.record(student.github, result);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateCopy;
    use crate::workflows::testing::{config, course_forge, settings};

    #[tokio::test]
    async fn onboarding_creates_repository_and_record() {
        let forge = course_forge().with_file("cs-staff", "templates/onboarding.md", "Hi!");
        let settings = settings();
        let mut config = config();
        config.templates.onboarding.push(TemplateCopy {
            source: "templates/onboarding.md".to_string(),
            destination: "README.md".to_string(),
        });
        let course = Course::new(&forge, &settings, config);

        let record = onboard(&course, " alice ", "A1").await.expect("onboard");
        assert_eq!(record.github, "alice");

        assert!(forge.has_repo("cs-student-alice"));
        assert_eq!(forge.team("cs-students"), Some(vec!["alice".to_string()]));
        assert!(forge.grants().contains(&(
            "cs-staff".to_string(),
            "cs-student-alice".to_string(),
            Permission::Admin
        )));
        assert!(forge.collaborators().contains(&(
            "cs-student-alice".to_string(),
            "alice".to_string(),
            Permission::Admin
        )));
        assert_eq!(forge.file("cs-student-alice", "README.md").as_deref(), Some("Hi!"));
        assert_eq!(course.students().await.expect("students")[0].hopkins, "A1");
    }

    #[tokio::test]
    async fn deletion_keeps_going_after_failures() {
        let forge = course_forge();
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let removal = delete(&course, "ghost").await;
        assert_eq!(removal.report.succeeded.len(), 1);
        assert_eq!(removal.report.failed.len(), 1);
        assert_eq!(removal.report.failed[0].entity, "cs-student-ghost");
        assert_eq!(forge.removed_members(), vec!["ghost".to_string()]);
        assert!(removal.follow_ups[0].contains("cs-staff#1"));
        assert_eq!(removal.follow_ups.len(), 2);
        assert!(removal.follow_ups[1].contains("https://github.com/orgs/course-org/people"));
    }

    #[tokio::test]
    async fn check_reports_missing_assignment_files() {
        let forge = course_forge()
            .with_file("cs-student-alice", "assignments/1.md", "done")
            .with_repo("cs-student-bob");
        let settings = settings();
        let course = Course::new(&forge, &settings, config());
        for github in ["alice", "bob"] {
            course
                .database()
                .insert(
                    Table::Students,
                    &StudentRecord {
                        github: github.to_string(),
                        hopkins: "H".to_string(),
                    },
                )
                .await
                .expect("insert");
        }

        let report = check(&course, "1").await.expect("check");
        assert_eq!(report.succeeded, vec!["alice"]);
        assert_eq!(report.failed[0].entity, "bob");
        assert!(report.failed[0].error.contains("assignments/1.md missing"));
    }
}
