use anyhow::{bail, Context, Result};
use tracing::info;

use super::Course;
use crate::batch::BatchReport;
use crate::database::Table;
use crate::github::{NewRepository, Permission};
use crate::records::GroupRecord;

pub async fn create(course: &Course<'_>, identifier: &str, members: &[String]) -> Result<GroupRecord> {
    let settings = course.settings;
    let forge = course.forge;
    if members.is_empty() {
        bail!("group {identifier} needs at least one member");
    }

    let students_team = settings.students_team();
    let mut strangers = Vec::new();
    for member in members {
        match forge.team_membership(&students_team, member).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => strangers.push(member.clone()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed checking membership of {member}"))
            }
        }
    }
    if !strangers.is_empty() {
        bail!(
            "not enrolled in {students_team}: {}",
            strangers.join(", ")
        );
    }

    let team = settings.group_team(identifier);
    let repo = settings.group_repo(identifier);
    forge
        .create_team(&team)
        .await
        .with_context(|| format!("failed creating team {team}"))?;
    forge
        .create_repo(&NewRepository::private(&repo, format!("Project of group {identifier}")))
        .await
        .with_context(|| format!("failed creating repository {repo}"))?;
    for grantee in [&team, &settings.staff_team()] {
        forge
            .grant_team(grantee, &repo, Permission::Admin)
            .await
            .with_context(|| format!("failed granting {grantee} access to {repo}"))?;
    }
    for member in members {
        forge
            .add_team_member(&team, member)
            .await
            .with_context(|| format!("failed adding {member} to {team}"))?;
    }
    course
        .copy_templates(&repo, &course.config.templates.groups)
        .await?;

    let record = GroupRecord {
        identifier: identifier.to_string(),
        members: members.to_vec(),
    };
    course.database().insert(Table::Groups, &record).await?;
    info!("created group {identifier} with {}", members.join(", "));
    Ok(record)
}

/// Deletes the group's team and repository, attempting both.
pub async fn delete(course: &Course<'_>, identifier: &str) -> BatchReport {
    let mut report = BatchReport::new(format!("delete group {identifier}"));
    let team = course.settings.group_team(identifier);
    let repo = course.settings.group_repo(identifier);
    report.record(format!("team {team}"), course.forge.delete_team(&team).await);
    report.record(format!("repository {repo}"), course.forge.delete_repo(&repo).await);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testing::{config, course_forge, settings};

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn creates_team_repository_and_record() {
        let forge = course_forge().with_team("cs-students", &["alice", "bob"]);
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let record = create(&course, "7", &members(&["alice", "bob"]))
            .await
            .expect("create");
        assert_eq!(record.members.len(), 2);
        assert!(forge.has_repo("cs-group-7"));
        assert_eq!(forge.team("cs-group-7"), Some(members(&["alice", "bob"])));
        let grants = forge.grants();
        assert!(grants.contains(&("cs-group-7".to_string(), "cs-group-7".to_string(), Permission::Admin)));
        assert!(grants.contains(&("cs-staff".to_string(), "cs-group-7".to_string(), Permission::Admin)));
        assert_eq!(course.groups().await.expect("groups"), vec![record]);
    }

    #[tokio::test]
    async fn rejects_students_outside_the_course() {
        let forge = course_forge().with_team("cs-students", &["alice"]);
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let err = create(&course, "7", &members(&["alice", "mallory"]))
            .await
            .expect_err("mallory is not enrolled");
        assert!(err.to_string().contains("mallory"));
        assert!(!forge.has_repo("cs-group-7"));
    }

    #[tokio::test]
    async fn deletion_reports_each_step() {
        let forge = course_forge()
            .with_team("cs-group-3", &["alice"])
            .with_repo("cs-group-3");
        let settings = settings();
        let course = Course::new(&forge, &settings, config());

        let report = delete(&course, "3").await;
        assert!(report.is_success());
        assert!(!forge.has_repo("cs-group-3"));
        assert!(forge.team("cs-group-3").is_none());

        let again = delete(&course, "3").await;
        assert_eq!(again.failed.len(), 2);
    }
}
