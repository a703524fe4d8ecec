use anyhow::{Context, Result};
use tracing::info;

use super::tolerate_existing;
use crate::config::{DatabaseConfig, Settings};
use crate::database::Table;
use crate::github::{Forge, NewIssue, NewRepository, Permission};

pub const INSTRUCTORS_REPO: &str = "instructors";
pub const DATA_LABEL: &str = "data";

/// Creates the course teams, repositories and database issues. Existing
/// teams and repositories are reused; database issues are always new.
pub async fn initialize(forge: &dyn Forge, settings: &Settings) -> Result<DatabaseConfig> {
    let staff_team = settings.staff_team();
    let students_team = settings.students_team();
    let staff_repo = settings.staff_repo();
    let students_repo = settings.students_repo();

    for team in [&students_team, &staff_team] {
        tolerate_existing(forge.create_team(team).await, team)
            .with_context(|| format!("failed creating team {team}"))?;
        info!("team {team} ready");
    }

    let repos = [
        NewRepository::private(INSTRUCTORS_REPO, "Instructor notes"),
        NewRepository::private(&staff_repo, "Course staff: configuration, grading and data"),
        NewRepository::private(&students_repo, "Course material shared with students")
            .without_projects(),
    ];
    for repo in &repos {
        tolerate_existing(forge.create_repo(repo).await, &repo.name)
            .with_context(|| format!("failed creating repository {}", repo.name))?;
        info!("repository {} ready", repo.name);
    }

    let grants = [
        (&staff_team, &staff_repo, Permission::Push),
        (&staff_team, &students_repo, Permission::Push),
        (&students_team, &students_repo, Permission::Pull),
    ];
    for (team, repo, permission) in grants {
        forge
            .grant_team(team, repo, permission)
            .await
            .with_context(|| format!("failed granting {team} access to {repo}"))?;
    }

    let mut database = DatabaseConfig::default();
    for table in Table::ALL {
        let issue = NewIssue {
            title: table.title().to_string(),
            body: format!("Records of the {table} table. Do not edit by hand."),
            labels: vec![DATA_LABEL.to_string()],
            milestone: None,
        };
        let number = forge
            .create_issue(&staff_repo, &issue)
            .await
            .with_context(|| format!("failed creating the {table} table issue"))?;
        table.assign(&mut database, number);
        info!("{table} table stored in {staff_repo}#{number}");
    }
    Ok(database)
}
