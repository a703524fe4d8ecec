pub mod final_grades;
pub mod grading;
pub mod groups;
pub mod insights;
pub mod provisioning;
pub mod students;
pub mod submissions;

use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{CourseConfig, Settings, TemplateCopy};
use crate::database::{Database, Table};
use crate::github::{Forge, ForgeResult};
use crate::records::{GroupRecord, StudentRecord};

/// A course as seen by one command: the remote store, the naming scheme and
/// the loaded course configuration.
pub struct Course<'a> {
    pub forge: &'a dyn Forge,
    pub settings: &'a Settings,
    pub config: CourseConfig,
}

impl<'a> Course<'a> {
    pub fn new(forge: &'a dyn Forge, settings: &'a Settings, config: CourseConfig) -> Self {
        Self {
            forge,
            settings,
            config,
        }
    }

    pub async fn load(forge: &'a dyn Forge, settings: &'a Settings) -> Result<Self> {
        let config = settings.course_config(forge).await?;
        Ok(Self::new(forge, settings, config))
    }

    pub fn database(&self) -> Database<'a> {
        Database::new(
            self.forge,
            self.settings.staff_repo(),
            self.config.database.clone(),
        )
    }

    pub fn org(&self) -> &str {
        self.forge.org()
    }

    /// Members of the staff team; the only accepted graders.
    pub async fn staff_roster(&self) -> Result<Vec<String>> {
        let team = self.settings.staff_team();
        self.forge
            .team_members(&team)
            .await
            .with_context(|| format!("failed listing members of {team}"))
    }

    /// Student records in onboarding order, first record per login.
    pub async fn students(&self) -> Result<Vec<StudentRecord>> {
        let records: Vec<StudentRecord> = self.database().select(Table::Students).await?;
        let mut seen: Vec<StudentRecord> = Vec::with_capacity(records.len());
        for record in records {
            if seen.iter().any(|s| s.github == record.github) {
                warn!("ignoring repeated student record for {}", record.github);
                continue;
            }
            seen.push(record);
        }
        Ok(seen)
    }

    pub async fn groups(&self) -> Result<Vec<GroupRecord>> {
        self.database().select(Table::Groups).await
    }

    /// Copies files from the staff repository into `repo`. Stops at the first
    /// file that cannot be copied.
    pub async fn copy_templates(&self, repo: &str, templates: &[TemplateCopy]) -> Result<()> {
        let staff = self.settings.staff_repo();
        for template in templates {
            let content = self
                .forge
                .read_text(&staff, &template.source, None)
                .await
                .with_context(|| format!("failed reading template {}", template.source))?;
            self.forge
                .write_file(
                    repo,
                    &template.destination,
                    &content,
                    &format!("Add {}", template.destination),
                )
                .await
                .with_context(|| format!("failed writing {} to {repo}", template.destination))?;
        }
        Ok(())
    }
}

/// Turns "already exists" into success so setup steps can be re-run.
pub(crate) fn tolerate_existing(result: ForgeResult<()>, what: &str) -> ForgeResult<()> {
    match result {
        Err(err) if err.is_conflict() => {
            warn!("{what} already exists, continuing");
            Ok(())
        }
        other => other,
    }
}
