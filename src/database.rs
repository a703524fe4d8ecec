use std::fmt::{Display, Formatter};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::github::Forge;
use crate::records;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Students,
    Assignments,
    Feedbacks,
    Groups,
    Iterations,
    Grades,
    SelfReviews,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Students,
        Table::Assignments,
        Table::Feedbacks,
        Table::Groups,
        Table::Iterations,
        Table::Grades,
        Table::SelfReviews,
    ];

    /// Title of the staff-repository issue backing the table.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Students => "Students",
            Self::Assignments => "Assignments",
            Self::Feedbacks => "Feedbacks",
            Self::Groups => "Groups",
            Self::Iterations => "Iterations",
            Self::Grades => "Grades",
            Self::SelfReviews => "Self Reviews",
        }
    }

    pub fn issue(&self, config: &DatabaseConfig) -> Option<u64> {
        match self {
            Self::Students => config.students,
            Self::Assignments => config.assignments,
            Self::Feedbacks => config.feedbacks,
            Self::Groups => config.groups,
            Self::Iterations => config.iterations,
            Self::Grades => config.grades,
            Self::SelfReviews => config.self_reviews,
        }
    }

    pub fn assign(&self, config: &mut DatabaseConfig, issue: u64) {
        let slot = match self {
            Self::Students => &mut config.students,
            Self::Assignments => &mut config.assignments,
            Self::Feedbacks => &mut config.feedbacks,
            Self::Groups => &mut config.groups,
            Self::Iterations => &mut config.iterations,
            Self::Grades => &mut config.grades,
            Self::SelfReviews => &mut config.self_reviews,
        };
        *slot = Some(issue);
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title().to_ascii_lowercase().replace(' ', "_"))
    }
}

/// Tables stored as serialized comments on staff-repository issues.
pub struct Database<'a> {
    forge: &'a dyn Forge,
    repo: String,
    config: DatabaseConfig,
}

impl<'a> Database<'a> {
    pub fn new(forge: &'a dyn Forge, repo: impl Into<String>, config: DatabaseConfig) -> Self {
        Self {
            forge,
            repo: repo.into(),
            config,
        }
    }

    fn issue_for(&self, table: Table) -> Result<u64> {
        table
            .issue(&self.config)
            .ok_or_else(|| anyhow!("no issue configured for the {table} table"))
    }

    pub async fn insert<T: Serialize + ?Sized>(&self, table: Table, record: &T) -> Result<()> {
        let issue = self.issue_for(table)?;
        let body = records::serialize(record)?;
        self.forge
            .append_comment(&self.repo, issue, &body)
            .await
            .with_context(|| format!("failed inserting into the {table} table"))?;
        debug!("inserted record into {table} (#{issue})");
        Ok(())
    }

    /// All records of a table, in insertion order.
    pub async fn select<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        let issue = self.issue_for(table)?;
        let bodies = self
            .forge
            .list_comments(&self.repo, issue)
            .await
            .with_context(|| format!("failed reading the {table} table"))?;
        bodies
            .iter()
            .enumerate()
            .map(|(idx, body)| {
                records::deserialize(body)
                    .with_context(|| format!("malformed record #{} in the {table} table", idx + 1))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::memory::InMemoryForge;
    use crate::records::StudentRecord;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            students: Some(1),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn insert_then_select_preserves_order() {
        let forge = InMemoryForge::new()
            .with_repo("cs-staff")
            .with_issue("cs-staff", 1, "Students");
        let db = Database::new(&forge, "cs-staff", config());
        tokio_test::block_on(async {
            for (github, hopkins) in [("alice", "A1"), ("bob", "B2")] {
                db.insert(
                    Table::Students,
                    &StudentRecord {
                        github: github.to_string(),
                        hopkins: hopkins.to_string(),
                    },
                )
                .await
                .expect("insert");
            }
            let students: Vec<StudentRecord> = db.select(Table::Students).await.expect("select");
            let names = students.iter().map(|s| s.github.as_str()).collect::<Vec<_>>();
            assert_eq!(names, vec!["alice", "bob"]);
        });
        assert!(forge.comments("cs-staff", 1)[0].starts_with("```json"));
    }

    #[test]
    fn unconfigured_table_is_an_error() {
        let forge = InMemoryForge::new();
        let db = Database::new(&forge, "cs-staff", config());
        let err = tokio_test::block_on(db.select::<StudentRecord>(Table::Grades))
            .expect_err("grades table is not configured");
        assert!(err.to_string().contains("grades"));
    }

    #[test]
    fn self_reviews_table_uses_its_own_slot() {
        let mut config = DatabaseConfig::default();
        Table::SelfReviews.assign(&mut config, 7);
        assert_eq!(config.self_reviews, Some(7));
        assert_eq!(Table::SelfReviews.issue(&config), Some(7));
        assert_eq!(Table::SelfReviews.to_string(), "self_reviews");
        assert_eq!(Table::SelfReviews.title(), "Self Reviews");
    }

    #[test]
    fn malformed_comment_names_its_position() {
        let forge = InMemoryForge::new()
            .with_repo("cs-staff")
            .with_issue("cs-staff", 1, "Students");
        tokio_test::block_on(forge.append_comment("cs-staff", 1, "hello, not json"))
            .expect("comment");
        let db = Database::new(&forge, "cs-staff", config());
        let err = tokio_test::block_on(db.select::<StudentRecord>(Table::Students))
            .expect_err("malformed");
        assert!(format!("{err:#}").contains("record #1"));
    }
}
