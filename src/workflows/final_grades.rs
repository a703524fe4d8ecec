use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::Course;
use crate::database::Table;
use crate::final_grade::late_days::late_days_by_submission;
use crate::final_grade::{compute, Gradebook, GradebookInputs};
use crate::grading::{extract_total, Subject};
use crate::records::{AssignmentSubmission, GradeRecord};

/// Reads everything the final-grade calculation needs from the course
/// database. A published grade without a readable total aborts the load.
pub async fn load_inputs(course: &Course<'_>) -> Result<GradebookInputs> {
    let db = course.database();
    let students = course.students().await?;
    let groups = course.groups().await?;
    let grades: Vec<GradeRecord> = db.select(Table::Grades).await?;
    let submissions: Vec<AssignmentSubmission> = db.select(Table::Assignments).await?;

    let mut inputs = GradebookInputs {
        students,
        groups,
        late_days: late_days_by_submission(&submissions, &course.config.assignments),
        ..GradebookInputs::default()
    };

    for record in grades {
        let Some(subject) = Subject::from_slug(&record.subject) else {
            warn!("ignoring grade record with unknown subject {}", record.subject);
            continue;
        };
        let total = extract_total(&record.grade)
            .with_context(|| format!("grade of {} for {subject}", record.entity))?;
        let scores: &mut BTreeMap<String, u32> = match &subject {
            Subject::Assignment(id) => inputs.assignments.entry(id.clone()).or_default(),
            Subject::Iteration(id) => inputs.iterations.entry(id.clone()).or_default(),
            Subject::Quiz => &mut inputs.quiz,
        };
        // A republished grade replaces the earlier one.
        scores.insert(record.entity, total);
    }
    info!(
        "loaded {} student(s), {} assignment(s), {} iteration(s)",
        inputs.students.len(),
        inputs.assignments.len(),
        inputs.iterations.len()
    );
    Ok(inputs)
}

pub async fn final_grades(course: &Course<'_>) -> Result<Gradebook> {
    let inputs = load_inputs(course).await?;
    Ok(compute(&inputs, &course.config.grading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Deliverable;
    use crate::records::{GroupRecord, StudentRecord};
    use crate::workflows::testing::{config, course_forge, settings};
    use chrono::{DateTime, TimeZone, Utc};

    fn grade(subject: &str, entity: &str, total: u32) -> GradeRecord {
        GradeRecord {
            subject: subject.to_string(),
            entity: entity.to_string(),
            grade: format!("# Grade for something\n\n**Total:** {total}\n"),
        }
    }

    #[tokio::test]
    async fn loads_totals_and_late_days() {
        let forge = course_forge();
        let settings = settings();
        let mut config = config();
        config.assignments.push(Deliverable {
            id: "1".to_string(),
            due: Some(DateTime::parse_from_rfc3339("2026-02-01T00:00:00+00:00").expect("due")),
        });
        let course = Course::new(&forge, &settings, config);
        let db = course.database();

        db.insert(
            Table::Students,
            &StudentRecord {
                github: "alice".to_string(),
                hopkins: "A1".to_string(),
            },
        )
        .await
        .expect("student");
        db.insert(
            Table::Groups,
            &GroupRecord {
                identifier: "g1".to_string(),
                members: vec!["alice".to_string()],
            },
        )
        .await
        .expect("group");
        for record in [
            grade("assignments/1", "alice", 80),
            grade("quiz", "alice", 90),
            grade("iterations/1", "g1", 70),
            grade("iterations/2", "g1", 100),
            grade("assignments/1", "alice", 85),
        ] {
            db.insert(Table::Grades, &record).await.expect("grade");
        }
        db.insert(
            Table::Assignments,
            &AssignmentSubmission {
                assignment: "1".to_string(),
                github: "alice".to_string(),
                commit: "abc".to_string(),
                time: Utc.with_ymd_and_hms(2026, 2, 3, 1, 0, 0).unwrap(),
            },
        )
        .await
        .expect("submission");

        let inputs = load_inputs(&course).await.expect("inputs");
        assert_eq!(inputs.assignments["1"]["alice"], 85);
        assert_eq!(inputs.quiz["alice"], 90);
        assert_eq!(inputs.late_days[&("1".to_string(), "alice".to_string())], 3);

        let book = final_grades(&course).await.expect("final grades");
        let alice = &book.students[0];
        assert_eq!(alice.late_days, 3);
        assert!((alice.iterations_total - 70.0).abs() < 1e-9);
        assert!((alice.project_total - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mixed_case_assignment_ids_line_up() {
        let forge = course_forge();
        let settings = settings();
        let mut config = config();
        config.assignments.push(Deliverable {
            id: "HW1".to_string(),
            due: Some(DateTime::parse_from_rfc3339("2026-02-01T00:00:00+00:00").expect("due")),
        });
        let course = Course::new(&forge, &settings, config);
        let db = course.database();
        db.insert(
            Table::Students,
            &StudentRecord {
                github: "alice".to_string(),
                hopkins: "A1".to_string(),
            },
        )
        .await
        .expect("student");
        let subject: Subject = "assignment:HW1".parse().expect("subject");
        db.insert(Table::Grades, &grade(&subject.slug(), "alice", 90))
            .await
            .expect("grade");
        db.insert(
            Table::Assignments,
            &AssignmentSubmission {
                assignment: "HW1".to_string(),
                github: "alice".to_string(),
                commit: "abc".to_string(),
                time: Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap(),
            },
        )
        .await
        .expect("submission");

        let inputs = load_inputs(&course).await.expect("inputs");
        assert_eq!(inputs.assignments["HW1"]["alice"], 90);

        let mut policy = course.config.grading.clone();
        let alice = &compute(&inputs, &policy).students[0];
        assert_eq!(alice.assignments[0].late_days, 2);
        assert_eq!(alice.late_days, 2);

        policy
            .ignored_assignments
            .insert("alice".to_string(), vec!["HW1".to_string()]);
        let alice = &compute(&inputs, &policy).students[0];
        assert!(alice.assignments[0].ignored);
        assert_eq!(alice.late_days, 0);
    }

    #[tokio::test]
    async fn grade_without_total_is_fatal() {
        let forge = course_forge();
        let settings = settings();
        let course = Course::new(&forge, &settings, config());
        course
            .database()
            .insert(
                Table::Grades,
                &GradeRecord {
                    subject: "quiz".to_string(),
                    entity: "alice".to_string(),
                    grade: "# Grade for Quiz\n\nno total".to_string(),
                },
            )
            .await
            .expect("grade");

        let err = load_inputs(&course).await.expect_err("missing total");
        assert!(format!("{err:#}").contains("grade of alice for Quiz"));
    }
}
