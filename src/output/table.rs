use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::batch::BatchReport;
use crate::config::DatabaseConfig;
use crate::database::Table as DataTable;
use crate::final_grade::{DistributionRow, ExportRow, Gradebook};
use crate::grading::{Aggregation, GradeError};
use crate::workflows::insights::{Insights, ScaleAverages};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn score(value: f64) -> String {
    format!("{value:.2}")
}

fn optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn render_batch_table(report: &BatchReport) -> String {
    let mut table = new_table();
    table.set_header(vec!["Entity", "Status", "Detail"]);
    for entity in &report.succeeded {
        table.add_row(Row::from(vec![
            Cell::new(entity),
            Cell::new("OK").fg(Color::Green),
            Cell::new(""),
        ]));
    }
    for entity in &report.skipped {
        table.add_row(Row::from(vec![
            Cell::new(entity),
            Cell::new("SKIPPED").fg(Color::Yellow),
            Cell::new(""),
        ]));
    }
    for failure in &report.failed {
        table.add_row(Row::from(vec![
            Cell::new(&failure.entity),
            Cell::new("FAILED").fg(Color::Red),
            Cell::new(&failure.error),
        ]));
    }
    format!("{table}\n{}", report.summary())
}

pub fn render_grade_errors_table(errors: &[GradeError]) -> String {
    let mut table = new_table();
    table.set_header(vec!["File", "Kind", "Problem"]);
    for error in errors {
        table.add_row(vec![
            error.file().to_string(),
            format!("{:?}", error.kind()).to_lowercase(),
            error.to_string(),
        ]);
    }
    table.to_string()
}

pub fn render_aggregation_table(aggregation: &Aggregation) -> String {
    let mut table = new_table();
    table.set_header(vec!["Entity", "Total", "Graders"]);
    for grade in &aggregation.grades {
        table.add_row(vec![
            grade.entity.clone(),
            grade.total.to_string(),
            grade.graders.join(", "),
        ]);
    }
    let parts = aggregation
        .parts
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{table}\n{}: {} grade(s) from {}",
        aggregation.subject,
        aggregation.grades.len(),
        if parts.is_empty() { "no parts" } else { parts.as_str() }
    )
}

/// One row per student; assignment and iteration columns follow what has
/// actually been graded.
pub fn render_students_table(book: &Gradebook) -> String {
    let mut table = new_table();
    let mut header = vec!["GitHub".to_string(), "Hopkins".to_string()];
    header.extend(book.assignments.iter().map(|a| format!("A{a}")));
    header.extend(book.assignments.iter().map(|a| format!("A{a} late")));
    header.extend(
        [
            "Late days",
            "Penalty",
            "Average",
            "Assignments",
            "Quiz",
            "Group",
        ]
        .map(str::to_string),
    );
    header.extend(book.iterations.iter().map(|i| format!("I{i}")));
    header.extend(
        [
            "Iterations",
            "Project",
            "Adjustment",
            "Project total",
            "Weighted",
            "Letter",
        ]
        .map(str::to_string),
    );
    table.set_header(header);

    for student in &book.students {
        let mut row = vec![student.github.clone(), student.hopkins.clone()];
        row.extend(student.assignments.iter().map(|a| {
            if a.ignored {
                "ignored".to_string()
            } else {
                a.score.to_string()
            }
        }));
        row.extend(student.assignments.iter().map(|a| a.late_days.to_string()));
        row.extend([
            student.late_days.to_string(),
            score(student.late_days_penalty),
            score(student.assignments_average),
            score(student.assignments_total),
            student.quiz.to_string(),
            student.group.clone().unwrap_or_else(|| "-".to_string()),
        ]);
        let iterations = book.iterations.iter().map(|id| {
            student
                .iterations
                .iter()
                .find(|i| &i.iteration == id)
                .map(|i| i.score.to_string())
                .unwrap_or_else(|| "-".to_string())
        });
        row.extend(iterations);
        row.extend([
            score(student.iterations_total),
            score(student.project),
            score(student.adjustment),
            score(student.project_total),
            score(student.weighted),
            student.letter.clone().unwrap_or_else(|| "-".to_string()),
        ]);
        table.add_row(row);
    }
    table.to_string()
}

pub fn render_groups_table(book: &Gradebook) -> String {
    let mut table = new_table();
    let mut header = vec!["Group".to_string(), "Members".to_string()];
    header.extend(book.iterations.iter().map(|i| format!("I{i}")));
    header.extend(["Iterations".to_string(), "Project".to_string()]);
    table.set_header(header);
    for group in &book.groups {
        let mut row = vec![group.identifier.clone(), group.members.join(", ")];
        row.extend(group.iterations.iter().map(|i| i.score.to_string()));
        row.extend([score(group.iterations_total), score(group.project)]);
        table.add_row(row);
    }
    table.to_string()
}

pub fn render_distribution_table(rows: &[DistributionRow]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Letter", "Students"]);
    let total = rows.iter().map(|r| r.count).sum::<usize>();
    for row in rows {
        table.add_row(vec![row.letter.clone(), row.count.to_string()]);
    }
    table.add_row(vec!["Total".to_string(), total.to_string()]);
    table.to_string()
}

pub fn render_export_table(rows: &[ExportRow]) -> String {
    let mut table = new_table();
    table.set_header(vec!["Hopkins", "Grade"]);
    for row in rows {
        table.add_row(vec![row.hopkins.clone(), row.grade.clone()]);
    }
    table.to_string()
}

pub fn render_insights_table(insights: &Insights) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Scale",
        "Hours",
        "Confidence",
        "Relevance",
        "Difficulty",
        "Load",
    ]);
    let mut add = |name: &str, scale: &ScaleAverages| {
        table.add_row(vec![
            name.to_string(),
            optional(scale.hours),
            optional(scale.confidence),
            optional(scale.relevance),
            optional(scale.difficulty),
            optional(scale.load),
        ]);
    };
    add("Assignment", &insights.assignment_scale);
    add("Lecture", &insights.lecture_scale);
    format!(
        "{table}\nAssignment {}: {} response(s)",
        insights.assignment, insights.responses
    )
}

pub fn render_database_table(database: &DatabaseConfig) -> String {
    let mut table = new_table();
    table.set_header(vec!["Table", "Issue"]);
    for data in DataTable::ALL {
        table.add_row(vec![
            data.to_string(),
            data.issue(database)
                .map(|n| format!("#{n}"))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradingPolicy;
    use crate::final_grade::{compute, GradebookInputs};
    use crate::records::StudentRecord;
    use std::collections::BTreeMap;

    #[test]
    fn student_columns_follow_graded_work() {
        let inputs = GradebookInputs {
            students: vec![StudentRecord {
                github: "alice".to_string(),
                hopkins: "A1".to_string(),
            }],
            assignments: BTreeMap::from([
                ("1".to_string(), BTreeMap::from([("alice".to_string(), 90)])),
                ("2".to_string(), BTreeMap::new()),
            ]),
            ..GradebookInputs::default()
        };
        let book = compute(&inputs, &GradingPolicy::default());
        let rendered = render_students_table(&book);
        assert!(rendered.contains("A1 late"));
        assert!(rendered.contains("A2"));
        assert!(!rendered.contains("I1"));
    }

    #[test]
    fn batch_table_lists_failures_with_summary() {
        let mut report = BatchReport::new("copy");
        report.success("alice");
        report.failure("bob", "boom");
        let rendered = render_batch_table(&report);
        assert!(rendered.contains("FAILED"));
        assert!(rendered.contains("boom"));
        assert!(rendered.ends_with("copy: 1 succeeded, 0 skipped, 1 failed"));
    }
}
