use anyhow::Result;

use crate::batch::BatchReport;
use crate::final_grade::{DistributionRow, ExportRow, Gradebook};
use crate::grading::Aggregation;

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn students_to_csv(book: &Gradebook) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let mut header = vec!["github".to_string(), "hopkins".to_string()];
    header.extend(book.assignments.iter().map(|a| format!("assignment_{a}")));
    header.extend(book.assignments.iter().map(|a| format!("late_days_{a}")));
    header.extend(
        [
            "late_days",
            "late_days_penalty",
            "assignments_average",
            "assignments_total",
            "quiz",
            "group",
        ]
        .map(str::to_string),
    );
    header.extend(book.iterations.iter().map(|i| format!("iteration_{i}")));
    header.extend(
        [
            "iterations_total",
            "project",
            "adjustment",
            "project_total",
            "weighted",
            "letter",
        ]
        .map(str::to_string),
    );
    writer.write_record(&header)?;

    for student in &book.students {
        let mut record = vec![student.github.clone(), student.hopkins.clone()];
        record.extend(student.assignments.iter().map(|a| {
            if a.ignored {
                String::new()
            } else {
                a.score.to_string()
            }
        }));
        record.extend(student.assignments.iter().map(|a| a.late_days.to_string()));
        record.extend([
            student.late_days.to_string(),
            format!("{:.4}", student.late_days_penalty),
            format!("{:.4}", student.assignments_average),
            format!("{:.4}", student.assignments_total),
            student.quiz.to_string(),
            student.group.clone().unwrap_or_default(),
        ]);
        record.extend(book.iterations.iter().map(|id| {
            student
                .iterations
                .iter()
                .find(|i| &i.iteration == id)
                .map(|i| i.score.to_string())
                .unwrap_or_default()
        }));
        record.extend([
            format!("{:.4}", student.iterations_total),
            format!("{:.4}", student.project),
            format!("{:.4}", student.adjustment),
            format!("{:.4}", student.project_total),
            format!("{:.4}", student.weighted),
            student.letter.clone().unwrap_or_default(),
        ]);
        writer.write_record(&record)?;
    }
    finish(writer)
}

pub fn groups_to_csv(book: &Gradebook) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let mut header = vec!["group".to_string(), "members".to_string()];
    header.extend(book.iterations.iter().map(|i| format!("iteration_{i}")));
    header.extend(["iterations_total".to_string(), "project".to_string()]);
    writer.write_record(&header)?;
    for group in &book.groups {
        let mut record = vec![group.identifier.clone(), group.members.join(" ")];
        record.extend(group.iterations.iter().map(|i| i.score.to_string()));
        record.extend([
            format!("{:.4}", group.iterations_total),
            format!("{:.4}", group.project),
        ]);
        writer.write_record(&record)?;
    }
    finish(writer)
}

pub fn distribution_to_csv(rows: &[DistributionRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["letter", "count"])?;
    for row in rows {
        writer.write_record([row.letter.clone(), row.count.to_string()])?;
    }
    finish(writer)
}

/// Registrar upload format: Hopkins id and letter only.
pub fn export_to_csv(rows: &[ExportRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["hopkins", "grade"])?;
    for row in rows {
        writer.write_record([&row.hopkins, &row.grade])?;
    }
    finish(writer)
}

pub fn batch_to_csv(report: &BatchReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["entity", "status", "error"])?;
    for entity in &report.succeeded {
        writer.write_record([entity.as_str(), "ok", ""])?;
    }
    for entity in &report.skipped {
        writer.write_record([entity.as_str(), "skipped", ""])?;
    }
    for failure in &report.failed {
        writer.write_record([failure.entity.as_str(), "failed", failure.error.as_str()])?;
    }
    finish(writer)
}

pub fn aggregation_to_csv(aggregation: &Aggregation) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["subject", "entity", "total", "graders"])?;
    let subject = aggregation.subject.slug();
    for grade in &aggregation.grades {
        writer.write_record([
            subject.clone(),
            grade.entity.clone(),
            grade.total.to_string(),
            grade.graders.join(" "),
        ])?;
    }
    finish(writer)
}
