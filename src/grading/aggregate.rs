use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{parse_part, GradeError, MissingDataError, PartFile, StudentGradeEntry, Subject};

static POINTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([-+]\d+)\*\*").expect("valid points pattern"));

const BASE_POINTS: i64 = 100;
const TOTAL_PREFIX: &str = "**Total:**";

#[derive(Debug, Clone)]
pub struct PartSource {
    pub name: String,
    pub text: String,
}

impl PartSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateGrade {
    pub entity: String,
    pub total: u32,
    pub graders: Vec<String>,
    pub document: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub subject: Subject,
    pub parts: Vec<PartFile>,
    pub grades: Vec<AggregateGrade>,
    pub errors: Vec<GradeError>,
}

impl Aggregation {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Grades only when every part parsed and validated cleanly.
    pub fn into_result(self) -> Result<Vec<AggregateGrade>, Vec<GradeError>> {
        if self.errors.is_empty() {
            Ok(self.grades)
        } else {
            Err(self.errors)
        }
    }
}

/// Parses every part (in file-name order) and merges the entries of students
/// present in all of them into one document each.
pub fn aggregate(subject: &Subject, sources: &[PartSource], staff: &[String]) -> Aggregation {
    let mut sorted = sources.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut parts = Vec::new();
    let mut errors = Vec::new();
    for source in sorted {
        let parsed = parse_part(&source.name, &source.text, staff);
        errors.extend(parsed.errors);
        if let Some(part) = parsed.part {
            parts.push(part);
        }
    }

    let Some(reference) = parts.first() else {
        return Aggregation {
            subject: subject.clone(),
            parts,
            grades: Vec::new(),
            errors,
        };
    };

    let expected = reference.students.iter().collect::<BTreeSet<_>>();
    for part in &parts[1..] {
        let actual = part.students.iter().collect::<BTreeSet<_>>();
        if actual != expected {
            errors.push(GradeError::StudentSetMismatch {
                file: part.name.clone(),
                reference: reference.name.clone(),
                missing: expected.difference(&actual).map(|s| s.to_string()).collect(),
                unexpected: actual.difference(&expected).map(|s| s.to_string()).collect(),
            });
        }
    }

    let grades = reference
        .students
        .iter()
        .filter_map(|student| {
            let sections = parts
                .iter()
                .map(|part| part.entry(student).map(|entry| (part, entry)))
                .collect::<Option<Vec<_>>>()?;
            Some(render(subject, student, &sections))
        })
        .collect();

    Aggregation {
        subject: subject.clone(),
        parts,
        grades,
        errors,
    }
}

fn render(subject: &Subject, entity: &str, sections: &[(&PartFile, &StudentGradeEntry)]) -> AggregateGrade {
    let mut document = format!("# Grade for {subject}\n");
    let mut graders: Vec<String> = Vec::new();
    for (part, entry) in sections {
        document.push_str(&format!("\n## {}\n\n[Submission]({})\n", part.title, entry.url));
        for line in entry.lines.iter().flat_map(|l| l.point_lines()) {
            document.push_str(&format!("\n{line}\n"));
        }
        document.push_str(&format!("\n**Grader:** `{}`\n", entry.grader));
        if !graders.contains(&entry.grader) {
            graders.push(entry.grader.clone());
        }
    }

    let total = compute_total(&document);
    document.push_str(&format!("\n{TOTAL_PREFIX} {total}\n"));
    document.push_str(&footer(&graders));

    AggregateGrade {
        entity: entity.to_string(),
        total,
        graders,
        document,
    }
}

fn footer(graders: &[String]) -> String {
    let mentions = graders
        .iter()
        .map(|g| format!("@{g}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "\n---\n\nQuestions about this grade? Comment on this issue and mention the grader \
         of the part you are asking about ({mentions}).\n"
    )
}

/// 100 plus every signed `**N**` token in the text, floored at zero.
pub fn compute_total(text: &str) -> u32 {
    let delta = POINTS
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i64>().ok())
        .fold(0i64, |acc, d| acc.saturating_add(d));
    let total = BASE_POINTS.saturating_add(delta).max(0);
    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Reads the number on the `**Total:**` line of a published grade.
pub fn extract_total(document: &str) -> Result<u32, MissingDataError> {
    document
        .lines()
        .filter_map(|l| l.trim().strip_prefix(TOTAL_PREFIX))
        .find_map(|rest| rest.trim().parse::<u32>().ok())
        .ok_or_else(|| MissingDataError {
            context: "grade document".to_string(),
        })
}
