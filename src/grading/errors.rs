use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Structural,
    Validation,
}

/// Problems found while reading part files. They are collected across a
/// whole aggregation run rather than returned one at a time.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum GradeError {
    #[error("{file}: missing `{heading}` heading")]
    MissingHeading { file: String, heading: String },

    #[error("{file}:{line}: malformed point line `{text}`")]
    MalformedPointLine {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}:{line}: `{text}` appears before the first {section} entry")]
    StrayLine {
        file: String,
        line: usize,
        text: String,
        section: String,
    },

    #[error("{file}:{line}: duplicate {kind} `{identifier}`")]
    Duplicate {
        file: String,
        line: usize,
        kind: String,
        identifier: String,
    },

    #[error("{file}:{line}: malformed student header `{text}`")]
    MalformedHeader {
        file: String,
        line: usize,
        text: String,
    },

    #[error("{file}:{line}: `{text}` for `{student}` is neither a rubric item nor a point line")]
    UnrecognizedLine {
        file: String,
        line: usize,
        student: String,
        text: String,
    },

    #[error("{file}: entry for `{student}` does not end with a grader line")]
    MissingGrader { file: String, student: String },

    #[error("{file}: grader `{grader}` for `{student}` is not on the staff roster")]
    UnknownGrader {
        file: String,
        student: String,
        grader: String,
    },

    #[error("{file}: students differ from {reference} (missing: {missing:?}, unexpected: {unexpected:?})")]
    StudentSetMismatch {
        file: String,
        reference: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl GradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingHeading { .. } => ErrorKind::Structural,
            _ => ErrorKind::Validation,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            Self::MissingHeading { file, .. }
            | Self::MalformedPointLine { file, .. }
            | Self::StrayLine { file, .. }
            | Self::Duplicate { file, .. }
            | Self::MalformedHeader { file, .. }
            | Self::UnrecognizedLine { file, .. }
            | Self::MissingGrader { file, .. }
            | Self::UnknownGrader { file, .. }
            | Self::StudentSetMismatch { file, .. } => file,
        }
    }
}

/// Raised when an aggregation run finished with errors; nothing was published.
#[derive(Debug, Clone, Error)]
#[error("{count} grading error(s) for {subject}", count = .errors.len())]
pub struct GradingFailed {
    pub subject: String,
    pub errors: Vec<GradeError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no `**Total:**` line found in {context}")]
pub struct MissingDataError {
    pub context: String,
}
