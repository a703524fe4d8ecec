use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use super::Course;
use crate::database::Table;
use crate::records::{FeedbackRecord, FeedbackScale};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScaleAverages {
    pub hours: Option<f64>,
    pub confidence: Option<f64>,
    pub relevance: Option<f64>,
    pub difficulty: Option<f64>,
    pub load: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub assignment: String,
    pub responses: usize,
    pub assignment_scale: ScaleAverages,
    pub lecture_scale: ScaleAverages,
}

/// Averages the answered questions of every feedback form for `assignment`.
/// Unanswered questions do not count towards their average.
pub fn summarize(assignment: &str, records: &[FeedbackRecord]) -> Insights {
    let matching = records
        .iter()
        .filter(|r| r.assignment == assignment)
        .collect::<Vec<_>>();
    let assignment_scales = matching.iter().map(|r| &r.feedback.assignment).collect::<Vec<_>>();
    let lecture_scales = matching.iter().map(|r| &r.feedback.lecture).collect::<Vec<_>>();
    Insights {
        assignment: assignment.to_string(),
        responses: matching.len(),
        assignment_scale: scale_averages(&assignment_scales),
        lecture_scale: scale_averages(&lecture_scales),
    }
}

fn scale_averages(scales: &[&FeedbackScale]) -> ScaleAverages {
    ScaleAverages {
        hours: average(scales.iter().map(|s| s.hours)),
        confidence: average(scales.iter().map(|s| s.confidence)),
        relevance: average(scales.iter().map(|s| s.relevance)),
        difficulty: average(scales.iter().map(|s| s.difficulty)),
        load: average(scales.iter().map(|s| s.load)),
    }
}

fn average(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let answered = values.flatten().collect::<Vec<_>>();
    if answered.is_empty() {
        return None;
    }
    Some(answered.iter().sum::<f64>() / answered.len() as f64)
}

pub async fn insights(course: &Course<'_>, assignment: &str) -> Result<Insights> {
    let raw: Vec<serde_json::Value> = course.database().select(Table::Feedbacks).await?;
    let records = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<FeedbackRecord>(value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("skipping feedback #{}: {err}", idx + 1);
                None
            }
        })
        .collect::<Vec<_>>();
    Ok(summarize(assignment, &records))
}
