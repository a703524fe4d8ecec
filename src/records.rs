use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Wraps a record in a fenced JSON block suitable for an issue comment.
pub fn serialize<T: Serialize + ?Sized>(record: &T) -> serde_json::Result<String> {
    let payload = serde_json::to_string_pretty(record)?;
    Ok(format!("{FENCE_OPEN}\n{payload}\n{FENCE_CLOSE}\n"))
}

/// Strips the fence markers from a comment body and parses the JSON inside.
pub fn deserialize<T: DeserializeOwned>(body: &str) -> serde_json::Result<T> {
    let trimmed = body.trim();
    let without_open = trimmed.strip_prefix(FENCE_OPEN).unwrap_or(trimmed);
    let payload = without_open
        .strip_suffix(FENCE_CLOSE)
        .unwrap_or(without_open);
    serde_json::from_str(payload)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentRecord {
    pub github: String,
    pub hopkins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub identifier: String,
    pub members: Vec<String>,
}

impl GroupRecord {
    pub fn contains(&self, github: &str) -> bool {
        self.members.iter().any(|m| m == github)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentSubmission {
    pub assignment: String,
    pub github: String,
    pub commit: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationSubmission {
    pub iteration: String,
    pub group: String,
    pub commit: String,
    pub time: DateTime<Utc>,
}

/// A published aggregate grade, keyed by subject slug and entity (student
/// or group identifier).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeRecord {
    pub subject: String,
    pub entity: String,
    pub grade: String,
}

/// Feedback forms are free-form; only the fields used by `insights` are typed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub assignment: String,
    #[serde(default)]
    pub github: Option<String>,
    pub feedback: FeedbackAnswers,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackAnswers {
    #[serde(default)]
    pub assignment: FeedbackScale,
    #[serde(default)]
    pub lecture: FeedbackScale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolbox: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackScale {
    #[serde(default, deserialize_with = "lenient_number")]
    pub hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub relevance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub difficulty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub load: Option<f64>,
}

// Form answers arrive as strings ("3") as often as numbers.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
