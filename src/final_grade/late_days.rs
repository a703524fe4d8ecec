use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::config::Deliverable;
use crate::records::AssignmentSubmission;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days past the due time, rounded up; zero when on time.
pub fn late_days(submitted: DateTime<Utc>, due: DateTime<FixedOffset>) -> u32 {
    let late = (submitted - due.with_timezone(&Utc)).num_seconds();
    if late <= 0 {
        return 0;
    }
    let days = (late + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Late days keyed by (assignment, github), using the latest submission of
/// each pair. Assignments without a configured due time are never late.
pub fn late_days_by_submission(
    submissions: &[AssignmentSubmission],
    assignments: &[Deliverable],
) -> BTreeMap<(String, String), u32> {
    let mut latest: BTreeMap<(String, String), DateTime<Utc>> = BTreeMap::new();
    for submission in submissions {
        let key = (submission.assignment.clone(), submission.github.clone());
        let slot = latest.entry(key).or_insert(submission.time);
        if submission.time > *slot {
            *slot = submission.time;
        }
    }

    latest
        .into_iter()
        .map(|((assignment, github), time)| {
            let days = assignments
                .iter()
                .find(|a| a.id == assignment)
                .and_then(|a| a.due)
                .map(|due| late_days(time, due))
                .unwrap_or(0);
            ((assignment, github), days)
        })
        .collect()
}
