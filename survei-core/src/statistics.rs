use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::db::StatisticsRow;

/// Summary of the whole feedback table, recomputed on every request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStatistics {
    pub total_feedback: u64,
    /// `None` (serialized as `null`) when the table is empty
    pub average_rating: Option<f64>,
    /// Keys appear in the order they were first seen. A missing category counts as `"null"`.
    pub feedback_types: IndexMap<String, u64>,
    /// Rendered as strings on the wire
    pub rating_distribution: BTreeMap<RatingKey, u64>,
}

/// Key of `rating_distribution`. Ratings ascend numerically and a missing rating sorts last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RatingKey {
    Rating(i64),
    Null,
}

const NULL_KEY: &str = "null";

impl From<Option<i64>> for RatingKey {
    fn from(rating: Option<i64>) -> Self {
        rating.map_or(Self::Null, Self::Rating)
    }
}

impl From<RatingKey> for String {
    fn from(key: RatingKey) -> Self {
        match key {
            RatingKey::Rating(rating) => rating.to_string(),
            RatingKey::Null => NULL_KEY.to_string(),
        }
    }
}

impl TryFrom<String> for RatingKey {
    type Error = std::num::ParseIntError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        if key == NULL_KEY {
            return Ok(Self::Null);
        }
        key.parse().map(Self::Rating)
    }
}

/// The `statistics` member of a listing response.
/// Serializes as `{}` when the statistics query failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatisticsBlock {
    Computed(FeedbackStatistics),
    Unavailable {},
}

/// A missing rating still counts towards the total, and adds nothing to the sum.
pub fn compute_statistics(rows: &[StatisticsRow]) -> FeedbackStatistics {
    let mut rating_sum: i128 = 0;
    let mut feedback_types: IndexMap<String, u64> = IndexMap::new();
    let mut rating_distribution: BTreeMap<RatingKey, u64> = BTreeMap::new();

    for row in rows {
        rating_sum += i128::from(row.rating_kepuasan.unwrap_or_default());
        let jenis_feedback = row.jenis_feedback.as_deref().unwrap_or(NULL_KEY);
        *feedback_types.entry(jenis_feedback.to_string()).or_default() += 1;
        *rating_distribution
            .entry(RatingKey::from(row.rating_kepuasan))
            .or_default() += 1;
    }

    let average_rating = if rows.is_empty() {
        None
    } else {
        Some(round_to_two_decimals(rating_sum as f64 / rows.len() as f64))
    };

    FeedbackStatistics {
        total_feedback: rows.len() as u64,
        average_rating,
        feedback_types,
        rating_distribution,
    }
}

/// Rounds half away from zero
pub fn round_to_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
