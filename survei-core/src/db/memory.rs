use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::db::{FeedbackFilters, FeedbackQueries, FeedbackRecord, NewFeedback, StatisticsRow};
use crate::error::{Error, ErrorDetails};

/// An in-process feedback table for local development and tests.
/// Rows are kept in insertion order; ids are assigned sequentially starting at 1.
#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    rows: RwLock<Vec<FeedbackRecord>>,
    next_id: AtomicU64,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table with existing rows, as if another writer had inserted them
    pub fn with_records(records: Vec<FeedbackRecord>) -> Self {
        Self {
            next_id: AtomicU64::new(records.len() as u64),
            rows: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

/// Accepts RFC 3339 timestamps, or a bare `YYYY-MM-DD` meaning midnight UTC
fn parse_date_bound(column: &str, value: &str) -> Result<DateTime<Utc>, Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            Error::new(ErrorDetails::StoreQuery {
                message: format!("invalid input syntax for type timestamp with time zone: `{value}` (in `{column}`)"),
            })
        })
}

fn matches_filters(
    record: &FeedbackRecord,
    jenis_feedback: Option<&str>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> bool {
    if let Some(jenis_feedback) = jenis_feedback
        && record.jenis_feedback() != Some(jenis_feedback)
    {
        return false;
    }
    if start.is_none() && end.is_none() {
        return true;
    }
    // Rows without a readable timestamp never satisfy a date bound
    let Some(created_at) = record.created_at() else {
        return false;
    };
    start.is_none_or(|start| created_at >= start) && end.is_none_or(|end| created_at <= end)
}

#[async_trait]
impl FeedbackQueries for InMemoryFeedbackStore {
    async fn query_feedback(
        &self,
        filters: &FeedbackFilters,
    ) -> Result<Vec<FeedbackRecord>, Error> {
        let limit = usize::try_from(filters.limit).map_err(|_| {
            Error::new(ErrorDetails::StoreQuery {
                message: format!("LIMIT must not be negative, got {}", filters.limit),
            })
        })?;
        let start = filters
            .start_date
            .as_deref()
            .map(|value| parse_date_bound("start_date", value))
            .transpose()?;
        let end = filters
            .end_date
            .as_deref()
            .map(|value| parse_date_bound("end_date", value))
            .transpose()?;

        let rows = self.rows.read().await;
        let mut matching: Vec<&FeedbackRecord> = rows
            .iter()
            .filter(|record| {
                matches_filters(record, filters.jenis_feedback.as_deref(), start, end)
            })
            .collect();
        // Stable sort, so rows with equal timestamps keep insertion order
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(matching.into_iter().take(limit).cloned().collect())
    }

    async fn query_feedback_statistics_rows(&self) -> Result<Vec<StatisticsRow>, Error> {
        let rows = self.rows.read().await;
        rows.iter()
            .map(|record| {
                let projection = Value::Object(
                    ["jenis_feedback", "rating_kepuasan"]
                        .into_iter()
                        .filter_map(|column| {
                            record
                                .get(column)
                                .map(|value| (column.to_string(), value.clone()))
                        })
                        .collect(),
                );
                Ok(serde_json::from_value(projection)?)
            })
            .collect()
    }

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRecord, Error> {
        let Value::Object(columns) = serde_json::to_value(feedback)? else {
            return Err(Error::new(ErrorDetails::StoreInsert {
                message: "feedback did not serialize to a JSON object".to_string(),
            }));
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut row = Map::new();
        row.insert("id".to_string(), Value::from(id));
        row.extend(columns);
        row.insert(
            "created_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        let record = FeedbackRecord(row);
        self.rows.write().await.push(record.clone());
        Ok(record)
    }

    async fn health(&self) -> Result<(), Error> {
        Ok(())
    }
}
