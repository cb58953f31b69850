use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

#[cfg(test)]
use mockall::automock;

use crate::error::Error;

pub mod memory;
pub mod postgres;
pub mod postgrest;

/// The normalized filter set applied to the feedback listing.
/// Serialized verbatim as `filters_applied`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackFilters {
    pub limit: i64,
    pub jenis_feedback: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// One row of the feedback table, kept exactly as the store returned it.
///
/// Only `created_at` and `jenis_feedback` are ever looked at (by the in-memory store);
/// every other column is passed through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackRecord(pub Map<String, Value>);

impl FeedbackRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn jenis_feedback(&self) -> Option<&str> {
        self.get("jenis_feedback").and_then(Value::as_str)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// The projection fetched for statistics.
/// Both columns are nullable, since rows written outside this gateway may lack either.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub jenis_feedback: Option<String>,
    pub rating_kepuasan: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackType {
    Saran,
    Keluhan,
    Pujian,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackStatus {
    /// Every submission starts out waiting for review
    #[default]
    Menunggu,
}

/// A validated submission, ready to be inserted.
/// `id` and `created_at` are assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub nama: String,
    pub email: Option<String>,
    pub jenis_feedback: FeedbackType,
    pub subjek: String,
    pub pesan_feedback: String,
    pub rating_kepuasan: i64,
    pub photo_url: Option<String>,
    pub status: FeedbackStatus,
}

#[async_trait]
#[cfg_attr(test, automock)]
pub trait FeedbackQueries {
    /// Rows matching `filters`, newest first, at most `filters.limit` of them
    async fn query_feedback(&self, filters: &FeedbackFilters)
    -> Result<Vec<FeedbackRecord>, Error>;

    /// `jenis_feedback` and `rating_kepuasan` of every row in the table.
    /// Filters never apply here.
    async fn query_feedback_statistics_rows(&self) -> Result<Vec<StatisticsRow>, Error>;

    /// Insert one row and return it as stored
    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRecord, Error>;

    async fn health(&self) -> Result<(), Error>;
}
