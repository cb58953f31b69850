//! Listing endpoint: filtered feedback rows plus statistics over the whole table

use axum::Json;
use axum::extract::{RawQuery, State};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::{FeedbackFilters, FeedbackQueries, FeedbackRecord};
use crate::error::{Error, ErrorDetails};
use crate::statistics::{StatisticsBlock, compute_statistics};
use crate::utils::gateway::AppState;

pub const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct GetFeedbackDataResponse {
    pub success: bool,
    pub data: Vec<FeedbackRecord>,
    pub statistics: StatisticsBlock,
    pub total_records: usize,
    pub filters_applied: FeedbackFilters,
}

/// HTTP handler for `GET /get-feedback-data`
#[instrument(name = "get_feedback_data_handler", skip_all)]
pub async fn get_feedback_data_handler(
    State(app_state): AppState,
    RawQuery(query): RawQuery,
) -> Result<Json<GetFeedbackDataResponse>, Error> {
    counter!("survei_requests_total", "endpoint" => "get_feedback_data").increment(1);
    let filters = parse_feedback_params(query.as_deref())?;
    let response = get_feedback_data(app_state.feedback_store.as_ref(), filters).await?;
    Ok(Json(response))
}

/// Turn the raw query string into a filter set.
///
/// An empty value counts as absent, and only the first occurrence of a key is used.
/// A `limit` without a leading integer makes the whole listing fail.
pub fn parse_feedback_params(query: Option<&str>) -> Result<FeedbackFilters, Error> {
    let mut limit: Option<String> = None;
    let mut jenis_feedback: Option<String> = None;
    let mut start_date: Option<String> = None;
    let mut end_date: Option<String> = None;

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let slot = match key.as_ref() {
            "limit" => &mut limit,
            "jenis_feedback" => &mut jenis_feedback,
            "start_date" => &mut start_date,
            "end_date" => &mut end_date,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    let limit = match non_empty(limit) {
        None => DEFAULT_LIMIT,
        Some(raw) => parse_leading_integer(&raw).ok_or_else(|| {
            Error::new(ErrorDetails::FeedbackListing {
                message: format!("`limit` is not an integer: `{raw}`"),
            })
        })?,
    };

    Ok(FeedbackFilters {
        limit,
        jenis_feedback: non_empty(jenis_feedback),
        start_date: non_empty(start_date),
        end_date: non_empty(end_date),
    })
}

/// Lenient integer parse: leading whitespace, an optional sign, then the longest run of
/// digits (hex after a `0x` prefix). Trailing garbage is ignored. Saturates instead of
/// overflowing.
fn parse_leading_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (radix, digits) = match unsigned.get(..2) {
        Some("0x" | "0X") => (16, &unsigned[2..]),
        _ => (10, unsigned),
    };
    let run: Vec<i64> = digits
        .chars()
        .map_while(|c| c.to_digit(radix))
        .map(i64::from)
        .collect();
    if run.is_empty() {
        return None;
    }
    let magnitude = run.into_iter().fold(0i64, |acc, digit| {
        acc.saturating_mul(i64::from(radix)).saturating_add(digit)
    });
    Some(if negative { -magnitude } else { magnitude })
}

/// Core business logic for the listing endpoint.
///
/// The listing and the statistics rows are fetched concurrently. They are not a consistent
/// snapshot: a write landing between them shows up in one and not the other.
pub async fn get_feedback_data(
    database: &(dyn FeedbackQueries + Sync),
    filters: FeedbackFilters,
) -> Result<GetFeedbackDataResponse, Error> {
    let (listing, statistics_rows) = tokio::join!(
        database.query_feedback(&filters),
        database.query_feedback_statistics_rows(),
    );

    let data = listing.map_err(|e| {
        Error::new(ErrorDetails::FeedbackListing {
            message: e.to_string(),
        })
    })?;

    let statistics = match statistics_rows {
        Ok(rows) => StatisticsBlock::Computed(compute_statistics(&rows)),
        Err(e) => {
            tracing::warn!("Responding without statistics: {e}");
            StatisticsBlock::Unavailable {}
        }
    };

    Ok(GetFeedbackDataResponse {
        success: true,
        total_records: data.len(),
        data,
        statistics,
        filters_applied: filters,
    })
}
