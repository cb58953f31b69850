//! Feedback queries against a Postgres database.
//!
//! Rows are selected as `to_json(row)`, so columns this crate knows nothing about are
//! still returned, in table order. Date bounds are bound as text and cast by the database.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};

use crate::db::{FeedbackFilters, FeedbackQueries, FeedbackRecord, NewFeedback, StatisticsRow};
use crate::error::{Error, ErrorDetails};

pub const POSTGRES_URL_ENV: &str = "SURVEI_POSTGRES_URL";

#[derive(Debug, Clone)]
pub struct PostgresFeedbackStore {
    pool: PgPool,
    table: String,
}

impl PostgresFeedbackStore {
    pub async fn new(postgres_url: &str, table: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .connect(postgres_url)
            .await
            .map_err(|err| {
                Error::new(ErrorDetails::StoreConnection {
                    message: err.to_string(),
                })
            })?;
        Ok(Self::new_with_pool(pool, table))
    }

    pub fn new_with_pool(pool: PgPool, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    /// Connect using `SURVEI_POSTGRES_URL`
    pub async fn from_env(table: &str) -> Result<Self, Error> {
        let postgres_url = std::env::var(POSTGRES_URL_ENV).map_err(|_| {
            Error::new(ErrorDetails::Config {
                message: format!("Missing environment variable `{POSTGRES_URL_ENV}`"),
            })
        })?;
        Self::new(&postgres_url, table).await
    }
}

/// The table name has already been validated as a plain identifier when the config was loaded.
fn quoted_table(table: &str) -> String {
    format!("\"{table}\"")
}

fn build_listing_query(table: &str, filters: &FeedbackFilters) -> QueryBuilder<Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT to_json(f) FROM {} AS f WHERE TRUE",
        quoted_table(table)
    ));
    if let Some(jenis_feedback) = &filters.jenis_feedback {
        qb.push(" AND f.jenis_feedback::text = ");
        qb.push_bind(jenis_feedback.clone());
    }
    if let Some(start_date) = &filters.start_date {
        qb.push(" AND f.created_at >= ");
        qb.push_bind(start_date.clone());
        qb.push("::timestamptz");
    }
    if let Some(end_date) = &filters.end_date {
        qb.push(" AND f.created_at <= ");
        qb.push_bind(end_date.clone());
        qb.push("::timestamptz");
    }
    qb.push(" ORDER BY f.created_at DESC LIMIT ");
    qb.push_bind(filters.limit);
    qb
}

fn build_statistics_query(table: &str) -> QueryBuilder<Postgres> {
    QueryBuilder::new(format!(
        "SELECT jenis_feedback::text, rating_kepuasan::int8 FROM {}",
        quoted_table(table)
    ))
}

fn build_insert_query(table: &str, feedback: &NewFeedback) -> QueryBuilder<Postgres> {
    let mut qb = QueryBuilder::new(format!(
        r"
        WITH inserted AS (
            INSERT INTO {} (nama, email, jenis_feedback, subjek, pesan_feedback, rating_kepuasan, photo_url, status)
            VALUES (",
        quoted_table(table)
    ));
    let mut values = qb.separated(", ");
    values.push_bind(feedback.nama.clone());
    values.push_bind(feedback.email.clone());
    values.push_bind(feedback.jenis_feedback.to_string());
    values.push_bind(feedback.subjek.clone());
    values.push_bind(feedback.pesan_feedback.clone());
    values.push_bind(feedback.rating_kepuasan);
    values.push_bind(feedback.photo_url.clone());
    values.push_bind(feedback.status.to_string());
    qb.push(
        r")
            RETURNING *
        )
        SELECT to_json(inserted) FROM inserted",
    );
    qb
}

#[async_trait]
impl FeedbackQueries for PostgresFeedbackStore {
    async fn query_feedback(
        &self,
        filters: &FeedbackFilters,
    ) -> Result<Vec<FeedbackRecord>, Error> {
        let mut qb = build_listing_query(&self.table, filters);
        let rows: Vec<Json<FeedbackRecord>> =
            qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(record)| record).collect())
    }

    async fn query_feedback_statistics_rows(&self) -> Result<Vec<StatisticsRow>, Error> {
        let mut qb = build_statistics_query(&self.table);
        let rows: Vec<(Option<String>, Option<i64>)> =
            qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(jenis_feedback, rating_kepuasan)| StatisticsRow {
                jenis_feedback,
                rating_kepuasan,
            })
            .collect())
    }

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRecord, Error> {
        let mut qb = build_insert_query(&self.table, feedback);
        let Json(record): Json<FeedbackRecord> = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::StoreInsert {
                    message: e.to_string(),
                })
            })?;
        Ok(record)
    }

    async fn health(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::StoreConnection {
                    message: format!("Postgres health check failed: {e}"),
                })
            })?;
        Ok(())
    }
}
