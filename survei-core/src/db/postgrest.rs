use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::db::{FeedbackFilters, FeedbackQueries, FeedbackRecord, NewFeedback, StatisticsRow};
use crate::error::{Error, ErrorDetails};

pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

/// Talks to a PostgREST data API (`<base>/rest/v1/<table>`), authenticating with an anon key.
#[derive(Debug)]
pub struct PostgrestFeedbackStore {
    client: reqwest::Client,
    table_url: Url,
    anon_key: SecretString,
}

impl PostgrestFeedbackStore {
    pub fn new(base_url: &str, anon_key: SecretString, table: &str) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Invalid PostgREST base URL `{base_url}`: {e}"),
            })
        })?;
        // Without a trailing slash, `join` would replace the last path segment
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }
        let table_url = base_url.join(&format!("rest/v1/{table}")).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Invalid PostgREST table URL for `{table}`: {e}"),
            })
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            table_url,
            anon_key,
        })
    }

    /// Build a client from `SUPABASE_URL` and `SUPABASE_ANON_KEY`
    pub fn from_env(table: &str) -> Result<Self, Error> {
        let base_url = std::env::var(SUPABASE_URL_ENV).map_err(|_| {
            Error::new(ErrorDetails::Config {
                message: format!("Missing environment variable `{SUPABASE_URL_ENV}`"),
            })
        })?;
        let anon_key = std::env::var(SUPABASE_ANON_KEY_ENV).map_err(|_| {
            Error::new(ErrorDetails::Config {
                message: format!("Missing environment variable `{SUPABASE_ANON_KEY_ENV}`"),
            })
        })?;
        Self::new(&base_url, SecretString::from(anon_key), table)
    }

    pub fn table_url(&self) -> &Url {
        &self.table_url
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, self.table_url.clone())
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(self.anon_key.expose_secret())
    }

    async fn read_rows<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, Error> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::new(ErrorDetails::StoreQuery {
                message: format!("PostgREST responded with {status}: {body}"),
            }));
        }
        serde_json::from_str(&body).map_err(|e| {
            Error::new(ErrorDetails::Serialization {
                message: format!("Failed to parse PostgREST response: {e}"),
            })
        })
    }
}

/// Query parameters for the listing request, in PostgREST's operator syntax
pub fn listing_query_params(filters: &FeedbackFilters) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("order", "created_at.desc".to_string()),
        ("limit", filters.limit.to_string()),
    ];
    if let Some(jenis_feedback) = &filters.jenis_feedback {
        params.push(("jenis_feedback", format!("eq.{jenis_feedback}")));
    }
    if let Some(start_date) = &filters.start_date {
        params.push(("created_at", format!("gte.{start_date}")));
    }
    if let Some(end_date) = &filters.end_date {
        params.push(("created_at", format!("lte.{end_date}")));
    }
    params
}

#[async_trait]
impl FeedbackQueries for PostgrestFeedbackStore {
    async fn query_feedback(
        &self,
        filters: &FeedbackFilters,
    ) -> Result<Vec<FeedbackRecord>, Error> {
        let response = self
            .request(Method::GET)
            .query(&listing_query_params(filters))
            .send()
            .await?;
        Self::read_rows(response).await
    }

    async fn query_feedback_statistics_rows(&self) -> Result<Vec<StatisticsRow>, Error> {
        let response = self
            .request(Method::GET)
            .query(&[("select", "jenis_feedback,rating_kepuasan")])
            .send()
            .await?;
        Self::read_rows(response).await
    }

    async fn insert_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackRecord, Error> {
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(feedback)
            .send()
            .await?;
        let mut rows: Vec<FeedbackRecord> = Self::read_rows(response).await.map_err(|e| {
            Error::new(ErrorDetails::StoreInsert {
                message: e.to_string(),
            })
        })?;
        if rows.is_empty() {
            return Err(Error::new(ErrorDetails::StoreInsert {
                message: "PostgREST returned no row for the insert".to_string(),
            }));
        }
        Ok(rows.swap_remove(0))
    }

    async fn health(&self) -> Result<(), Error> {
        let response = self
            .request(Method::GET)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::new(ErrorDetails::StoreConnection {
                message: format!("PostgREST health check responded with {status}"),
            }))
        }
    }
}
