use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, ErrorDetails};
use crate::storage::PhotoStorageKind;

/// Photos larger than this are rejected unless `[gateway].max_photo_size_bytes` says otherwise.
pub const DEFAULT_MAX_PHOTO_SIZE_BYTES: u64 = 5 * 1024 * 1024;

pub const DEFAULT_FEEDBACK_TABLE: &str = "feedback_survei";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub photo_storage: PhotoStorageKind,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind_address: Option<SocketAddr>,
    #[serde(default = "default_max_photo_size_bytes")]
    pub max_photo_size_bytes: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            max_photo_size_bytes: DEFAULT_MAX_PHOTO_SIZE_BYTES,
        }
    }
}

fn default_max_photo_size_bytes() -> u64 {
    DEFAULT_MAX_PHOTO_SIZE_BYTES
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(rename = "type", default)]
    pub kind: StoreKind,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            table: default_table(),
        }
    }
}

fn default_table() -> String {
    DEFAULT_FEEDBACK_TABLE.to_string()
}

/// Which backend holds the feedback table.
/// Credentials are never read from the config file, only from the environment.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// PostgREST data API (`SUPABASE_URL` + `SUPABASE_ANON_KEY`)
    Postgrest,
    /// Direct Postgres connection (`SURVEI_POSTGRES_URL`)
    Postgres,
    #[default]
    Memory,
}

impl Config {
    /// Read, parse and validate a TOML config file
    pub fn load_from_path(path: &Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to read config file `{}`: {e}", path.display()),
            })
        })?;
        let config = Config::parse(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Config, Error> {
        toml::from_str(contents).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to parse config:\n{e}"),
            })
        })
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !is_valid_table_name(&self.store.table) {
            return Err(Error::new(ErrorDetails::Config {
                message: format!(
                    "`[store].table` must be a plain identifier (letters, digits and underscores), got `{}`",
                    self.store.table
                ),
            }));
        }
        if self.gateway.max_photo_size_bytes == 0 {
            return Err(Error::new(ErrorDetails::Config {
                message: "`[gateway].max_photo_size_bytes` must be greater than zero".to_string(),
            }));
        }
        Ok(())
    }
}

/// The table name is spliced into SQL and URL paths, so it has to be a bare identifier.
fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
