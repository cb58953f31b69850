pub mod config;
pub mod cors;
pub mod db;
pub mod endpoints;
pub mod error;
pub mod observability;
pub mod routes;
pub mod statistics;
pub mod storage;
pub mod utils;
