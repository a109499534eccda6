// src/services/mod.rs
pub mod calculations;
pub mod comparator;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod monitor;
pub mod notifications;
pub mod rate_parser;
pub mod rate_source;
