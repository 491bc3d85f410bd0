//! Typed configuration for the Courier message bus.
//!
//! This crate provides:
//! - TOML and JSON configuration files
//! - Environment variable overrides, optionally from a `.env` file
//! - Strict validation (unknown fields are rejected)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`CourierConfig`] holds every section:
//!
//! - [`BusConfig`] - bus name and unhandled-message policy
//! - [`TransportConfig`] - named transports and their connection strings
//! - [`RouteConfig`] - per-message routing, deduplication, transactions, caching
//! - [`SecurityConfig`] - default identity provider
//! - [`WorkerConfig`] - worker polling
//! - `LogConfig` - logging, from `courier-telemetry`
//!
//! # Configuration File Format
//!
//! ```toml
//! [bus]
//! name = "command.bus"
//!
//! [transports.async]
//! dsn = "nats://localhost:4222?stream=jobs"
//!
//! [transports.sync]
//! dsn = "in-memory://"
//!
//! [[routing]]
//! message = "ImportCatalog"
//! senders = ["async"]
//! deduplicate = true
//!
//! [[routing]]
//! message = "GetProduct"
//! cache = { ttl_secs = 60, tags = ["products"] }
//!
//! [security]
//! default_provider = "main"
//!
//! [worker]
//! poll_interval_ms = 500
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `COURIER__BUS__NAME=event.bus`
//! - `COURIER__TRANSPORTS__ASYNC__DSN=nats://broker:4222?stream=jobs`
//! - `COURIER__WORKER__RECEIVERS=async,audit`
//! - `COURIER__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::CourierConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{BusConfig, RouteConfig, SecurityConfig, TransportConfig, WorkerConfig};
