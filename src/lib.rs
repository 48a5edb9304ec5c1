//! Syncbridge: an integration and synchronization engine between a
//! back-office record system and its surrounding SaaS services.
//!
//! The engine owns four concerns: OAuth2 token lifecycle per service,
//! outbound request budgeting through a fixed-window rate limiter, a
//! durable priority-ordered sync queue drained by a background worker,
//! and an HMAC-verified webhook receiver for inbound events. Everything
//! that crosses a service boundary is recorded in an append-only sync
//! log.

pub mod adapters;
pub mod api_client;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod repositories;
pub mod server;
pub mod services;
pub mod telemetry;
pub mod token_manager;
pub mod webhooks;
pub mod worker;
