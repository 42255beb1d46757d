//! Listing & interaction aggregation engine for the cosplay marketplace.
//!
//! Turns loosely-typed listing queries into deterministic keyset or offset
//! pages (with substring, tag and geo-proximity filtering), coalesces
//! like/collect/view counter bumps into batched delayed writes, and serves
//! detail reads through a short-TTL read-through cache.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
