//! Keyway - premium license keys for a browser extension
//!
//! Keys are issued and revoked from payment-provider webhooks, minted by
//! administrators, and validated on demand by the extension backend.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod payload;
pub mod rate_limit;
pub mod util;
