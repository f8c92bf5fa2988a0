//! Search sync service: tails the catalog topic and keeps the product
//! search index convergent with the catalog database.

pub mod config;
pub mod consumer;
pub mod dlq;
pub mod handlers;
