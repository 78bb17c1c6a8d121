//! quickscan document scanner
//!
//! Progressive scanning of uploaded documents: an instant metadata preview,
//! fast text extraction from the first pages, keyword-based recognition with
//! field extraction, and an optional background deep analysis.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
