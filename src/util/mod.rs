//! Utility modules: retry with backoff, UTF-8 safe truncation.

pub mod retry;
pub mod truncate;
