//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with an
//! optional daily-rolling JSON file written through tracing-appender.

pub mod logger;

pub use logger::{LogFormat, LoggerImpl};
