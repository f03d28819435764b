//! fxconv library
//!
//! Rate fetching, caching and conversion for the fxconv currency converter.
//! Exposed as a library so the binary and the integration tests share it.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod convert;
pub mod data;
pub mod refresh;
