//! # respot-fetch
//!
//! Command-line downloader built on `respot-core`: connects to an access
//! point, fetches one audio file with its key and reports what it got.

pub mod config;
pub mod fetch;
