//! Keyword-strategy search and download of HRV/TBI research papers.
//!
//! - [`layers`]: papers, strategy configuration, matching, repositories,
//!   the search use case and the download service
//! - [`cli`]: command-line front end wiring them together

pub mod cli;
pub mod layers;
