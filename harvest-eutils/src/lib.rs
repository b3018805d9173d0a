//! NCBI E-utilities adapter for the harvest engine.
//!
//! [`EutilsClient`] implements both remote seams from `harvest-core`:
//! `esearch` answers [`CorpusSource::page`](harvest_core::CorpusSource::page)
//! and `efetch` answers [`ContentSource::fetch`](harvest_core::ContentSource::fetch).
//! Response decoding lives in [`parse`] so it can be tested without a network.

pub mod client;
pub mod parse;

pub use client::{ClientError, EutilsClient};
pub use parse::{parse_esearch, ArticleSplitter};
