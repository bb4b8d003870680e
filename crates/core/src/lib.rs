// crates/core/src/lib.rs
//! Domain types and collaborator contracts for scrape jobs.
//!
//! A scrape job pulls pages of [`Lead`]s from an [`Extractor`] and hands
//! them to a [`LeadStore`]. Neither contract knows about the job protocol.

pub mod error;
pub mod extractor;
pub mod hechos;
pub mod seia;
pub mod store;
pub mod types;

pub use error::*;
pub use extractor::Extractor;
pub use hechos::HechosEsencialesExtractor;
pub use seia::{SeiaConfig, SeiaExtractor};
pub use store::LeadStore;
pub use types::*;
