//! Client side of the scrape job protocol.
//!
//! - `JobApi` / `HttpJobApi`: start, snapshot and cancel over HTTP
//! - `PollingClient`: start or attach, then poll to a terminal snapshot,
//!   tolerating transient failures

pub mod api;
pub mod error;
pub mod poller;

pub use api::{HttpJobApi, JobApi, API_KEY_HEADER};
pub use error::{ApiCallError, ClientError};
pub use poller::{CancelHandle, ClientPhase, JobEvent, PollConfig, PollingClient};
