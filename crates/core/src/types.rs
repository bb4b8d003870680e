// crates/core/src/types.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::UnknownSource;

/// Upstream data source. Each source is one job key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Environmental impact assessment registry (SEIA).
    Seia,
    /// Material-event filings (CMF "hechos esenciales").
    HechosEsenciales,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Seia, Source::HechosEsenciales];

    /// Job key and URL path segment.
    pub fn key(self) -> &'static str {
        match self {
            Self::Seia => "seia",
            Self::HechosEsenciales => "hechos_esenciales",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Seia => "SEIA",
            Self::HechosEsenciales => "Hechos Esenciales",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.key() == s)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// One opportunity record extracted from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub source: Source,
    pub project_name: String,
    /// Date as published by the source (format varies per source).
    pub date: String,
    pub sector: String,
    pub description: String,
    /// Upstream identifier, when the source has one. Used for dedupe.
    #[serde(default)]
    pub external_id: Option<String>,
    /// Upstream processing status, when the source reports one.
    #[serde(default)]
    pub status: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub raw_data: serde_json::Value,
}

/// Outcome of persisting one batch of leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub inserted: u64,
    pub updated: u64,
    pub status_changes: u64,
}

impl SaveSummary {
    /// Leads accounted for by this batch (new or refreshed).
    pub fn saved(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: SaveSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.status_changes += other.status_changes;
    }
}

/// Status of a persisted scrape run row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../../frontend/src/types/generated/")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a stored value. Unknown values map to `Error`.
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Error,
        }
    }
}
