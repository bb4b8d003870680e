pub mod leads;
pub mod runs;
pub mod status_changes;

use chrono::{DateTime, Utc};

/// Stored unix seconds to a UTC timestamp. Out-of-range values map to the
/// epoch.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
