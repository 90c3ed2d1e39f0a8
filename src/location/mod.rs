//! Location resolution subsystem.
//!
//! Country → Province → City drill-down backed by a remote geography API,
//! with an in-memory result cache, per-key fetch de-duplication and a
//! built-in province table for degraded mode.

pub mod cache;
pub mod coordinator;
pub mod providers;
pub mod resolver;
pub mod search;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ResultCache;
pub use coordinator::FetchCoordinator;
pub use providers::{fallback_provinces, fallback_records, FallbackInfo, GeographySource, HttpGeographyClient};
pub use resolver::{ResolverSession, SessionView};
pub use search::{filter_candidates, normalize};
pub use state::{Choice, SelectionState};
pub use types::{CacheKey, CachedList, Country, LocationError, Selection, SessionOptions, Step};
