//! rollgrid-core: shared building blocks for the rollgrid crates.
//!
//! - **`config`**: `rollgrid.toml` parsing and typed settings
//! - **`clock`**: injectable time source
//! - **`cache`**: TTL + LRU cache for poller snapshots
//! - **`error`**: error categories used to pick caller-facing responses
//! - **`tags`**: the `Tagged` capability trait

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tags;

pub use cache::{CacheStats, TtlCache, TtlCacheConfig};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AssemblerSettings, LoggingConfig, MappingSettings, ParamsConfig, RollgridConfig,
    RolloutConfig, StoreConfig,
};
pub use error::ErrorCategory;
pub use tags::Tagged;
