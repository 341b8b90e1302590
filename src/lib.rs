pub mod batch;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod migrate;
pub mod progress;
pub mod sanitize;
pub mod types;

// re-exports for convenience
pub use batch::{exit_code, BatchDriver, BatchDriverOptions, BatchOutcomeKind, BatchSummary, OnError};
pub use client::ApiClient;
pub use config::Config;
pub use error::MigrateError as Error;
pub use migrate::{Migrator, MigratorOptions};
pub use types::{Change, ConnectionDescriptor, RetryPolicy, Zone, ZoneName};
