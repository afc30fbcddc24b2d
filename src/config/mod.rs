//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → consumed by ClientBuilder
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the built client snapshots it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ClientConfig, ConcurrencyConfig, DiskCacheConfig, MemoryCacheConfig, ObservabilityConfig,
    PoolConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
