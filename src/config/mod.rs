//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! preset name or config file (TOML)
//!     → presets.rs (data-only starting points)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → compiled into a GatePolicy shared via ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the compiled policy
//! ```

pub mod loader;
pub mod presets;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    AdminConfig, AuditConfig, Environment, GateConfig, KeyGenerator, ListenerConfig,
    MaintenanceConfig, ObservabilityConfig, PathProtectionConfig, PerformanceConfig,
    RateLimitConfig, SecurityConfig, SecurityHeadersConfig, Thresholds,
};
