//! `modper-core` – the modular perceiver.
//!
//! A perceiver is a set of small, independent perception modules that answer
//! each other's queries.  No module talks to another directly: every query
//! goes through the perceiver, which picks the single module able to answer
//! it, caches the response until the next tick, and remembers who asked whom.
//! Because modules only compute what they are asked for, sensors are read
//! lazily and each one at most once per timestep.
//!
//! # Modules
//!
//! - [`module`] – [`PerceptionModule`]: the trait every module implements.
//! - [`perceiver`] – [`ModularPerceiver`] and [`QueryContext`]: routing,
//!   per-timestep caching, cycle detection, timestep and seed management.
//! - [`graph`] – Graphviz rendering of the observed module connections.
//! - [`config`] – [`PerceiverConfig`]: TOML file plus `MODPER_*` overrides.

pub mod config;
pub mod graph;
pub mod module;
pub mod perceiver;

pub use config::{ConfigError, PerceiverConfig};
pub use module::{ModuleId, PerceptionModule};
pub use perceiver::{ModularPerceiver, PerceiverStats, QueryContext};
