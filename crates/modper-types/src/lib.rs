//! `modper-types` – shared vocabulary of the modular perceiver.
//!
//! # Modules
//!
//! - [`relational`] – [`Type`], [`Object`], [`Predicate`] and [`GroundAtom`]:
//!   the relational state abstraction that perception modules produce, plus
//!   [`object_combinations`] for grounding predicates over known objects.
//! - [`observation`] – [`Observation`]: raw sensor output (label grids,
//!   images, vectors, JSON).
//! - [`query`] – [`Query`] and [`Response`]: the messages exchanged between
//!   perception modules through the perceiver.
//! - [`error`] – [`PerceptionError`], the single error type used across the
//!   workspace.

pub mod error;
pub mod observation;
pub mod query;
pub mod relational;

pub use error::{PerceptionError, Result};
pub use observation::{ImageFrame, LabelGrid, Observation};
pub use query::{Query, Response};
pub use relational::{GroundAtom, Object, Predicate, Type, object_combinations};
