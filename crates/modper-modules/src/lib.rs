//! `modper-modules` – ready-made perception modules.
//!
//! Together they form a relational-abstraction pipeline: raw sensor
//! readings become objects, objects get features, and features (plus the
//! whole image where needed) become ground atoms.
//!
//! # Modules
//!
//! - [`sensor`] – [`SensorModule`]: named sensors, read lazily.
//! - [`object_detection`] – [`ObjectDetectionModule`]: objects of the
//!   requested types.
//! - [`object_feature`] – [`ObjectFeatureModule`]: scalar features of single
//!   objects.
//! - [`predicates`] – local, image, dispatching and all-ground-atoms
//!   predicate modules.
//! - [`environment`] – [`capture_observations`]: feeds an [`Environment`]'s
//!   observations into a [`SensorModule`].

pub mod environment;
pub mod object_detection;
pub mod object_feature;
pub mod predicates;
pub mod sensor;

pub use environment::{Environment, ObservationCapture, Step, capture_observations};
pub use object_detection::ObjectDetectionModule;
pub use object_feature::ObjectFeatureModule;
pub use predicates::{
    AllGroundAtomsModule, ImagePredicateDetector, ImagePredicateModule, LocalPredicateModule,
    PredicateContext, PredicateDispatchModule,
};
pub use sensor::{Sensor, SensorModule};
