//! Queries exchanged between perception modules, and their responses.
//!
//! A [`Query`] is a hashable value so that every module can cache the
//! [`Response`] it computed for it during the current timestep.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PerceptionError, Result};
use crate::observation::Observation;
use crate::relational::{GroundAtom, Object, Predicate, Type};

/// A request for information that exactly one perception module answers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Query {
    /// The current reading of the named sensor.
    Sensor(String),
    /// Every currently visible object of the given types (all types when
    /// empty).
    AllObjects { types: BTreeSet<Type> },
    /// A single scalar feature of a single object, e.g. its row.
    ObjectFeature { object: Object, feature: String },
    /// All true ground atoms of `predicates` over `objects`.
    Predicates {
        predicates: BTreeSet<Predicate>,
        objects: BTreeSet<Object>,
    },
    /// Like [`Query::Predicates`], restricted to predicates computed from
    /// object-centric features alone.
    LocalPredicates {
        predicates: BTreeSet<Predicate>,
        objects: BTreeSet<Object>,
    },
    /// Like [`Query::Predicates`], restricted to predicates that need the
    /// whole image.
    ImagePredicates {
        predicates: BTreeSet<Predicate>,
        objects: BTreeSet<Object>,
    },
    /// All true ground atoms for every known predicate and object.
    AllGroundAtoms,
    /// Application-defined query identified by name.
    Custom(String),
}

impl Query {
    pub fn sensor(name: impl Into<String>) -> Self {
        Query::Sensor(name.into())
    }

    pub fn feature(object: Object, feature: impl Into<String>) -> Self {
        Query::ObjectFeature {
            object,
            feature: feature.into(),
        }
    }

    pub fn all_objects(types: impl IntoIterator<Item = Type>) -> Self {
        Query::AllObjects {
            types: types.into_iter().collect(),
        }
    }

    pub fn predicates(
        predicates: impl IntoIterator<Item = Predicate>,
        objects: impl IntoIterator<Item = Object>,
    ) -> Self {
        Query::Predicates {
            predicates: predicates.into_iter().collect(),
            objects: objects.into_iter().collect(),
        }
    }

    pub fn local_predicates(
        predicates: impl IntoIterator<Item = Predicate>,
        objects: impl IntoIterator<Item = Object>,
    ) -> Self {
        Query::LocalPredicates {
            predicates: predicates.into_iter().collect(),
            objects: objects.into_iter().collect(),
        }
    }

    pub fn image_predicates(
        predicates: impl IntoIterator<Item = Predicate>,
        objects: impl IntoIterator<Item = Object>,
    ) -> Self {
        Query::ImagePredicates {
            predicates: predicates.into_iter().collect(),
            objects: objects.into_iter().collect(),
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Query::Custom(name.into())
    }

    /// Short, stable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Query::Sensor(_) => "sensor",
            Query::AllObjects { .. } => "all_objects",
            Query::ObjectFeature { .. } => "object_feature",
            Query::Predicates { .. } => "predicates",
            Query::LocalPredicates { .. } => "local_predicates",
            Query::ImagePredicates { .. } => "image_predicates",
            Query::AllGroundAtoms => "all_ground_atoms",
            Query::Custom(_) => "custom",
        }
    }
}

fn join<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_atoms_query(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    predicates: &BTreeSet<Predicate>,
    objects: &BTreeSet<Object>,
) -> fmt::Result {
    write!(f, "{kind}[{}]{{{}}}", join(predicates), join(objects))
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Sensor(name) => write!(f, "Sensor({name})"),
            Query::AllObjects { types } => write!(f, "AllObjects[{}]", join(types)),
            Query::ObjectFeature { object, feature } => {
                write!(f, "ObjectFeature({object}.{feature})")
            }
            Query::Predicates {
                predicates,
                objects,
            } => write_atoms_query(f, "Predicates", predicates, objects),
            Query::LocalPredicates {
                predicates,
                objects,
            } => write_atoms_query(f, "LocalPredicates", predicates, objects),
            Query::ImagePredicates {
                predicates,
                objects,
            } => write_atoms_query(f, "ImagePredicates", predicates, objects),
            Query::AllGroundAtoms => f.write_str("AllGroundAtoms"),
            Query::Custom(name) => write!(f, "Custom({name})"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response
// ────────────────────────────────────────────────────────────────────────────

/// The answer a module gives to a [`Query`].
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The query was handled but carries no data.
    Unit,
    Observation(Observation),
    Objects(BTreeSet<Object>),
    Feature(f64),
    Atoms(BTreeSet<GroundAtom>),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Unit => "unit",
            Response::Observation(_) => "observation",
            Response::Objects(_) => "objects",
            Response::Feature(_) => "feature",
            Response::Atoms(_) => "atoms",
        }
    }

    fn unexpected(&self, expected: &'static str) -> PerceptionError {
        PerceptionError::UnexpectedResponse {
            expected,
            found: self.kind(),
        }
    }

    pub fn into_observation(self) -> Result<Observation> {
        match self {
            Response::Observation(obs) => Ok(obs),
            other => Err(other.unexpected("observation")),
        }
    }

    pub fn into_objects(self) -> Result<BTreeSet<Object>> {
        match self {
            Response::Objects(objects) => Ok(objects),
            other => Err(other.unexpected("objects")),
        }
    }

    pub fn as_feature(&self) -> Result<f64> {
        match self {
            Response::Feature(value) => Ok(*value),
            other => Err(other.unexpected("feature")),
        }
    }

    pub fn into_atoms(self) -> Result<BTreeSet<GroundAtom>> {
        match self {
            Response::Atoms(atoms) => Ok(atoms),
            other => Err(other.unexpected("atoms")),
        }
    }
}

impl From<Observation> for Response {
    fn from(obs: Observation) -> Self {
        Response::Observation(obs)
    }
}

impl From<BTreeSet<GroundAtom>> for Response {
    fn from(atoms: BTreeSet<GroundAtom>) -> Self {
        Response::Atoms(atoms)
    }
}

impl From<BTreeSet<Object>> for Response {
    fn from(objects: BTreeSet<Object>) -> Self {
        Response::Objects(objects)
    }
}

impl From<f64> for Response {
    fn from(value: f64) -> Self {
        Response::Feature(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn equal_queries_hash_equal() {
        let letter = Type::new("Letter");
        let a = Query::feature(letter.object("A"), "r");
        let b = Query::feature(letter.object("A"), "r");
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn predicate_query_ignores_insertion_order() {
        let letter = Type::new("Letter");
        let p = Predicate::new("P", [letter.clone()]);
        let q = Predicate::new("Q", [letter.clone()]);
        let first = Query::predicates([p.clone(), q.clone()], [letter.object("A")]);
        let second = Query::predicates([q, p], [letter.object("A")]);
        assert_eq!(first, second);
    }

    #[test]
    fn query_display_is_readable() {
        let letter = Type::new("Letter");
        assert_eq!(Query::sensor("camera").to_string(), "Sensor(camera)");
        assert_eq!(
            Query::feature(letter.object("A"), "r").to_string(),
            "ObjectFeature(A.r)"
        );
        let p = Predicate::new("Isolated", [letter.clone()]);
        assert_eq!(
            Query::local_predicates([p], [letter.object("A"), letter.object("B")]).to_string(),
            "LocalPredicates[Isolated]{A, B}"
        );
    }

    #[test]
    fn response_accessors_check_variant() {
        assert_eq!(Response::Feature(2.0).as_feature().unwrap(), 2.0);
        let err = Response::Unit.into_atoms().unwrap_err();
        let expected = PerceptionError::UnexpectedResponse {
            expected: "atoms",
            found: "unit",
        };
        assert_eq!(err, expected);
    }
}
