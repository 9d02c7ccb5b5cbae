//! Relational state abstractions.
//!
//! Perception pipelines ultimately turn raw sensor data into a set of
//! [`GroundAtom`]s such as `(IsDirectlyAbove A B)`.  This module provides the
//! vocabulary for that: typed [`Object`]s, [`Predicate`]s over object types,
//! and the atoms obtained by grounding a predicate with concrete objects.
//!
//! # Example
//!
//! ```rust
//! use modper_types::relational::{Predicate, Type, object_combinations};
//!
//! let letter = Type::new("Letter");
//! let above = Predicate::new("IsAbove", [letter.clone(), letter.clone()]);
//! let objects = [letter.object("A"), letter.object("B")];
//!
//! let combos = object_combinations(&objects, above.types());
//! assert_eq!(combos.len(), 4);
//!
//! let atom = above.ground(combos[1].clone()).unwrap();
//! assert_eq!(atom.to_string(), "(IsAbove A B)");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PerceptionError, Result};

// ────────────────────────────────────────────────────────────────────────────
// Type
// ────────────────────────────────────────────────────────────────────────────

/// An object type, optionally derived from a parent type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Type {
    name: String,
    parent: Option<Box<Type>>,
}

impl Type {
    /// Create a root type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
        }
    }

    /// Create a type that is a subtype of `parent`.
    pub fn with_parent(name: impl Into<String>, parent: Type) -> Self {
        Self {
            name: name.into(),
            parent: Some(Box::new(parent)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Type> {
        self.parent.as_deref()
    }

    /// `true` when `self` equals `other` or has `other` among its ancestors.
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.parent();
        }
        false
    }

    /// Create an object of this type.
    pub fn object(&self, name: impl Into<String>) -> Object {
        Object::new(name, self.clone())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Object
// ────────────────────────────────────────────────────────────────────────────

/// A named, typed entity in the perceived world.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Object {
    name: String,
    #[serde(rename = "type")]
    ty: Type,
}

impl Object {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// `true` when this object's type is `ty` or one of its subtypes.
    pub fn is_instance(&self, ty: &Type) -> bool {
        self.ty.is_subtype_of(ty)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Predicate / GroundAtom
// ────────────────────────────────────────────────────────────────────────────

/// A named relation over an ordered list of argument types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Predicate {
    name: String,
    types: Vec<Type>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, types: impl IntoIterator<Item = Type>) -> Self {
        Self {
            name: name.into(),
            types: types.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn arity(&self) -> usize {
        self.types.len()
    }

    /// Apply this predicate to concrete objects.
    ///
    /// # Errors
    ///
    /// [`PerceptionError::ArityMismatch`] when the number of objects differs
    /// from [`arity`][Predicate::arity], [`PerceptionError::TypeMismatch`]
    /// when an object is not an instance of the corresponding argument type.
    pub fn ground(&self, objects: impl Into<Vec<Object>>) -> Result<GroundAtom> {
        let objects = objects.into();
        if objects.len() != self.arity() {
            return Err(PerceptionError::ArityMismatch {
                predicate: self.name.clone(),
                expected: self.arity(),
                found: objects.len(),
            });
        }
        for (object, ty) in objects.iter().zip(&self.types) {
            if !object.is_instance(ty) {
                return Err(PerceptionError::TypeMismatch {
                    object: object.name().to_string(),
                    expected: ty.name().to_string(),
                });
            }
        }
        Ok(GroundAtom {
            predicate: self.clone(),
            objects,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A predicate applied to concrete objects, e.g. `(IsDirectlyAbove A B)`.
///
/// Atoms order by predicate first and then by their arguments, so a sorted
/// collection of atoms groups all atoms of one predicate together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroundAtom {
    predicate: Predicate,
    objects: Vec<Object>,
}

impl GroundAtom {
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }
}

impl fmt::Display for GroundAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.predicate.name)?;
        for object in &self.objects {
            write!(f, " {object}")?;
        }
        f.write_str(")")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Grounding helpers
// ────────────────────────────────────────────────────────────────────────────

/// Every ordered choice of objects matching `types` position by position.
///
/// Objects are considered in sorted order and may repeat across positions,
/// so `[A, B]` over `(Letter, Letter)` yields `AA, AB, BA, BB`.  An empty
/// `types` slice yields exactly one empty choice.
pub fn object_combinations<'a>(
    objects: impl IntoIterator<Item = &'a Object>,
    types: &[Type],
) -> Vec<Vec<Object>> {
    let mut sorted: Vec<&Object> = objects.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut combos: Vec<Vec<Object>> = vec![Vec::new()];
    for ty in types {
        let candidates: Vec<&Object> = sorted
            .iter()
            .copied()
            .filter(|o| o.is_instance(ty))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        combos = combos
            .iter()
            .flat_map(|prefix| {
                candidates.iter().map(move |object| {
                    let mut next = prefix.clone();
                    next.push((*object).clone());
                    next
                })
            })
            .collect();
    }
    combos
}
