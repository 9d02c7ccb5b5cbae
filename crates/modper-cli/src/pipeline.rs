//! Grid-world perception pipeline.
//!
//! The "image" is a grid of labels where `X` marks empty space and every
//! other label is a letter object.  The pipeline detects the letters,
//! locates them (`r`/`c` features) and classifies four predicates:
//!
//! - `IsDirectlyAbove(a, b)` – `a` is in the cell right above `b`.
//! - `IsAnywhereAbove(a, b)` – `a` is somewhere above `b` in the same column.
//! - `InOneThickEmptySpace(a)` – the 3x3 neighbourhood of `a` is empty.
//! - `InTwoThickEmptySpace(a)` – the 5x5 neighbourhood of `a` is empty.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use modper_core::{ModularPerceiver, PerceiverConfig};
use modper_modules::{
    ImagePredicateDetector, ImagePredicateModule, LocalPredicateModule, ObjectDetectionModule,
    ObjectFeatureModule, PredicateContext, PredicateDispatchModule, SensorModule,
};
use modper_types::{
    GroundAtom, LabelGrid, Object, Observation, PerceptionError, Predicate, Query, Result, Type,
};
use tracing::info;

pub const CAMERA: &str = "camera";
const EMPTY: &str = "X";

/// The object type and predicates of the grid world.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub letter: Type,
    pub is_directly_above: Predicate,
    pub is_anywhere_above: Predicate,
    pub in_one_thick_empty_space: Predicate,
    pub in_two_thick_empty_space: Predicate,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let letter = Type::new("Letter");
        let pair = [letter.clone(), letter.clone()];
        Self {
            is_directly_above: Predicate::new("IsDirectlyAbove", pair.clone()),
            is_anywhere_above: Predicate::new("IsAnywhereAbove", pair),
            in_one_thick_empty_space: Predicate::new("InOneThickEmptySpace", [letter.clone()]),
            in_two_thick_empty_space: Predicate::new("InTwoThickEmptySpace", [letter.clone()]),
            letter,
        }
    }
}

impl Vocabulary {
    pub fn local_predicates(&self) -> [Predicate; 2] {
        [
            self.is_directly_above.clone(),
            self.is_anywhere_above.clone(),
        ]
    }

    pub fn image_predicates(&self) -> [Predicate; 2] {
        [
            self.in_one_thick_empty_space.clone(),
            self.in_two_thick_empty_space.clone(),
        ]
    }

    pub fn predicates(&self) -> BTreeSet<Predicate> {
        self.local_predicates()
            .into_iter()
            .chain(self.image_predicates())
            .collect()
    }

    /// Padding of an empty-space predicate.
    fn padding(&self, predicate: &Predicate) -> Option<usize> {
        if *predicate == self.in_one_thick_empty_space {
            Some(1)
        } else if *predicate == self.in_two_thick_empty_space {
            Some(2)
        } else {
            None
        }
    }
}

/// Read a whitespace separated label grid from `path`.
pub fn load_grid(path: &Path) -> anyhow::Result<LabelGrid> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read grid file {}", path.display()))?;
    let grid = LabelGrid::parse(&raw)
        .with_context(|| format!("invalid grid in {}", path.display()))?;
    Ok(grid)
}

// ────────────────────────────────────────────────────────────────────────────
// Detectors
// ────────────────────────────────────────────────────────────────────────────

fn detect_letters(letter: &Type, observation: &Observation) -> Result<BTreeSet<Object>> {
    let grid = observation.as_labels()?;
    let (rows, cols) = grid.shape();
    let objects = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter_map(|(r, c)| grid.get(r, c))
        .filter(|label| *label != EMPTY)
        .map(|label| letter.object(label))
        .collect();
    Ok(objects)
}

fn locate(observation: &Observation, object: &Object, feature: &str) -> Result<f64> {
    let positions = observation.as_labels()?.positions_of(object.name());
    let [(r, c)] = positions.as_slice() else {
        return Err(PerceptionError::Detector(format!(
            "{object} occurs {} times in the grid",
            positions.len()
        )));
    };
    match feature {
        "r" => Ok(*r as f64),
        "c" => Ok(*c as f64),
        other => Err(PerceptionError::Detector(format!("unknown feature {other:?}"))),
    }
}

fn position(ctx: &mut PredicateContext<'_, '_>, object: &Object) -> Result<(f64, f64)> {
    Ok((ctx.feature(object, "r")?, ctx.feature(object, "c")?))
}

fn surrounded_by_empty_space(grid: &LabelGrid, row: usize, col: usize, padding: usize) -> bool {
    let (rows, cols) = grid.shape();
    let rows_around = row.saturating_sub(padding)..=(row + padding).min(rows.saturating_sub(1));
    let cols_around = col.saturating_sub(padding)..=(col + padding).min(cols.saturating_sub(1));
    rows_around
        .flat_map(|r| cols_around.clone().map(move |c| (r, c)))
        .filter(|&cell| cell != (row, col))
        .all(|(r, c)| grid.get(r, c) == Some(EMPTY))
}

/// Classifies the empty-space predicates of a [`Vocabulary`].
struct EmptySpaceDetector {
    vocabulary: Vocabulary,
}

impl ImagePredicateDetector for EmptySpaceDetector {
    fn detect(
        &self,
        predicates: &BTreeSet<Predicate>,
        objects: &BTreeSet<Object>,
        ctx: &mut PredicateContext<'_, '_>,
    ) -> Result<BTreeSet<GroundAtom>> {
        let image = ctx.image()?;
        let grid = image.as_labels()?;
        let mut atoms = BTreeSet::new();
        for predicate in predicates {
            let Some(padding) = self.vocabulary.padding(predicate) else {
                return Err(PerceptionError::Detector(format!(
                    "{predicate} is not an empty-space predicate"
                )));
            };
            for object in objects {
                let (r, c) = position(ctx, object)?;
                if surrounded_by_empty_space(grid, r as usize, c as usize, padding) {
                    atoms.insert(predicate.ground(vec![object.clone()])?);
                }
            }
        }
        Ok(atoms)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Build the grid-world perceiver observing `grid`.
pub fn build_perceiver(
    grid: LabelGrid,
    vocabulary: &Vocabulary,
    config: PerceiverConfig,
) -> Result<ModularPerceiver> {
    let camera = move || Observation::Labels(grid.clone());
    let sensors = SensorModule::new().with_sensor(CAMERA, camera);

    let letter = vocabulary.letter.clone();
    let detector = move |obs: &Observation| detect_letters(&letter, obs);
    let detection = ObjectDetectionModule::new(detector, Query::sensor(CAMERA));
    let features = ObjectFeatureModule::new(locate, Query::sensor(CAMERA));

    let local = LocalPredicateModule::new()
        .with_interpretation(vocabulary.is_directly_above.clone(), |ctx, args| {
            let ((r1, c1), (r2, c2)) = (position(ctx, &args[0])?, position(ctx, &args[1])?);
            Ok(r1 == r2 - 1.0 && c1 == c2)
        })
        .with_interpretation(vocabulary.is_anywhere_above.clone(), |ctx, args| {
            let ((r1, c1), (r2, c2)) = (position(ctx, &args[0])?, position(ctx, &args[1])?);
            Ok(r1 < r2 && c1 == c2)
        });

    let detector = EmptySpaceDetector {
        vocabulary: vocabulary.clone(),
    };
    let image = ImagePredicateModule::new(detector, Query::sensor(CAMERA))
        .with_predicates(vocabulary.image_predicates());

    let image_predicates = vocabulary.image_predicates();
    let dispatch = PredicateDispatchModule::new(vocabulary.local_predicates(), image_predicates)?;

    Ok(ModularPerceiver::with_config(
        vec![
            Box::new(sensors),
            Box::new(detection),
            Box::new(features),
            Box::new(local),
            Box::new(image),
            Box::new(dispatch),
        ],
        config,
    ))
}

/// Every true ground atom over `objects`, or over all detected letters when
/// `objects` is `None`.
pub fn ground_atoms(
    perceiver: &mut ModularPerceiver,
    vocabulary: &Vocabulary,
    objects: Option<&[String]>,
) -> Result<BTreeSet<GroundAtom>> {
    let letter = &vocabulary.letter;
    let objects: BTreeSet<Object> = match objects {
        Some(names) => names.iter().map(|n| letter.object(n.as_str())).collect(),
        None => perceiver
            .get_response(&Query::all_objects([vocabulary.letter.clone()]))?
            .into_objects()?,
    };
    info!(objects = objects.len(), "classifying ground atoms");
    perceiver
        .get_response(&Query::predicates(vocabulary.predicates(), objects))?
        .into_atoms()
}
