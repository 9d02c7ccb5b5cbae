//! Predicate modules – turn object features and images into ground atoms.
//!
//! | Module | Answers | Uses |
//! |---|---|---|
//! | [`LocalPredicateModule`] | [`Query::LocalPredicates`] | object features only |
//! | [`ImagePredicateModule`] | [`Query::ImagePredicates`] | object features and the whole image |
//! | [`PredicateDispatchModule`] | [`Query::Predicates`] | splits into the two above |
//! | [`AllGroundAtomsModule`] | [`Query::AllGroundAtoms`] | one [`Query::Predicates`] over everything known |
//!
//! Interpretations and detectors receive a [`PredicateContext`] through
//! which they fetch features (and the image) lazily: a feature that no
//! predicate looks at is never computed.

use std::collections::{BTreeMap, BTreeSet};

use modper_core::{PerceptionModule, QueryContext};
use modper_types::{
    GroundAtom, Object, Observation, PerceptionError, Predicate, Query, Response, Result,
    object_combinations,
};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// PredicateContext
// ────────────────────────────────────────────────────────────────────────────

/// Lazy access to the inputs of a predicate classifier.
pub struct PredicateContext<'c, 'a> {
    ctx: &'c mut QueryContext<'a>,
    image_query: Option<&'c Query>,
}

impl PredicateContext<'_, '_> {
    /// The value of `feature` for `object`, via [`Query::ObjectFeature`].
    pub fn feature(&mut self, object: &Object, feature: &str) -> Result<f64> {
        self.ctx
            .send(&Query::feature(object.clone(), feature))?
            .as_feature()
    }

    /// The whole image, via the module's configured image query.
    ///
    /// # Errors
    ///
    /// [`PerceptionError::InvalidConfiguration`] when called from a module
    /// that has no image query.
    pub fn image(&mut self) -> Result<Observation> {
        let Some(query) = self.image_query else {
            return Err(PerceptionError::InvalidConfiguration("no image query".to_string()));
        };
        self.ctx.send(query)?.into_observation()
    }

    /// Timestep of the perceiver answering the query.
    pub fn time(&self) -> u64 {
        self.ctx.time()
    }
}

fn cannot_answer(module: &dyn PerceptionModule, query: &Query) -> PerceptionError {
    PerceptionError::CannotAnswer {
        module: module.name().to_string(),
        query: query.clone(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LocalPredicateModule
// ────────────────────────────────────────────────────────────────────────────

type Interpretation =
    Box<dyn Fn(&mut PredicateContext<'_, '_>, &[Object]) -> Result<bool> + Send + Sync>;

/// Classifies predicates from object-centric features alone.
///
/// Each predicate has an interpretation that decides, for one choice of
/// arguments, whether the atom holds.  The module evaluates it for every
/// type-compatible choice of the queried objects.
#[derive(Default)]
pub struct LocalPredicateModule {
    interpretations: BTreeMap<Predicate, Interpretation>,
}

impl LocalPredicateModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the interpretation of `predicate`.
    pub fn with_interpretation<F>(mut self, predicate: Predicate, interpretation: F) -> Self
    where
        F: Fn(&mut PredicateContext<'_, '_>, &[Object]) -> Result<bool> + Send + Sync + 'static,
    {
        self.interpretations.insert(predicate, Box::new(interpretation));
        self
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.interpretations.keys()
    }
}

impl PerceptionModule for LocalPredicateModule {
    fn name(&self) -> &str {
        "LocalPredicateModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        match query {
            Query::LocalPredicates { predicates, .. } => predicates
                .iter()
                .all(|p| self.interpretations.contains_key(p)),
            _ => false,
        }
    }

    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let (predicates, objects) = match query {
            Query::LocalPredicates {
                predicates,
                objects,
            } => (predicates, objects),
            _ => return Err(cannot_answer(self, query)),
        };
        let mut pctx = PredicateContext {
            ctx,
            image_query: None,
        };
        let mut atoms = BTreeSet::new();
        for predicate in predicates {
            let interpretation = self
                .interpretations
                .get(predicate)
                .ok_or_else(|| cannot_answer(self, query))?;
            for choice in object_combinations(objects, predicate.types()) {
                if interpretation(&mut pctx, &choice)? {
                    atoms.insert(predicate.ground(choice)?);
                }
            }
        }
        debug!(count = atoms.len(), "local atoms classified");
        Ok(Response::Atoms(atoms))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ImagePredicateModule
// ────────────────────────────────────────────────────────────────────────────

/// Classifier behind an [`ImagePredicateModule`].
///
/// One call handles every requested predicate, so a batched model (such as
/// a VLM) can answer them together.
pub trait ImagePredicateDetector: Send + Sync {
    /// The atoms over `predicates` and `objects` that hold in the image.
    ///
    /// The image itself is available through [`PredicateContext::image`].
    fn detect(
        &self,
        predicates: &BTreeSet<Predicate>,
        objects: &BTreeSet<Object>,
        ctx: &mut PredicateContext<'_, '_>,
    ) -> Result<BTreeSet<GroundAtom>>;
}

/// Classifies predicates that need the whole image, e.g. free space around
/// an object.
pub struct ImagePredicateModule {
    detector: Box<dyn ImagePredicateDetector>,
    image_query: Query,
    supported: Option<BTreeSet<Predicate>>,
}

impl ImagePredicateModule {
    pub fn new(detector: impl ImagePredicateDetector + 'static, image_query: Query) -> Self {
        Self {
            detector: Box::new(detector),
            image_query,
            supported: None,
        }
    }

    /// Only accept queries whose predicates are all in `predicates`.
    pub fn with_predicates(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.supported = Some(predicates.into_iter().collect());
        self
    }
}

impl PerceptionModule for ImagePredicateModule {
    fn name(&self) -> &str {
        "ImagePredicateModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        match query {
            Query::ImagePredicates { predicates, .. } => self
                .supported
                .as_ref()
                .is_none_or(|supported| predicates.is_subset(supported)),
            _ => false,
        }
    }

    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let (predicates, objects) = match query {
            Query::ImagePredicates {
                predicates,
                objects,
            } => (predicates, objects),
            _ => return Err(cannot_answer(self, query)),
        };
        let mut pctx = PredicateContext {
            ctx,
            image_query: Some(&self.image_query),
        };
        let atoms = self.detector.detect(predicates, objects, &mut pctx)?;
        debug!(count = atoms.len(), "image atoms classified");
        Ok(Response::Atoms(atoms))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PredicateDispatchModule
// ────────────────────────────────────────────────────────────────────────────

/// Splits a [`Query::Predicates`] into its local and image halves and merges
/// the two answers.
pub struct PredicateDispatchModule {
    local: BTreeSet<Predicate>,
    image: BTreeSet<Predicate>,
}

impl PredicateDispatchModule {
    /// # Errors
    ///
    /// [`PerceptionError::InvalidConfiguration`] when a predicate is declared
    /// both local and image-based.
    pub fn new(
        local: impl IntoIterator<Item = Predicate>,
        image: impl IntoIterator<Item = Predicate>,
    ) -> Result<Self> {
        let local: BTreeSet<Predicate> = local.into_iter().collect();
        let image: BTreeSet<Predicate> = image.into_iter().collect();
        if let Some(shared) = local.intersection(&image).next() {
            return Err(PerceptionError::InvalidConfiguration(format!(
                "predicate {shared} is declared both local and image-based"
            )));
        }
        Ok(Self { local, image })
    }
}

impl PerceptionModule for PredicateDispatchModule {
    fn name(&self) -> &str {
        "PredicateDispatchModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        match query {
            Query::Predicates { predicates, .. } => predicates
                .iter()
                .all(|p| self.local.contains(p) || self.image.contains(p)),
            _ => false,
        }
    }

    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let (predicates, objects) = match query {
            Query::Predicates {
                predicates,
                objects,
            } => (predicates, objects),
            _ => return Err(cannot_answer(self, query)),
        };
        let (local, image): (BTreeSet<Predicate>, BTreeSet<Predicate>) = predicates
            .iter()
            .cloned()
            .partition(|p| self.local.contains(p));

        let mut atoms = BTreeSet::new();
        if !local.is_empty() {
            let sub = Query::LocalPredicates {
                predicates: local,
                objects: objects.clone(),
            };
            atoms.extend(ctx.send(&sub)?.into_atoms()?);
        }
        if !image.is_empty() {
            let sub = Query::ImagePredicates {
                predicates: image,
                objects: objects.clone(),
            };
            atoms.extend(ctx.send(&sub)?.into_atoms()?);
        }
        Ok(Response::Atoms(atoms))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AllGroundAtomsModule
// ────────────────────────────────────────────────────────────────────────────

/// Answers [`Query::AllGroundAtoms`] for a fixed vocabulary of objects and
/// predicates.
pub struct AllGroundAtomsModule {
    objects: BTreeSet<Object>,
    predicates: BTreeSet<Predicate>,
}

impl AllGroundAtomsModule {
    pub fn new(
        objects: impl IntoIterator<Item = Object>,
        predicates: impl IntoIterator<Item = Predicate>,
    ) -> Self {
        Self {
            objects: objects.into_iter().collect(),
            predicates: predicates.into_iter().collect(),
        }
    }
}

impl PerceptionModule for AllGroundAtomsModule {
    fn name(&self) -> &str {
        "AllGroundAtomsModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        matches!(query, Query::AllGroundAtoms)
    }

    fn respond(&self, _query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let query = Query::Predicates {
            predicates: self.predicates.clone(),
            objects: self.objects.clone(),
        };
        Ok(Response::Atoms(ctx.send(&query)?.into_atoms()?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use modper_core::ModularPerceiver;
    use modper_types::{LabelGrid, Type};

    use super::*;
    use crate::object_feature::ObjectFeatureModule;
    use crate::sensor::SensorModule;

    const GRID: &str = "
        X X X X X X X X G
        X A X X X X X X X
        X B X X C X X X X
        X X X X D X X X X
        X F X X X X X X X
        X X X X X X X X X
        X X X X X X E X X
        X X X X X X X X X
        X X X X X X X X X
    ";

    const EXPECTED: &str = "(InOneThickEmptySpace E), (InOneThickEmptySpace F), \
        (InTwoThickEmptySpace E), (IsAnywhereAbove A B), (IsAnywhereAbove A F), \
        (IsAnywhereAbove B F), (IsAnywhereAbove C D), (IsDirectlyAbove A B), \
        (IsDirectlyAbove C D)";

    struct Vocabulary {
        letter: Type,
        directly_above: Predicate,
        anywhere_above: Predicate,
        one_thick: Predicate,
        two_thick: Predicate,
    }

    fn vocabulary() -> Vocabulary {
        let letter = Type::new("Letter");
        let pair = [letter.clone(), letter.clone()];
        Vocabulary {
            directly_above: Predicate::new("IsDirectlyAbove", pair.clone()),
            anywhere_above: Predicate::new("IsAnywhereAbove", pair),
            one_thick: Predicate::new("InOneThickEmptySpace", [letter.clone()]),
            two_thick: Predicate::new("InTwoThickEmptySpace", [letter.clone()]),
            letter,
        }
    }

    fn locate(obs: &Observation, object: &Object, feature: &str) -> Result<f64> {
        let positions = obs.as_labels()?.positions_of(object.name());
        let [(r, c)] = positions.as_slice() else {
            return Err(PerceptionError::Detector(format!("{object} is not unique")));
        };
        match feature {
            "r" => Ok(*r as f64),
            "c" => Ok(*c as f64),
            other => Err(PerceptionError::Detector(format!("unknown feature {other}"))),
        }
    }

    fn position(ctx: &mut PredicateContext<'_, '_>, object: &Object) -> Result<(f64, f64)> {
        Ok((ctx.feature(object, "r")?, ctx.feature(object, "c")?))
    }

    fn local_module(v: &Vocabulary) -> LocalPredicateModule {
        LocalPredicateModule::new()
            .with_interpretation(v.directly_above.clone(), |ctx, args| {
                let ((r1, c1), (r2, c2)) = (position(ctx, &args[0])?, position(ctx, &args[1])?);
                Ok(r1 == r2 - 1.0 && c1 == c2)
            })
            .with_interpretation(v.anywhere_above.clone(), |ctx, args| {
                let ((r1, c1), (r2, c2)) = (position(ctx, &args[0])?, position(ctx, &args[1])?);
                Ok(r1 < r2 && c1 == c2)
            })
    }

    fn has_empty_space(grid: &LabelGrid, row: usize, col: usize, padding: usize) -> bool {
        let (rows, cols) = grid.shape();
        let rows_around = row.saturating_sub(padding)..=(row + padding).min(rows - 1);
        let cols_around = col.saturating_sub(padding)..=(col + padding).min(cols - 1);
        rows_around
            .flat_map(|r| cols_around.clone().map(move |c| (r, c)))
            .filter(|&cell| cell != (row, col))
            .all(|(r, c)| grid.get(r, c) == Some("X"))
    }

    /// Empty space of a given padding around an object.
    struct EmptySpace {
        padding: BTreeMap<Predicate, usize>,
    }

    impl ImagePredicateDetector for EmptySpace {
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
                let pad = self.padding[predicate];
                for object in objects {
                    let (r, c) = position(ctx, object)?;
                    if has_empty_space(grid, r as usize, c as usize, pad) {
                        atoms.insert(predicate.ground(vec![object.clone()])?);
                    }
                }
            }
            Ok(atoms)
        }
    }

    fn image_module(v: &Vocabulary) -> ImagePredicateModule {
        let mut padding = BTreeMap::new();
        padding.insert(v.one_thick.clone(), 1);
        padding.insert(v.two_thick.clone(), 2);
        let module = ImagePredicateModule::new(EmptySpace { padding }, Query::sensor("camera"));
        module.with_predicates([v.one_thick.clone(), v.two_thick.clone()])
    }

    fn sensor_module(reads: Arc<AtomicUsize>) -> SensorModule {
        let grid = LabelGrid::parse(GRID).unwrap();
        SensorModule::new().with_sensor("camera", move || {
            reads.fetch_add(1, Ordering::SeqCst);
            Observation::Labels(grid.clone())
        })
    }

    fn feature_module() -> ObjectFeatureModule {
        ObjectFeatureModule::new(locate, Query::sensor("camera"))
    }

    /// Answers `Custom("all_atoms")` by asking the local and image modules
    /// directly.
    struct AllAtoms {
        objects: BTreeSet<Object>,
        local: BTreeSet<Predicate>,
        image: BTreeSet<Predicate>,
    }

    impl PerceptionModule for AllAtoms {
        fn name(&self) -> &str {
            "AllAtoms"
        }

        fn can_answer(&self, query: &Query) -> bool {
            *query == Query::custom("all_atoms")
        }

        fn respond(&self, _query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
            let local = Query::local_predicates(self.local.clone(), self.objects.clone());
            let image = Query::image_predicates(self.image.clone(), self.objects.clone());
            let mut atoms = ctx.send(&local)?.into_atoms()?;
            atoms.extend(ctx.send(&image)?.into_atoms()?);
            Ok(Response::Atoms(atoms))
        }
    }

    fn known_objects(v: &Vocabulary) -> BTreeSet<Object> {
        // G is deliberately left out.
        ["A", "B", "C", "D", "E", "F"]
            .into_iter()
            .map(|name| v.letter.object(name))
            .collect()
    }

    fn render(atoms: &BTreeSet<GroundAtom>) -> String {
        let parts: Vec<String> = atoms.iter().map(ToString::to_string).collect();
        parts.join(", ")
    }

    fn atoms_for(perceiver: &mut ModularPerceiver, query: &Query) -> BTreeSet<GroundAtom> {
        let response = perceiver.get_response(query).unwrap();
        response.into_atoms().unwrap()
    }

    #[test]
    fn relational_state_abstractions() {
        let v = vocabulary();
        let reads = Arc::new(AtomicUsize::new(0));
        let output = AllAtoms {
            objects: known_objects(&v),
            local: [v.directly_above.clone(), v.anywhere_above.clone()].into(),
            image: [v.one_thick.clone(), v.two_thick.clone()].into(),
        };
        let mut perceiver = ModularPerceiver::new(vec![
            Box::new(sensor_module(reads.clone())),
            Box::new(feature_module()),
            Box::new(local_module(&v)),
            Box::new(image_module(&v)),
            Box::new(output),
        ]);
        perceiver.reset(Some(0));

        let atoms = atoms_for(&mut perceiver, &Query::custom("all_atoms"));
        assert_eq!(render(&atoms), EXPECTED);
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        let edges = perceiver.connections();
        for (responder, sender) in [
            ("SensorModule", "ObjectFeatureModule"),
            ("SensorModule", "ImagePredicateModule"),
            ("ObjectFeatureModule", "LocalPredicateModule"),
            ("ObjectFeatureModule", "ImagePredicateModule"),
            ("LocalPredicateModule", "AllAtoms"),
            ("ImagePredicateModule", "AllAtoms"),
        ] {
            assert!(
                edges.contains(&(responder.to_string(), sender.to_string())),
                "missing edge {responder} -> {sender}"
            );
        }
    }

    #[test]
    fn dispatch_and_all_ground_atoms_match_direct_queries() {
        let v = vocabulary();
        let local = [v.directly_above.clone(), v.anywhere_above.clone()];
        let image = [v.one_thick.clone(), v.two_thick.clone()];
        let dispatch = PredicateDispatchModule::new(local.clone(), image.clone()).unwrap();
        let all = AllGroundAtomsModule::new(known_objects(&v), local.into_iter().chain(image));
        let mut perceiver = ModularPerceiver::new(vec![
            Box::new(sensor_module(Arc::new(AtomicUsize::new(0)))),
            Box::new(feature_module()),
            Box::new(local_module(&v)),
            Box::new(image_module(&v)),
            Box::new(dispatch),
            Box::new(all),
        ]);
        let atoms = atoms_for(&mut perceiver, &Query::AllGroundAtoms);
        assert_eq!(render(&atoms), EXPECTED);
    }

    #[test]
    fn dispatch_skips_empty_halves() {
        let v = vocabulary();
        let local = [v.directly_above.clone()];
        let image = [v.one_thick.clone()];
        let dispatch = PredicateDispatchModule::new(local, image).unwrap();
        // No image module registered: a local-only request must still succeed.
        let mut perceiver = ModularPerceiver::new(vec![
            Box::new(sensor_module(Arc::new(AtomicUsize::new(0)))),
            Box::new(feature_module()),
            Box::new(local_module(&v)),
            Box::new(dispatch),
        ]);
        let query = Query::predicates([v.directly_above.clone()], known_objects(&v));
        let atoms = atoms_for(&mut perceiver, &query);
        assert_eq!(render(&atoms), "(IsDirectlyAbove A B), (IsDirectlyAbove C D)");
    }

    #[test]
    fn dispatch_rejects_overlapping_predicates() {
        let v = vocabulary();
        let result = PredicateDispatchModule::new([v.one_thick.clone()], [v.one_thick.clone()]);
        assert!(matches!(result, Err(PerceptionError::InvalidConfiguration(_))));
    }

    #[test]
    fn dispatch_declines_unknown_predicates() {
        let v = vocabulary();
        let none: Vec<Predicate> = Vec::new();
        let dispatch = PredicateDispatchModule::new([v.directly_above.clone()], none).unwrap();
        let known = Query::predicates([v.directly_above.clone()], known_objects(&v));
        let unknown = Query::predicates([v.two_thick.clone()], known_objects(&v));
        assert!(dispatch.can_answer(&known));
        assert!(!dispatch.can_answer(&unknown));
    }

    #[test]
    fn local_module_declines_uninterpreted_predicates() {
        let v = vocabulary();
        let module = local_module(&v);
        let interpreted = Query::local_predicates([v.anywhere_above.clone()], known_objects(&v));
        let unknown = Query::local_predicates([v.one_thick.clone()], known_objects(&v));
        assert!(module.can_answer(&interpreted));
        assert!(!module.can_answer(&unknown));
        assert_eq!(module.predicates().count(), 2);
    }

    #[test]
    fn image_module_respects_declared_predicates() {
        let v = vocabulary();
        let module = image_module(&v);
        let declared = Query::image_predicates([v.one_thick.clone()], known_objects(&v));
        let local = Query::image_predicates([v.directly_above.clone()], known_objects(&v));
        assert!(module.can_answer(&declared));
        assert!(!module.can_answer(&local));
    }

    #[test]
    fn image_is_unavailable_to_local_interpretations() {
        let v = vocabulary();
        let module = LocalPredicateModule::new()
            .with_interpretation(v.one_thick.clone(), |ctx, _| ctx.image().map(|_| true));
        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        let query = Query::local_predicates([v.one_thick.clone()], known_objects(&v));
        let result = perceiver.get_response(&query);
        assert!(matches!(result, Err(PerceptionError::InvalidConfiguration(_))));
    }

    #[test]
    fn interpretations_see_the_current_timestep() {
        let v = vocabulary();
        let started = Predicate::new("Started", Vec::<Type>::new());
        let module = LocalPredicateModule::new()
            .with_interpretation(started.clone(), |ctx, _| Ok(ctx.time() > 0));
        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        let query = Query::local_predicates([started], known_objects(&v));

        assert!(atoms_for(&mut perceiver, &query).is_empty());
        perceiver.tick();
        assert_eq!(render(&atoms_for(&mut perceiver, &query)), "(Started)");
    }

    #[test]
    fn features_are_computed_only_for_queried_objects() {
        let v = vocabulary();
        let lookups = Arc::new(AtomicUsize::new(0));
        let lookups_in_detector = lookups.clone();
        let features = ObjectFeatureModule::new(
            move |obs, object, feature| {
                lookups_in_detector.fetch_add(1, Ordering::SeqCst);
                locate(obs, object, feature)
            },
            Query::sensor("camera"),
        );
        let mut perceiver = ModularPerceiver::new(vec![
            Box::new(sensor_module(Arc::new(AtomicUsize::new(0)))),
            Box::new(features),
            Box::new(local_module(&v)),
        ]);
        let objects = [v.letter.object("A"), v.letter.object("B")];
        let query = Query::local_predicates([v.anywhere_above.clone()], objects);
        perceiver.get_response(&query).unwrap();
        // Two objects, two features each; every pair reuses cached values.
        assert_eq!(lookups.load(Ordering::SeqCst), 4);
    }
}
