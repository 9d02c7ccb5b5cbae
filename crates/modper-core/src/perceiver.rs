//! [`ModularPerceiver`] – query router, per-timestep response cache and
//! module connectivity recorder.
//!
//! # Example
//!
//! ```rust
//! use modper_core::{ModularPerceiver, PerceptionModule, QueryContext};
//! use modper_types::{Query, Response, Result};
//!
//! struct Clock;
//!
//! impl PerceptionModule for Clock {
//!     fn name(&self) -> &str {
//!         "Clock"
//!     }
//!     fn can_answer(&self, query: &Query) -> bool {
//!         matches!(query, Query::Custom(name) if name == "time")
//!     }
//!     fn respond(&self, _query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
//!         Ok(Response::Feature(ctx.time() as f64))
//!     }
//! }
//!
//! let mut perceiver = ModularPerceiver::new(vec![Box::new(Clock)]);
//! perceiver.tick();
//! let now = perceiver.get_response(&Query::custom("time")).unwrap();
//! assert_eq!(now, Response::Feature(1.0));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use modper_types::{PerceptionError, Query, Response, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument, warn};

use crate::config::PerceiverConfig;
use crate::graph;
use crate::module::{ModuleId, PerceptionModule};

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Counters accumulated since the perceiver was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerceiverStats {
    /// Queries routed, including those served from cache.
    pub queries: u64,
    /// Queries answered from a module's per-timestep cache.
    pub cache_hits: u64,
    /// Calls into [`PerceptionModule::respond`].
    pub module_calls: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

struct DispatchState {
    config: PerceiverConfig,
    time: u64,
    /// `caches[i]` holds module `i`'s responses for the current timestep.
    caches: Vec<HashMap<Query, Response>>,
    rngs: Vec<StdRng>,
    /// `(responder, sender)` pairs observed so far.
    edges: BTreeSet<(ModuleId, ModuleId)>,
    /// Queries currently being computed, outermost first.
    in_flight: Vec<Query>,
    stats: PerceiverStats,
}

impl DispatchState {
    fn new(config: PerceiverConfig, n_modules: usize) -> Self {
        Self {
            time: 0,
            caches: vec![HashMap::new(); n_modules],
            rngs: (0..n_modules)
                .map(|_| StdRng::seed_from_u64(config.seed))
                .collect(),
            edges: BTreeSet::new(),
            in_flight: Vec::new(),
            stats: PerceiverStats::default(),
            config,
        }
    }

    fn clear_caches(&mut self) {
        for cache in &mut self.caches {
            cache.clear();
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QueryContext
// ────────────────────────────────────────────────────────────────────────────

/// Handle passed to [`PerceptionModule::respond`].
///
/// Gives the responding module access to its sibling modules (through
/// [`send`][QueryContext::send]), the current timestep and its own random
/// number generator.
pub struct QueryContext<'a> {
    modules: &'a [Box<dyn PerceptionModule>],
    state: &'a mut DispatchState,
    module: ModuleId,
}

impl QueryContext<'_> {
    /// Send `query` to whichever module can answer it.
    pub fn send(&mut self, query: &Query) -> Result<Response> {
        dispatch(self.modules, self.state, query, Some(self.module))
    }

    /// Number of ticks since the last reset.
    pub fn time(&self) -> u64 {
        self.state.time
    }

    /// The responding module's generator, seeded from the perceiver seed.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.state.rngs[self.module.0]
    }

    /// Identifier of the module currently responding.
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ModularPerceiver
// ────────────────────────────────────────────────────────────────────────────

/// Owns a set of [`PerceptionModule`]s and routes queries between them.
pub struct ModularPerceiver {
    modules: Vec<Box<dyn PerceptionModule>>,
    state: DispatchState,
}

impl ModularPerceiver {
    /// Create a perceiver with the default [`PerceiverConfig`].
    pub fn new(modules: Vec<Box<dyn PerceptionModule>>) -> Self {
        Self::with_config(modules, PerceiverConfig::default())
    }

    pub fn with_config(modules: Vec<Box<dyn PerceptionModule>>, config: PerceiverConfig) -> Self {
        let state = DispatchState::new(config, modules.len());
        Self { modules, state }
    }

    pub fn config(&self) -> &PerceiverConfig {
        &self.state.config
    }

    /// Names of the owned modules, in registration order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name())
    }

    pub fn time(&self) -> u64 {
        self.state.time
    }

    pub fn stats(&self) -> PerceiverStats {
        self.state.stats
    }

    /// Answer a query coming from outside the perceiver.
    ///
    /// # Errors
    ///
    /// - [`PerceptionError::NoResponder`] / [`PerceptionError::AmbiguousResponders`]
    ///   when not exactly one module accepts a query along the way.
    /// - [`PerceptionError::CyclicQuery`] when a module (transitively) asks
    ///   for the query it is computing.
    /// - [`PerceptionError::QueryDepthExceeded`] past
    ///   [`PerceiverConfig::max_query_depth`] nested queries.
    /// - Any error returned by a module.
    #[instrument(skip(self, query), fields(query = %query, time = self.state.time))]
    pub fn get_response(&mut self, query: &Query) -> Result<Response> {
        let result = dispatch(&self.modules, &mut self.state, query, None);
        if let Err(ref e) = result {
            warn!(error = %e, "query failed");
        }
        result
    }

    /// Reset time and caches, reseeding every module when `seed` is given.
    pub fn reset(&mut self, seed: Option<u64>) {
        self.state.time = 0;
        self.state.clear_caches();
        self.state.in_flight.clear();
        if let Some(seed) = seed {
            self.state.config.seed = seed;
            for rng in &mut self.state.rngs {
                *rng = StdRng::seed_from_u64(seed);
            }
        }
        for module in &mut self.modules {
            module.reset(seed);
        }
        debug!(?seed, "perceiver reset");
    }

    /// Advance time for all modules, invalidating every cached response.
    pub fn tick(&mut self) {
        self.state.time += 1;
        self.state.clear_caches();
        for module in &mut self.modules {
            module.tick();
        }
    }

    /// `(responder, sender)` module names for every module-to-module query
    /// answered so far.
    pub fn connections(&self) -> BTreeSet<(String, String)> {
        self.state
            .edges
            .iter()
            .map(|(responder, sender)| {
                (
                    self.modules[responder.0].name().to_string(),
                    self.modules[sender.0].name().to_string(),
                )
            })
            .collect()
    }

    /// Render [`connections`][ModularPerceiver::connections] as a Graphviz
    /// digraph, with edges pointing in the direction data flows.
    pub fn to_dot(&self) -> String {
        graph::to_dot(&self.connections())
    }

    /// Write [`to_dot`][ModularPerceiver::to_dot] to `path`.
    pub fn write_dot(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_dot())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatch
// ────────────────────────────────────────────────────────────────────────────

fn find_responder(modules: &[Box<dyn PerceptionModule>], query: &Query) -> Result<ModuleId> {
    let mut candidates = modules
        .iter()
        .enumerate()
        .filter(|(_, module)| module.can_answer(query));
    match (candidates.next(), candidates.next()) {
        (None, _) => Err(PerceptionError::NoResponder(query.clone())),
        (Some((index, _)), None) => Ok(ModuleId(index)),
        (Some(first), Some(second)) => {
            let names = [first, second]
                .into_iter()
                .chain(candidates)
                .map(|(_, module)| module.name().to_string())
                .collect();
            Err(PerceptionError::AmbiguousResponders {
                query: query.clone(),
                modules: names,
            })
        }
    }
}

fn dispatch(
    modules: &[Box<dyn PerceptionModule>],
    state: &mut DispatchState,
    query: &Query,
    sender: Option<ModuleId>,
) -> Result<Response> {
    state.stats.queries += 1;
    let responder = find_responder(modules, query)?;

    let cached = if state.config.cache_responses {
        state.caches[responder.0].get(query).cloned()
    } else {
        None
    };
    if let Some(response) = cached {
        state.stats.cache_hits += 1;
        debug!(%query, responder = modules[responder.0].name(), "cache hit");
        if let Some(sender) = sender {
            state.edges.insert((responder, sender));
        }
        return Ok(response);
    }

    if state.in_flight.contains(query) {
        return Err(PerceptionError::CyclicQuery(query.clone()));
    }
    if state.in_flight.len() >= state.config.max_query_depth {
        return Err(PerceptionError::QueryDepthExceeded {
            max_depth: state.config.max_query_depth,
        });
    }

    let module = &modules[responder.0];
    debug!(%query, responder = module.name(), depth = state.in_flight.len(), "dispatching");
    state.in_flight.push(query.clone());
    state.stats.module_calls += 1;
    let result = {
        let mut ctx = QueryContext {
            modules,
            state: &mut *state,
            module: responder,
        };
        module.respond(query, &mut ctx)
    };
    state.in_flight.pop();
    let response = result?;

    if state.config.cache_responses {
        state.caches[responder.0].insert(query.clone(), response.clone());
    }
    if let Some(sender) = sender {
        state.edges.insert((responder, sender));
    }
    Ok(response)
}
