//! The [`PerceptionModule`] trait implemented by every building block of a
//! [`ModularPerceiver`][crate::perceiver::ModularPerceiver].

use std::fmt;

use modper_types::{Query, Response, Result};

use crate::perceiver::QueryContext;

/// Position of a module inside its perceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of perception that answers one family of [`Query`]s.
///
/// Modules never call each other directly.  Inside
/// [`respond`][PerceptionModule::respond] they send follow-up queries through
/// the [`QueryContext`], and the perceiver routes each one to the single
/// module whose [`can_answer`][PerceptionModule::can_answer] accepts it.
///
/// Responses are cached by the perceiver per module and per timestep, so
/// `respond` runs at most once for a given query between two ticks.
pub trait PerceptionModule: Send + Sync {
    /// Label used in logs and in the connection graph.
    fn name(&self) -> &str;

    /// `true` when this module is responsible for `query`.
    fn can_answer(&self, query: &Query) -> bool;

    /// Compute the response to `query`.
    ///
    /// Only called when [`can_answer`][PerceptionModule::can_answer]
    /// returned `true` for the same query.
    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response>;

    /// Return to the initial state.  `seed` is `Some` when the caller
    /// requested a reseed.
    fn reset(&mut self, _seed: Option<u64>) {}

    /// Advance internal time by one step.
    fn tick(&mut self) {}
}
