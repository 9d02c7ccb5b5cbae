//! Exposing an environment's observations to a perceiver.
//!
//! [`capture_observations`] wraps an [`Environment`] so that the observation
//! returned by every `reset`/`step` lands in a shared slot, and returns a
//! [`SensorModule`] that reads from that slot.  Agents keep driving the
//! wrapped environment as usual; the perceiver sees the latest observation
//! only when one of its modules asks for it.

use std::sync::{Arc, Mutex};

use crate::sensor::SensorModule;
use modper_types::{Observation, PerceptionError, Result};

/// Outcome of a single [`Environment::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

/// A sequential decision environment.
pub trait Environment {
    type Action;

    /// Start a new episode and return its first observation.
    fn reset(&mut self, seed: Option<u64>) -> Observation;

    fn step(&mut self, action: Self::Action) -> Step;
}

#[derive(Clone, Default)]
struct ObservationSlot(Arc<Mutex<Observation>>);

impl ObservationSlot {
    fn store(&self, observation: &Observation) {
        // A poisoned slot only means a reader panicked; the data is a plain value.
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = observation.clone();
    }

    fn load(&self) -> Result<Observation> {
        self.0
            .lock()
            .map(|slot| slot.clone())
            .map_err(|_| PerceptionError::SensorFault {
                sensor: "observation capture".to_string(),
                details: "observation slot poisoned".to_string(),
            })
    }
}

/// An [`Environment`] that records its last observation.
pub struct ObservationCapture<E> {
    env: E,
    slot: ObservationSlot,
}

impl<E: Environment> ObservationCapture<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            slot: ObservationSlot::default(),
        }
    }

    /// The observation from the most recent `reset` or `step`
    /// ([`Observation::Empty`] before the first reset).
    pub fn last_observation(&self) -> Result<Observation> {
        self.slot.load()
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }
}

impl<E: Environment> Environment for ObservationCapture<E> {
    type Action = E::Action;

    fn reset(&mut self, seed: Option<u64>) -> Observation {
        let observation = self.env.reset(seed);
        self.slot.store(&observation);
        observation
    }

    fn step(&mut self, action: Self::Action) -> Step {
        let step = self.env.step(action);
        self.slot.store(&step.observation);
        step
    }
}

struct SlotSensor(ObservationSlot);

impl crate::sensor::Sensor for SlotSensor {
    fn read(&mut self) -> Result<Observation> {
        self.0.load()
    }
}

/// Wrap `env` and create a [`SensorModule`] answering
/// `Query::Sensor(sensor_name)` with the environment's latest observation.
///
/// ```
/// use modper_core::ModularPerceiver;
/// use modper_modules::{Environment, Step, capture_observations};
/// use modper_types::{Observation, Query, Response};
///
/// struct Counter(f64);
///
/// impl Environment for Counter {
///     type Action = f64;
///     fn reset(&mut self, _seed: Option<u64>) -> Observation {
///         self.0 = 0.0;
///         Observation::Scalar(self.0)
///     }
///     fn step(&mut self, action: f64) -> Step {
///         self.0 += action;
///         Step { observation: Observation::Scalar(self.0), reward: 0.0, terminated: false, truncated: false }
///     }
/// }
///
/// let (mut env, sensors) = capture_observations(Counter(0.0), "state");
/// let mut perceiver = ModularPerceiver::new(vec![Box::new(sensors)]);
/// env.reset(None);
/// env.step(2.5);
/// let seen = perceiver.get_response(&Query::sensor("state")).unwrap();
/// assert_eq!(seen, Response::Observation(Observation::Scalar(2.5)));
/// ```
pub fn capture_observations<E: Environment>(
    env: E,
    sensor_name: impl Into<String>,
) -> (ObservationCapture<E>, SensorModule) {
    let capture = ObservationCapture::new(env);
    let sensor = SlotSensor(capture.slot.clone());
    let sensors = SensorModule::new().with_sensor(sensor_name, sensor);
    (capture, sensors)
}
