//! [`SensorModule`] – answers [`Query::Sensor`] by reading a registered
//! [`Sensor`].
//!
//! Sensors are only read when some module (or an external caller) asks for
//! them, and the perceiver caches the reading until the next tick, so every
//! sensor is read at most once per timestep and never when nobody needs it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use modper_core::{PerceptionModule, QueryContext};
use modper_types::{Observation, PerceptionError, Query, Response, Result};
use tracing::debug;

/// A source of [`Observation`]s, e.g. a camera or an environment hook.
///
/// Any `FnMut() -> Observation` closure is a sensor.
pub trait Sensor: Send {
    /// Produce the current reading.
    ///
    /// # Errors
    ///
    /// Returns [`PerceptionError::SensorFault`] when the reading cannot be
    /// taken.
    fn read(&mut self) -> Result<Observation>;
}

impl<F> Sensor for F
where
    F: FnMut() -> Observation + Send,
{
    fn read(&mut self) -> Result<Observation> {
        Ok(self())
    }
}

/// Module exposing a set of named sensors.
pub struct SensorModule {
    name: String,
    sensors: BTreeMap<String, Mutex<Box<dyn Sensor>>>,
}

impl Default for SensorModule {
    fn default() -> Self {
        Self {
            name: "SensorModule".to_string(),
            sensors: BTreeMap::new(),
        }
    }
}

impl SensorModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename the module (the default is `"SensorModule"`).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder form of [`register`][SensorModule::register].
    pub fn with_sensor(mut self, name: impl Into<String>, sensor: impl Sensor + 'static) -> Self {
        self.register(name, sensor);
        self
    }

    /// Register `sensor` under `name`, replacing any previous sensor with the
    /// same name.
    pub fn register(&mut self, name: impl Into<String>, sensor: impl Sensor + 'static) {
        self.sensors.insert(name.into(), Mutex::new(Box::new(sensor)));
    }

    pub fn sensor_names(&self) -> impl Iterator<Item = &str> {
        self.sensors.keys().map(String::as_str)
    }
}

impl PerceptionModule for SensorModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_answer(&self, query: &Query) -> bool {
        matches!(query, Query::Sensor(name) if self.sensors.contains_key(name))
    }

    fn respond(&self, query: &Query, _ctx: &mut QueryContext<'_>) -> Result<Response> {
        let Query::Sensor(name) = query else {
            return Err(PerceptionError::CannotAnswer {
                module: self.name.clone(),
                query: query.clone(),
            });
        };
        let sensor = self
            .sensors
            .get(name)
            .ok_or_else(|| PerceptionError::UnknownSensor(name.clone()))?;
        let Ok(mut sensor) = sensor.lock() else {
            return Err(PerceptionError::SensorFault {
                sensor: name.clone(),
                details: "sensor lock poisoned".to_string(),
            });
        };
        let observation = sensor.read()?;
        debug!(sensor = %name, kind = observation.kind(), "sensor read");
        Ok(Response::Observation(observation))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use modper_core::ModularPerceiver;

    use super::*;

    struct FaultySensor;

    impl Sensor for FaultySensor {
        fn read(&mut self) -> Result<Observation> {
            Err(PerceptionError::SensorFault {
                sensor: "lidar".to_string(),
                details: "disconnected".to_string(),
            })
        }
    }

    fn counting_camera(calls: Arc<AtomicUsize>) -> impl Sensor {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Observation::Vector(vec![0.0; 4])
        }
    }

    /// Queries `camera2` every fifth timestep and never touches `camera1`.
    struct Poller;

    impl PerceptionModule for Poller {
        fn name(&self) -> &str {
            "Poller"
        }

        fn can_answer(&self, query: &Query) -> bool {
            *query == Query::custom("poll")
        }

        fn respond(&self, _query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
            if ctx.time().is_multiple_of(5) {
                ctx.send(&Query::sensor("camera2"))?;
            }
            Ok(Response::Unit)
        }
    }

    #[test]
    fn answers_only_registered_sensors() {
        let module = SensorModule::new().with_sensor("camera", || Observation::Scalar(1.0));
        assert!(module.can_answer(&Query::sensor("camera")));
        assert!(!module.can_answer(&Query::sensor("lidar")));
        assert!(!module.can_answer(&Query::custom("camera")));
    }

    #[test]
    fn returns_sensor_reading() {
        let module = SensorModule::new().with_sensor("camera", || Observation::Scalar(1.0));
        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        let response = perceiver.get_response(&Query::sensor("camera")).unwrap();
        assert_eq!(response, Response::Observation(Observation::Scalar(1.0)));
    }

    #[test]
    fn sensor_faults_propagate() {
        let module = SensorModule::new().with_sensor("lidar", FaultySensor);
        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        let result = perceiver.get_response(&Query::sensor("lidar"));
        assert!(matches!(result, Err(PerceptionError::SensorFault { .. })));
    }

    #[test]
    fn sensors_are_read_lazily() {
        let camera1_calls = Arc::new(AtomicUsize::new(0));
        let camera2_calls = Arc::new(AtomicUsize::new(0));
        let sensors = SensorModule::new()
            .with_sensor("camera1", counting_camera(camera1_calls.clone()))
            .with_sensor("camera2", counting_camera(camera2_calls.clone()));

        let mut perceiver = ModularPerceiver::new(vec![Box::new(sensors), Box::new(Poller)]);
        perceiver.reset(Some(0));
        for _ in 0..10 {
            perceiver.tick();
            let response = perceiver.get_response(&Query::custom("poll")).unwrap();
            assert_eq!(response, Response::Unit);
        }

        assert_eq!(camera1_calls.load(Ordering::SeqCst), 0);
        assert_eq!(camera2_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sensor_read_at_most_once_per_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let module = SensorModule::new().with_sensor("camera", counting_camera(calls.clone()));
        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        for _ in 0..3 {
            perceiver.get_response(&Query::sensor("camera")).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        perceiver.tick();
        perceiver.get_response(&Query::sensor("camera")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registering_same_name_replaces_sensor() {
        let mut module = SensorModule::new().with_sensor("camera", || Observation::Scalar(1.0));
        module.register("camera", || Observation::Scalar(2.0));
        assert_eq!(module.sensor_names().collect::<Vec<_>>(), ["camera"]);

        let mut perceiver = ModularPerceiver::new(vec![Box::new(module)]);
        let response = perceiver.get_response(&Query::sensor("camera")).unwrap();
        assert_eq!(response, Response::Observation(Observation::Scalar(2.0)));
    }
}
