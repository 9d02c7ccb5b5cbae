//! [`ObjectDetectionModule`] – detects the objects visible in a sensory
//! input.

use std::collections::BTreeSet;

use modper_core::{PerceptionModule, QueryContext};
use modper_types::{Object, Observation, PerceptionError, Query, Response, Result};
use tracing::debug;

type Detector = Box<dyn Fn(&Observation) -> Result<BTreeSet<Object>> + Send + Sync>;

/// Answers [`Query::AllObjects`] by running a detector on the response to a
/// configured sensory input query (usually a [`Query::Sensor`]).
///
/// Only objects that are instances of one of the requested types are
/// returned; an empty type set requests every detected object.
pub struct ObjectDetectionModule {
    detector: Detector,
    sensory_input_query: Query,
}

impl ObjectDetectionModule {
    pub fn new(
        detector: impl Fn(&Observation) -> Result<BTreeSet<Object>> + Send + Sync + 'static,
        sensory_input_query: Query,
    ) -> Self {
        Self {
            detector: Box::new(detector),
            sensory_input_query,
        }
    }
}

impl PerceptionModule for ObjectDetectionModule {
    fn name(&self) -> &str {
        "ObjectDetectionModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        matches!(query, Query::AllObjects { .. })
    }

    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let Query::AllObjects { types } = query else {
            return Err(PerceptionError::CannotAnswer {
                module: self.name().to_string(),
                query: query.clone(),
            });
        };
        let input = ctx.send(&self.sensory_input_query)?.into_observation()?;
        let detected = (self.detector)(&input)?;
        let objects: BTreeSet<Object> = detected
            .into_iter()
            .filter(|object| types.is_empty() || types.iter().any(|ty| object.is_instance(ty)))
            .collect();
        debug!(count = objects.len(), "objects detected");
        Ok(Response::Objects(objects))
    }
}

#[cfg(test)]
mod tests {
    use modper_core::ModularPerceiver;
    use modper_types::{LabelGrid, Type};

    use super::*;
    use crate::sensor::SensorModule;

    /// Every non-`X` cell is an object; digits are `Digit`s, the rest `Letter`s.
    fn detect_labels(obs: &Observation) -> Result<BTreeSet<Object>> {
        let grid = obs.as_labels()?;
        let (rows, cols) = grid.shape();
        let mut objects = BTreeSet::new();
        for r in 0..rows {
            for c in 0..cols {
                match grid.get(r, c) {
                    Some("X") | None => {}
                    Some(label) if label.chars().all(|ch| ch.is_ascii_digit()) => {
                        objects.insert(Type::new("Digit").object(label));
                    }
                    Some(label) => {
                        objects.insert(Type::new("Letter").object(label));
                    }
                }
            }
        }
        Ok(objects)
    }

    fn perceiver() -> ModularPerceiver {
        let grid = LabelGrid::parse("A X 1\nX B X").unwrap();
        let camera = move || Observation::Labels(grid.clone());
        let sensors = SensorModule::new().with_sensor("camera", camera);
        let detection = ObjectDetectionModule::new(detect_labels, Query::sensor("camera"));
        ModularPerceiver::new(vec![Box::new(sensors), Box::new(detection)])
    }

    #[test]
    fn detects_all_objects_when_no_types_requested() {
        let mut perceiver = perceiver();
        let objects = perceiver
            .get_response(&Query::all_objects(Vec::<Type>::new()))
            .unwrap()
            .into_objects()
            .unwrap();
        let names: Vec<&str> = objects.iter().map(Object::name).collect();
        assert_eq!(names, ["1", "A", "B"]);
    }

    #[test]
    fn filters_by_requested_type() {
        let mut perceiver = perceiver();
        let objects = perceiver
            .get_response(&Query::all_objects([Type::new("Digit")]))
            .unwrap()
            .into_objects()
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects.iter().next().unwrap().name(), "1");
    }

    #[test]
    fn records_sensor_connection() {
        let mut perceiver = perceiver();
        perceiver
            .get_response(&Query::all_objects(Vec::<Type>::new()))
            .unwrap();
        let responder = "SensorModule".to_string();
        let sender = "ObjectDetectionModule".to_string();
        assert!(perceiver.connections().contains(&(responder, sender)));
    }

    #[test]
    fn detector_errors_propagate() {
        let sensors = SensorModule::new().with_sensor("camera", || Observation::Scalar(0.0));
        let detection = ObjectDetectionModule::new(detect_labels, Query::sensor("camera"));
        let mut perceiver = ModularPerceiver::new(vec![Box::new(sensors), Box::new(detection)]);
        let result = perceiver.get_response(&Query::all_objects(Vec::<Type>::new()));
        assert!(matches!(result, Err(PerceptionError::MalformedObservation(_))));
    }
}
