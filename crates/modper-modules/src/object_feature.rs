//! [`ObjectFeatureModule`] – extracts scalar features of individual objects.

use modper_core::{PerceptionModule, QueryContext};
use modper_types::{Object, Observation, PerceptionError, Query, Response, Result};

type FeatureDetector = Box<dyn Fn(&Observation, &Object, &str) -> Result<f64> + Send + Sync>;

/// Answers [`Query::ObjectFeature`] by running a feature detector on the
/// response to a configured sensory input query.
///
/// Each `(object, feature)` pair is computed at most once per timestep, and
/// the sensory input is fetched once and shared by all of them.
pub struct ObjectFeatureModule {
    detector: FeatureDetector,
    sensory_input_query: Query,
}

impl ObjectFeatureModule {
    pub fn new(
        detector: impl Fn(&Observation, &Object, &str) -> Result<f64> + Send + Sync + 'static,
        sensory_input_query: Query,
    ) -> Self {
        Self {
            detector: Box::new(detector),
            sensory_input_query,
        }
    }
}

impl PerceptionModule for ObjectFeatureModule {
    fn name(&self) -> &str {
        "ObjectFeatureModule"
    }

    fn can_answer(&self, query: &Query) -> bool {
        matches!(query, Query::ObjectFeature { .. })
    }

    fn respond(&self, query: &Query, ctx: &mut QueryContext<'_>) -> Result<Response> {
        let Query::ObjectFeature { object, feature } = query else {
            return Err(PerceptionError::CannotAnswer {
                module: self.name().to_string(),
                query: query.clone(),
            });
        };
        let input = ctx.send(&self.sensory_input_query)?.into_observation()?;
        let value = (self.detector)(&input, object, feature)?;
        Ok(Response::Feature(value))
    }
}
