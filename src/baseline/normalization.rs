//! Normalization stages applied after outlier rejection
//!
//! Weather and occupancy adjustment need degree-day and occupancy-schedule
//! data that is not wired in yet, so both slots default to pass-through
//! stages. Real adjustment logic is plugged in by implementing
//! [`NormalizationStage`] and handing it to the chain; the aggregator does
//! not change.

use crate::core::{Error, MonthSample, Result};
use serde::{Deserialize, Serialize};

/// Result of one stage: adjusted samples plus the factor applied
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub samples: Vec<MonthSample>,
    pub factor: f64,
}

/// Trait for normalization stages
///
/// A stage must return exactly as many samples as it received, in the same
/// order. Months with missing environmental data pass through unchanged
/// rather than being dropped.
pub trait NormalizationStage {
    /// Name recorded in responses
    fn name(&self) -> &str;

    /// Adjust the samples
    fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput>;
}

/// Identity stage, factor 1.0
pub struct PassThrough {
    name: &'static str,
}

impl PassThrough {
    pub fn weather() -> Self {
        Self { name: "weather_pass_through" }
    }

    pub fn occupancy() -> Self {
        Self { name: "occupancy_pass_through" }
    }
}

impl NormalizationStage for PassThrough {
    fn name(&self) -> &str {
        self.name
    }

    fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput> {
        Ok(StageOutput { samples, factor: 1.0 })
    }
}

/// Samples after the whole chain, with the factor of each stage
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSamples {
    pub samples: Vec<MonthSample>,
    pub weather_factor: f64,
    pub occupancy_factor: f64,
}

/// What the chain did, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    pub weather_stage: String,
    pub weather_factor: f64,
    pub occupancy_stage: String,
    pub occupancy_factor: f64,
}

/// Weather stage followed by occupancy stage
pub struct NormalizationChain {
    weather: Box<dyn NormalizationStage + Send + Sync>,
    occupancy: Box<dyn NormalizationStage + Send + Sync>,
}

impl NormalizationChain {
    /// Chain of pass-through stages
    pub fn new() -> Self {
        Self {
            weather: Box::new(PassThrough::weather()),
            occupancy: Box::new(PassThrough::occupancy()),
        }
    }

    /// Replace the weather stage
    pub fn with_weather(mut self, stage: impl NormalizationStage + Send + Sync + 'static) -> Self {
        self.weather = Box::new(stage);
        self
    }

    /// Replace the occupancy stage
    pub fn with_occupancy(mut self, stage: impl NormalizationStage + Send + Sync + 'static) -> Self {
        self.occupancy = Box::new(stage);
        self
    }

    pub fn weather_stage(&self) -> &str {
        self.weather.name()
    }

    pub fn occupancy_stage(&self) -> &str {
        self.occupancy.name()
    }

    /// Run weather then occupancy normalization
    pub fn apply(&self, samples: Vec<MonthSample>) -> Result<NormalizedSamples> {
        let weather = run_stage(self.weather.as_ref(), samples)?;
        let occupancy = run_stage(self.occupancy.as_ref(), weather.samples)?;

        Ok(NormalizedSamples {
            samples: occupancy.samples,
            weather_factor: weather.factor,
            occupancy_factor: occupancy.factor,
        })
    }
}

impl Default for NormalizationChain {
    fn default() -> Self {
        Self::new()
    }
}

fn run_stage(stage: &(dyn NormalizationStage + Send + Sync), samples: Vec<MonthSample>) -> Result<StageOutput> {
    let expected = samples.len();
    let output = stage.normalize(samples)?;

    if output.samples.len() != expected {
        return Err(Error::Normalization(format!(
            "stage '{}' returned {} samples for {} inputs",
            stage.name(),
            output.samples.len(),
            expected
        )));
    }
    if !output.factor.is_finite() {
        return Err(Error::Normalization(format!(
            "stage '{}' reported a non-finite factor",
            stage.name()
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Multiplies every month by a fixed factor
    struct Scale(f64);

    impl NormalizationStage for Scale {
        fn name(&self) -> &str {
            "scale"
        }

        fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput> {
            let samples = samples
                .into_iter()
                .map(|s| MonthSample { kwh: s.kwh * self.0, ..s })
                .collect();
            Ok(StageOutput { samples, factor: self.0 })
        }
    }

    /// Adds a constant to every month
    struct Offset(f64);

    impl NormalizationStage for Offset {
        fn name(&self) -> &str {
            "offset"
        }

        fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput> {
            let samples = samples
                .into_iter()
                .map(|s| MonthSample { kwh: s.kwh + self.0, ..s })
                .collect();
            Ok(StageOutput { samples, factor: 1.0 })
        }
    }

    /// Breaks the contract by dropping the first month
    struct DropFirst;

    impl NormalizationStage for DropFirst {
        fn name(&self) -> &str {
            "drop_first"
        }

        fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput> {
            Ok(StageOutput {
                samples: samples.into_iter().skip(1).collect(),
                factor: 1.0,
            })
        }
    }

    fn samples() -> Vec<MonthSample> {
        vec![MonthSample::new("2025-01", 100.0), MonthSample::new("2025-02", 200.0)]
    }

    #[test]
    fn test_default_chain_is_identity() {
        let chain = NormalizationChain::new();
        let result = chain.apply(samples()).unwrap();

        assert_eq!(result.samples, samples());
        assert_eq!(result.weather_factor, 1.0);
        assert_eq!(result.occupancy_factor, 1.0);
        assert_eq!(chain.weather_stage(), "weather_pass_through");
        assert_eq!(chain.occupancy_stage(), "occupancy_pass_through");
    }

    #[test]
    fn test_weather_runs_before_occupancy() {
        let chain = NormalizationChain::new()
            .with_weather(Offset(10.0))
            .with_occupancy(Scale(2.0));
        let result = chain.apply(samples()).unwrap();

        // (x + 10) * 2, not x * 2 + 10
        let values: Vec<f64> = result.samples.iter().map(|s| s.kwh).collect();
        assert_eq!(values, vec![220.0, 420.0]);
        assert_eq!(result.weather_factor, 1.0);
        assert_eq!(result.occupancy_factor, 2.0);
        assert_eq!(result.samples[0].period, "2025-01");
    }

    #[test]
    fn test_rejects_stage_that_drops_samples() {
        let chain = NormalizationChain::new().with_occupancy(DropFirst);
        let err = chain.apply(samples()).unwrap_err();
        assert!(matches!(err, Error::Normalization(_)));
        assert!(err.to_string().contains("drop_first"));
    }

    #[test]
    fn test_rejects_non_finite_factor() {
        let chain = NormalizationChain::new().with_weather(Scale(f64::NAN));
        assert!(matches!(chain.apply(samples()), Err(Error::Normalization(_))));
    }

    #[test]
    fn test_empty_input_passes_through() {
        let result = NormalizationChain::new().apply(Vec::new()).unwrap();
        assert!(result.samples.is_empty());
    }
}
