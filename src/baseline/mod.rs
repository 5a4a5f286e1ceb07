//! Baseline calculation
//!
//! Turns monthly consumption into a single monthly-average baseline:
//! outlier rejection, then the normalization chain, then the mean. Every
//! calculation is appended to the baseline history.

pub mod normalization;
pub mod outlier;
pub mod source;

use crate::core::{
    mean_kwh, parse_period, period_of, round2, BaselineConfig, BaselineRecord, Error,
    MonthSample, NewBaselineRecord, Result,
};
use crate::store::{BaselineStore, ReadingStore};
use chrono::Utc;
use normalization::{NormalizationChain, NormalizationSummary};
use outlier::OutlierFilter;
use serde::{Deserialize, Serialize};
use source::{MonthSampleSource, DEFAULT_HISTORY_MONTHS};
use uuid::Uuid;

/// Method label recorded for admin-set baselines
pub const MANUAL_METHOD: &str = "manual";

/// Request to calculate a baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRequest {
    pub building_id: Uuid,
    /// Months to use instead of the stored readings
    #[serde(default)]
    pub months: Option<Vec<MonthSample>>,
    /// Descriptive label, e.g. "historical_12_months"
    #[serde(default)]
    pub method: Option<String>,
    /// Period the baseline is recorded under (defaults to the current month)
    #[serde(default)]
    pub period: Option<String>,
}

impl BaselineRequest {
    pub fn new(building_id: Uuid) -> Self {
        Self {
            building_id,
            months: None,
            method: None,
            period: None,
        }
    }

    pub fn with_months(mut self, months: Vec<MonthSample>) -> Self {
        self.months = Some(months);
        self
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn with_period(mut self, period: &str) -> Self {
        self.period = Some(period.to_string());
        self
    }
}

/// Baseline returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineResponse {
    pub record_id: i64,
    pub building_id: Uuid,
    pub period: String,
    /// Normalized monthly average, rounded to 2 decimals
    pub baseline_monthly_kwh: f64,
    /// Unfiltered monthly average, rounded to 2 decimals
    pub raw_monthly_kwh: f64,
    pub method: String,
    pub normalization: NormalizationSummary,
    pub sample_count: usize,
    /// Samples that survived outlier rejection
    pub retained_count: usize,
    /// Whether the unfiltered mean had to be used
    pub fallback_used: bool,
}

/// Aggregation result before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedBaseline {
    pub record: NewBaselineRecord,
    pub sample_count: usize,
    pub retained_count: usize,
    pub fallback_used: bool,
}

/// Outlier filter followed by the normalization chain and a mean
#[derive(Default)]
pub struct BaselineAggregator {
    filter: OutlierFilter,
    chain: NormalizationChain,
}

impl BaselineAggregator {
    pub fn new(filter: OutlierFilter, chain: NormalizationChain) -> Self {
        Self { filter, chain }
    }

    pub fn chain(&self) -> &NormalizationChain {
        &self.chain
    }

    /// Reduce samples to one baseline record
    ///
    /// When filtering and normalization leave nothing, the baseline falls
    /// back to the mean of the original samples with factors of 1.0.
    /// `raw_kwh` is always the mean of the original samples.
    pub fn aggregate(
        &self,
        building_id: Uuid,
        period: &str,
        samples: &[MonthSample],
        method: &str,
    ) -> Result<AggregatedBaseline> {
        let raw_kwh = mean_kwh(samples).ok_or_else(|| {
            Error::NoData(format!("no data available for baseline of building {}", building_id))
        })?;

        let filtered = self.filter.filter(samples);
        let retained_count = filtered.len();
        let normalized = self.chain.apply(filtered)?;

        let (adjusted_kwh, weather_factor, occupancy_factor, fallback_used) =
            match mean_kwh(&normalized.samples) {
                Some(mean) => (mean, normalized.weather_factor, normalized.occupancy_factor, false),
                None => {
                    log::warn!(
                        "All {} samples for building {} were rejected, using unfiltered mean",
                        samples.len(),
                        building_id
                    );
                    (raw_kwh, 1.0, 1.0, true)
                }
            };

        Ok(AggregatedBaseline {
            record: NewBaselineRecord {
                building_id,
                period: period.to_string(),
                raw_kwh,
                adjusted_kwh,
                weather_factor,
                occupancy_factor,
                method: method.to_string(),
            },
            sample_count: samples.len(),
            retained_count,
            fallback_used,
        })
    }
}

/// CalculateBaseline and the baseline history operations
pub struct BaselineService<'a> {
    readings: &'a dyn ReadingStore,
    history: &'a dyn BaselineStore,
    aggregator: BaselineAggregator,
    history_months: usize,
    default_method: String,
}

impl<'a> BaselineService<'a> {
    /// Service with default filter, pass-through normalization and 12 months of history
    pub fn new(readings: &'a dyn ReadingStore, history: &'a dyn BaselineStore) -> Self {
        Self {
            readings,
            history,
            aggregator: BaselineAggregator::default(),
            history_months: DEFAULT_HISTORY_MONTHS,
            default_method: BaselineConfig::default().default_method,
        }
    }

    /// Service configured from the `[baseline]` section
    pub fn from_config(
        readings: &'a dyn ReadingStore,
        history: &'a dyn BaselineStore,
        config: &BaselineConfig,
    ) -> Result<Self> {
        let filter = OutlierFilter::new(config.outlier_threshold_pct)?;
        Ok(Self {
            readings,
            history,
            aggregator: BaselineAggregator::new(filter, NormalizationChain::new()),
            history_months: config.history_months,
            default_method: config.default_method.clone(),
        })
    }

    /// Swap in a different aggregator (e.g. with real normalization stages)
    pub fn with_aggregator(mut self, aggregator: BaselineAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Calculate, persist and report a baseline
    pub fn calculate(&self, request: &BaselineRequest) -> Result<BaselineResponse> {
        let period = match &request.period {
            Some(period) => {
                parse_period(period)?;
                period.clone()
            }
            None => period_of(&Utc::now()),
        };
        let method = request.method.as_deref().unwrap_or(&self.default_method);

        let samples = MonthSampleSource::new(self.readings)
            .with_history_months(self.history_months)
            .resolve(request.building_id, request.months.as_deref())?;

        let aggregated = self
            .aggregator
            .aggregate(request.building_id, &period, &samples, method)?;
        let stored = self.history.append(aggregated.record)?;

        log::info!(
            "Baseline for building {} period {}: {:.2} kWh/month (raw {:.2}, {} of {} samples kept)",
            stored.building_id,
            stored.period,
            stored.adjusted_kwh,
            stored.raw_kwh,
            aggregated.retained_count,
            aggregated.sample_count
        );

        let chain = self.aggregator.chain();
        Ok(BaselineResponse {
            record_id: stored.id,
            building_id: stored.building_id,
            period: stored.period,
            baseline_monthly_kwh: round2(stored.adjusted_kwh),
            raw_monthly_kwh: round2(stored.raw_kwh),
            method: stored.method,
            normalization: NormalizationSummary {
                weather_stage: chain.weather_stage().to_string(),
                weather_factor: stored.weather_factor,
                occupancy_stage: chain.occupancy_stage().to_string(),
                occupancy_factor: stored.occupancy_factor,
            },
            sample_count: aggregated.sample_count,
            retained_count: aggregated.retained_count,
            fallback_used: aggregated.fallback_used,
        })
    }

    /// Every baseline recorded for a building, oldest first
    pub fn history(&self, building_id: Uuid) -> Result<Vec<BaselineRecord>> {
        self.history.all_for(building_id)
    }

    /// Record an administrator-supplied baseline for a period
    pub fn set_manual(&self, building_id: Uuid, period: &str, kwh: f64) -> Result<BaselineRecord> {
        MonthSample::new(period, kwh).validate()?;

        let stored = self.history.append(NewBaselineRecord {
            building_id,
            period: period.to_string(),
            raw_kwh: kwh,
            adjusted_kwh: kwh,
            weather_factor: 1.0,
            occupancy_factor: 1.0,
            method: MANUAL_METHOD.to_string(),
        })?;

        log::info!("Manual baseline for building {} period {}: {:.2} kWh", building_id, period, kwh);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::normalization::{NormalizationStage, StageOutput};
    use crate::core::{MeterReading, ReadingSource};
    use crate::db::Database;
    use chrono::TimeZone;

    fn months(values: &[f64]) -> Vec<MonthSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, kwh)| MonthSample::new(&format!("2024-{:02}", i + 1), *kwh))
            .collect()
    }

    fn spike_months() -> Vec<MonthSample> {
        let mut values = vec![100.0; 11];
        values.push(1000.0);
        months(&values)
    }

    /// Weather stage reporting a degree-day factor
    struct DegreeDays;

    impl NormalizationStage for DegreeDays {
        fn name(&self) -> &str {
            "degree_days"
        }

        fn normalize(&self, samples: Vec<MonthSample>) -> Result<StageOutput> {
            let samples = samples
                .into_iter()
                .map(|s| MonthSample { kwh: s.kwh * 0.9, ..s })
                .collect();
            Ok(StageOutput { samples, factor: 0.9 })
        }
    }

    #[test]
    fn test_spike_with_default_threshold_falls_back() {
        let building = Uuid::new_v4();
        let result = BaselineAggregator::default()
            .aggregate(building, "2025-01", &spike_months(), "historical_12_months")
            .unwrap();

        // Mean 175: the ±20% band excludes the spike and the regular months alike
        assert!(result.fallback_used);
        assert_eq!(result.retained_count, 0);
        assert_eq!(result.record.raw_kwh, 175.0);
        assert_eq!(result.record.adjusted_kwh, result.record.raw_kwh);
        assert_eq!(result.record.weather_factor, 1.0);
        assert_eq!(result.record.occupancy_factor, 1.0);
    }

    #[test]
    fn test_spike_excluded_with_wider_band() {
        let aggregator = BaselineAggregator::new(OutlierFilter::new(0.5).unwrap(), NormalizationChain::new());
        let result = aggregator
            .aggregate(Uuid::new_v4(), "2025-01", &spike_months(), "historical_12_months")
            .unwrap();

        assert!(!result.fallback_used);
        assert_eq!(result.retained_count, 11);
        assert_eq!(result.record.adjusted_kwh, 100.0);
        assert_eq!(result.record.raw_kwh, 175.0);
    }

    #[test]
    fn test_raw_kwh_is_unfiltered_mean() {
        let samples = months(&[100.0, 95.0, 300.0, 105.0, 10.0, 98.0]);
        let result = BaselineAggregator::default()
            .aggregate(Uuid::new_v4(), "2025-01", &samples, "m")
            .unwrap();
        assert_eq!(result.record.raw_kwh, 118.0);
        assert_eq!(result.sample_count, 6);
    }

    #[test]
    fn test_huge_values_stay_finite() {
        let samples = months(&[1e308, 1e308]);
        let result = BaselineAggregator::default()
            .aggregate(Uuid::new_v4(), "2025-01", &samples, "m")
            .unwrap();

        assert!(!result.fallback_used);
        assert_eq!(result.retained_count, 2);
        assert_eq!(result.record.raw_kwh, 1e308);
        assert_eq!(result.record.adjusted_kwh, 1e308);
    }

    #[test]
    fn test_empty_samples_is_no_data() {
        let err = BaselineAggregator::default()
            .aggregate(Uuid::new_v4(), "2025-01", &[], "m")
            .unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    #[test]
    fn test_stage_factors_recorded() {
        let aggregator = BaselineAggregator::new(
            OutlierFilter::default(),
            NormalizationChain::new().with_weather(DegreeDays),
        );
        let result = aggregator
            .aggregate(Uuid::new_v4(), "2025-01", &months(&[200.0, 200.0]), "m")
            .unwrap();

        assert_eq!(result.record.weather_factor, 0.9);
        assert_eq!(result.record.occupancy_factor, 1.0);
        assert!((result.record.adjusted_kwh - 180.0).abs() < 1e-9);
        assert_eq!(result.record.raw_kwh, 200.0);
    }

    #[test]
    fn test_explicit_months_baseline() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let building = Uuid::new_v4();

        let request = BaselineRequest::new(building)
            .with_months(vec![MonthSample::new("2025-01", 162000.0), MonthSample::new("2025-02", 162000.0)])
            .with_period("2025-03");
        let response = service.calculate(&request).unwrap();

        assert_eq!(response.baseline_monthly_kwh, 162000.0);
        assert_eq!(response.method, "historical_12_months");
        assert_eq!(response.period, "2025-03");
        assert!(!response.fallback_used);
        assert_eq!(response.normalization.weather_stage, "weather_pass_through");

        let stored = db.most_recent_for(building, "2025-03").unwrap().unwrap();
        assert_eq!(stored.id, response.record_id);
        assert_eq!(stored.adjusted_kwh, 162000.0);
    }

    #[test]
    fn test_response_rounded_but_record_full_precision() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let building = Uuid::new_v4();

        let request = BaselineRequest::new(building)
            .with_months(months(&[100.0, 100.0, 101.0]))
            .with_period("2025-01");
        let response = service.calculate(&request).unwrap();

        assert_eq!(response.baseline_monthly_kwh, 100.33);
        let stored = db.most_recent_for(building, "2025-01").unwrap().unwrap();
        assert_ne!(stored.adjusted_kwh, 100.33);
        assert!((stored.adjusted_kwh - 301.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_uses_stored_readings_and_current_period() {
        let db = Database::open_in_memory().unwrap();
        let building = Uuid::new_v4();
        let readings: Vec<_> = (1..=12)
            .map(|m| {
                let time = Utc.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap();
                MeterReading::new(building, time, 500.0, ReadingSource::Csv)
            })
            .collect();
        db.insert_readings_batch(&readings).unwrap();

        let service = BaselineService::new(&db, &db);
        let response = service
            .calculate(&BaselineRequest::new(building).with_method("historical_12_months"))
            .unwrap();

        assert_eq!(response.baseline_monthly_kwh, 500.0);
        assert_eq!(response.sample_count, 12);
        assert_eq!(response.period, period_of(&Utc::now()));
    }

    #[test]
    fn test_no_readings_fails_without_record() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let building = Uuid::new_v4();

        let err = service.calculate(&BaselineRequest::new(building)).unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        assert!(service.history(building).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_period_rejected() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let request = BaselineRequest::new(Uuid::new_v4())
            .with_months(months(&[1.0]))
            .with_period("2025-1");
        assert!(matches!(service.calculate(&request), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_recalculation_appends_and_latest_wins() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let building = Uuid::new_v4();

        for value in [100.0, 250.0] {
            let request = BaselineRequest::new(building)
                .with_months(months(&[value]))
                .with_period("2025-01");
            service.calculate(&request).unwrap();
        }

        let history = service.history(building).unwrap();
        assert_eq!(history.len(), 2);
        let effective = db.most_recent_for(building, "2025-01").unwrap().unwrap();
        assert_eq!(effective.adjusted_kwh, 250.0);
    }

    #[test]
    fn test_from_config_applies_threshold_and_method() {
        let db = Database::open_in_memory().unwrap();
        let config = BaselineConfig {
            outlier_threshold_pct: 0.5,
            history_months: 6,
            default_method: "historical_6_months".to_string(),
        };
        let service = BaselineService::from_config(&db, &db, &config).unwrap();

        let request = BaselineRequest::new(Uuid::new_v4())
            .with_months(spike_months())
            .with_period("2025-01");
        let response = service.calculate(&request).unwrap();
        assert_eq!(response.baseline_monthly_kwh, 100.0);
        assert_eq!(response.raw_monthly_kwh, 175.0);
        assert_eq!(response.method, "historical_6_months");
    }

    #[test]
    fn test_manual_baseline() {
        let db = Database::open_in_memory().unwrap();
        let service = BaselineService::new(&db, &db);
        let building = Uuid::new_v4();

        let record = service.set_manual(building, "2025-04", 420.5).unwrap();
        assert_eq!(record.raw_kwh, 420.5);
        assert_eq!(record.adjusted_kwh, 420.5);
        assert_eq!(record.method, MANUAL_METHOD);

        assert!(service.set_manual(building, "April", 1.0).is_err());
        assert!(service.set_manual(building, "2025-04", -1.0).is_err());
        assert_eq!(service.history(building).unwrap().len(), 1);
    }
}
