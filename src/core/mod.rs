//! Core module - Configuration, error taxonomy, and common types

mod config;
mod error;
mod types;

pub use config::{BaselineConfig, Config, GeneralConfig, MrvConfig};
pub use error::{Error, Result};
pub use types::{
    mean_kwh, parse_period, period_of, round2, BaselineRecord, Building, EmissionFactor,
    FactorSource, MeterReading, MonthSample, NewBaselineRecord, ReadingSource, SavingsResult,
    PERIOD_FORMAT,
};
