//! Carbonexia MRV - Demo CLI
//!
//! Walks the whole pipeline against an in-memory database: seeds a year of
//! readings, calculates baselines, then estimates savings and credits.

use anyhow::{Context, Result};
use carbonexia_mrv_lib::baseline::{BaselineRequest, BaselineService};
use carbonexia_mrv_lib::core::{Building, EmissionFactor, FactorSource, MeterReading, ReadingSource};
use carbonexia_mrv_lib::db::Database;
use carbonexia_mrv_lib::mrv::{SavingsCalculator, SavingsOutcome};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

// Monthly kWh for 2025
const SCIENCE_TOWER_2025: [f64; 12] = [
    162000.0, 162000.0, 216000.0, 270000.0, 324000.0, 324000.0,
    270000.0, 243000.0, 216000.0, 189000.0, 162000.0, 162000.0,
];
const TECH_PARK_2025: [f64; 12] = [
    216000.0, 216000.0, 288000.0, 360000.0, 432000.0, 432000.0,
    360000.0, 324000.0, 288000.0, 252000.0, 216000.0, 216000.0,
];

fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .context("invalid demo timestamp")
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("==============================================");
    println!("   Carbonexia MRV - Demo");
    println!("==============================================\n");

    // 1. Seed database
    println!("[1/3] Seeding in-memory database...");
    let db = Database::open_in_memory()?;

    let science_tower = Building {
        id: Uuid::new_v4(),
        name: "Science Tower".to_string(),
        region_id: Some("US-CA".to_string()),
    };
    let tech_park = Building {
        id: Uuid::new_v4(),
        name: "Tech Park".to_string(),
        region_id: Some("IN-MH".to_string()),
    };
    db.insert_building(&science_tower)?;
    db.insert_building(&tech_park)?;

    for (building, data) in [(&science_tower, SCIENCE_TOWER_2025), (&tech_park, TECH_PARK_2025)] {
        let readings = data
            .iter()
            .enumerate()
            .filter_map(|(i, kwh)| {
                let time = Utc.with_ymd_and_hms(2025, i as u32 + 1, 1, 12, 0, 0).single()?;
                Some(MeterReading::new(building.id, time, *kwh, ReadingSource::Csv))
            })
            .collect::<Vec<_>>();
        db.insert_readings_batch(&readings)?;
    }

    // Only California publishes a 2026 factor; Tech Park falls back to the default
    db.upsert_emission_factor(&EmissionFactor {
        region_id: "US-CA".to_string(),
        region_name: "California".to_string(),
        year: 2026,
        factor_kg_per_kwh: 0.22,
        source: "EPA".to_string(),
    })?;
    println!("      {} readings stored\n", db.get_readings_count()?);

    // 2. Baselines
    println!("[2/3] Calculating baselines for 2026-01...");
    let baselines = BaselineService::new(&db, &db);
    for building in [&science_tower, &tech_park] {
        let request = BaselineRequest::new(building.id)
            .with_method("historical_12_months")
            .with_period("2026-01");
        let response = baselines.calculate(&request)?;
        println!(
            "      {:<14} baseline {:>10.2} kWh/month (raw {:.2}, {}/{} months kept{})",
            building.name,
            response.baseline_monthly_kwh,
            response.raw_monthly_kwh,
            response.retained_count,
            response.sample_count,
            if response.fallback_used { ", fallback" } else { "" }
        );
    }
    println!();

    // January 2026 consumption after efficiency work
    let january = utc(2026, 1, 15, 12, 0, 0)?;
    db.insert_readings_batch(&[
        MeterReading::new(science_tower.id, january, 180000.0, ReadingSource::Api),
        MeterReading::new(tech_park.id, january, 300000.0, ReadingSource::Api),
    ])?;

    // 3. Savings
    println!("[3/3] Estimating savings for January 2026...\n");
    println!("----------------------------------------------------------------------");
    println!("  Building       | Savings (kWh) | Factor  | CO2 (kg)   | Credits");
    println!("----------------------------------------------------------------------");

    let calculator = SavingsCalculator::new(&db, &db, &db, &db);
    let start = utc(2026, 1, 1, 0, 0, 0)?;
    let end = utc(2026, 1, 31, 23, 59, 59)?;

    for building in [&science_tower, &tech_park] {
        match calculator.calculate(building.id, start, end)? {
            SavingsOutcome::Computed(result) => {
                let marker = match result.factor_source {
                    FactorSource::Regional { .. } => "",
                    FactorSource::Default => " (default)",
                };
                println!(
                    "  {:<14} | {:>13.2} | {:>5.2}{} | {:>10.2} | {:>7.3}",
                    building.name,
                    result.savings_kwh,
                    result.emission_factor,
                    marker,
                    result.co2_saved_kg,
                    result.credits_estimated
                );
            }
            other => {
                println!("  {:<14} | {}", building.name, other.not_found_message().unwrap_or_default());
            }
        }
    }
    println!("----------------------------------------------------------------------\n");

    // A month without a baseline is reported, not raised
    let march = utc(2026, 3, 1, 0, 0, 0)?;
    let outcome = calculator.calculate(science_tower.id, march, march)?;
    if let Some(message) = outcome.not_found_message() {
        println!("  March 2026: {}", message);
    }

    println!("\n  Baseline history for {}:", science_tower.name);
    for record in baselines.history(science_tower.id)? {
        println!(
            "    #{} {} adjusted {:.2} raw {:.2} ({})",
            record.id, record.period, record.adjusted_kwh, record.raw_kwh, record.method
        );
    }

    println!("\n==============================================\n");
    Ok(())
}
