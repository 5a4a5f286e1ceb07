//! Database module backing every collaborator interface
//!
//! Uses SQLite for local storage of:
//! - Buildings (only the fields the engine reads)
//! - Meter readings
//! - Emission factors by region and year
//! - Baseline history (append-only)

use crate::core::{
    BaselineRecord, Building, EmissionFactor, Error, MeterReading, NewBaselineRecord,
    ReadingSource, Result,
};
use crate::store::{BaselineStore, BuildingLookup, EmissionFactorLookup, ReadingStore};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

/// Database manager
pub struct Database {
    conn: Connection,
}

const BASELINE_COLUMNS: &str = "id, building_id, period, raw_kwh, adjusted_kwh, weather_factor, occupancy_factor, method, created_at";

impl Database {
    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        log::debug!("Opened database at {}", path.display());

        let db = Self { conn };
        db.init_schema()?;

        Ok(db)
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS buildings (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                region_id TEXT
            );

            -- One reading per building and instant, timestamp in unix microseconds
            CREATE TABLE IF NOT EXISTS meter_readings (
                building_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                value_kwh REAL NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (timestamp, building_id)
            );

            CREATE TABLE IF NOT EXISTS emission_factors (
                region_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                region_name TEXT NOT NULL,
                factor_kg_per_kwh REAL NOT NULL,
                source TEXT NOT NULL,
                PRIMARY KEY (region_id, year)
            );

            -- Never updated or deleted
            CREATE TABLE IF NOT EXISTS baseline_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                building_id TEXT NOT NULL,
                period TEXT NOT NULL,
                raw_kwh REAL NOT NULL,
                adjusted_kwh REAL NOT NULL,
                weather_factor REAL NOT NULL DEFAULT 1.0,
                occupancy_factor REAL NOT NULL DEFAULT 1.0,
                method TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_building_time ON meter_readings(building_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_baseline_building_period ON baseline_history(building_id, period);
            "#,
        )?;

        Ok(())
    }

    /// Insert or replace a building
    pub fn insert_building(&self, building: &Building) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO buildings (id, name, region_id) VALUES (?1, ?2, ?3)
               ON CONFLICT(id) DO UPDATE SET name = ?2, region_id = ?3"#,
            params![building.id.to_string(), building.name, building.region_id],
        )?;
        Ok(())
    }

    /// Insert or update the factor for a region and year
    pub fn upsert_emission_factor(&self, factor: &EmissionFactor) -> Result<()> {
        self.conn.execute(
            r#"INSERT INTO emission_factors (region_id, year, region_name, factor_kg_per_kwh, source)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(region_id, year) DO UPDATE SET
                   region_name = ?3,
                   factor_kg_per_kwh = ?4,
                   source = ?5"#,
            params![
                factor.region_id,
                factor.year,
                factor.region_name,
                factor.factor_kg_per_kwh,
                factor.source
            ],
        )?;
        Ok(())
    }

    /// Append a batch of readings atomically: either all land or none do
    pub fn insert_readings_batch(&self, readings: &[MeterReading]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO meter_readings (building_id, timestamp, value_kwh, source) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for reading in readings {
                stmt.execute(params![
                    reading.building_id.to_string(),
                    reading.time.timestamp_micros(),
                    reading.value_kwh,
                    reading.source.as_str()
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("Inserted batch of {} meter readings", readings.len());
        Ok(readings.len())
    }

    /// Get total readings count
    pub fn get_readings_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM meter_readings", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ReadingStore for Database {
    fn fetch_recent(&self, building_id: Uuid, limit: usize) -> Result<Vec<MeterReading>> {
        let limit = i64::try_from(limit)
            .map_err(|_| Error::InvalidInput(format!("reading limit {} is too large", limit)))?;

        let mut stmt = self.conn.prepare(
            "SELECT building_id, timestamp, value_kwh, source
             FROM meter_readings
             WHERE building_id = ?1
             ORDER BY timestamp DESC
             LIMIT ?2",
        )?;

        let readings = stmt
            .query_map(params![building_id.to_string(), limit], reading_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(readings)
    }

    fn sum_in_range(&self, building_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<f64> {
        let total: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(value_kwh), 0.0)
             FROM meter_readings
             WHERE building_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3",
            params![building_id.to_string(), start.timestamp_micros(), end.timestamp_micros()],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

impl BaselineStore for Database {
    fn append(&self, record: NewBaselineRecord) -> Result<BaselineRecord> {
        let created_at = Utc::now();

        self.conn.execute(
            "INSERT INTO baseline_history
                (building_id, period, raw_kwh, adjusted_kwh, weather_factor, occupancy_factor, method, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.building_id.to_string(),
                record.period,
                record.raw_kwh,
                record.adjusted_kwh,
                record.weather_factor,
                record.occupancy_factor,
                record.method,
                created_at.timestamp_millis()
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        // Read back so the caller sees exactly what was stored
        let stored = self.conn.query_row(
            &format!("SELECT {} FROM baseline_history WHERE id = ?1", BASELINE_COLUMNS),
            params![id],
            baseline_from_row,
        )?;
        Ok(stored)
    }

    fn most_recent_for(&self, building_id: Uuid, period: &str) -> Result<Option<BaselineRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM baseline_history
                     WHERE building_id = ?1 AND period = ?2
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    BASELINE_COLUMNS
                ),
                params![building_id.to_string(), period],
                baseline_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn all_for(&self, building_id: Uuid) -> Result<Vec<BaselineRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM baseline_history WHERE building_id = ?1 ORDER BY created_at ASC, id ASC",
            BASELINE_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![building_id.to_string()], baseline_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

impl EmissionFactorLookup for Database {
    fn by_region_year(&self, region_id: &str, year: i32) -> Result<Option<EmissionFactor>> {
        let factor = self
            .conn
            .query_row(
                "SELECT region_id, year, region_name, factor_kg_per_kwh, source
                 FROM emission_factors WHERE region_id = ?1 AND year = ?2",
                params![region_id, year],
                |row| {
                    Ok(EmissionFactor {
                        region_id: row.get(0)?,
                        year: row.get(1)?,
                        region_name: row.get(2)?,
                        factor_kg_per_kwh: row.get(3)?,
                        source: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(factor)
    }
}

impl BuildingLookup for Database {
    fn by_id(&self, building_id: Uuid) -> Result<Option<Building>> {
        let building = self
            .conn
            .query_row(
                "SELECT id, name, region_id FROM buildings WHERE id = ?1",
                params![building_id.to_string()],
                |row| {
                    Ok(Building {
                        id: uuid_column(row, 0)?,
                        name: row.get(1)?,
                        region_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(building)
    }
}

fn reading_from_row(row: &Row) -> rusqlite::Result<MeterReading> {
    let micros: i64 = row.get(1)?;
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    let time = Utc
        .timestamp_opt(micros.div_euclid(1_000_000), nanos)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(1, micros))?;
    let source: String = row.get(3)?;
    let source = ReadingSource::parse(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown reading source '{}'", source).into(),
        )
    })?;

    Ok(MeterReading {
        building_id: uuid_column(row, 0)?,
        time,
        value_kwh: row.get(2)?,
        source,
    })
}

fn baseline_from_row(row: &Row) -> rusqlite::Result<BaselineRecord> {
    let millis: i64 = row.get(8)?;
    let created_at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(8, millis))?;

    Ok(BaselineRecord {
        id: row.get(0)?,
        building_id: uuid_column(row, 1)?,
        period: row.get(2)?,
        raw_kwh: row.get(3)?,
        adjusted_kwh: row.get(4)?,
        weather_factor: row.get(5)?,
        occupancy_factor: row.get(6)?,
        method: row.get(7)?,
        created_at,
    })
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
