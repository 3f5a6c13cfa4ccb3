//! SQLite-backed alert, reading and sensor storage.
//!
//! One database file holds three tables: registered sensors, raised alerts,
//! and the raw reading time series.

use super::{AlertStore, ReadingStore, SensorRecord, SensorRegistry};
use crate::alert::AlertEvent;
use crate::reading::{Reading, ReadingData, Sensor};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const ALERT_TYPE: &str = "air_quality_alert";

const READING_COLUMNS: &str =
    "sensor_id, location, latitude, longitude, timestamp_ms, data";

/// Storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE sensors (
///     id TEXT PRIMARY KEY,
///     location TEXT NOT NULL,
///     latitude REAL NOT NULL,
///     longitude REAL NOT NULL,
///     status TEXT NOT NULL DEFAULT 'active',
///     created_at TEXT NOT NULL,           -- ISO 8601 timestamp
///     updated_at TEXT NOT NULL            -- ISO 8601 timestamp
/// );
///
/// CREATE TABLE air_quality_alerts (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     sensor_id TEXT NOT NULL,
///     location TEXT NOT NULL,
///     alert_type TEXT NOT NULL,
///     message TEXT NOT NULL,
///     severity TEXT NOT NULL,
///     pm25_value REAL NOT NULL,
///     timestamp TEXT NOT NULL,            -- ISO 8601 timestamp
///     resolved INTEGER NOT NULL DEFAULT 0
/// );
///
/// CREATE TABLE air_quality_readings (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     sensor_id TEXT NOT NULL,
///     location TEXT NOT NULL,
///     latitude REAL NOT NULL,
///     longitude REAL NOT NULL,
///     timestamp_ms INTEGER NOT NULL,      -- Unix epoch milliseconds
///     pm25 REAL NOT NULL, pm10 REAL NOT NULL, o3 REAL NOT NULL,
///     no2 REAL NOT NULL, co REAL NOT NULL, so2 REAL NOT NULL,
///     aqi INTEGER NOT NULL,
///     data TEXT NOT NULL                  -- JSON ReadingData
/// );
/// ```
///
/// Timestamps of readings are kept at millisecond precision.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates or opens a store at `db_path`
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;
        Self::init(conn)
    }

    /// In-memory store (tests, ephemeral runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sensors (
                id TEXT PRIMARY KEY,
                location TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS air_quality_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_id TEXT NOT NULL,
                location TEXT NOT NULL,
                alert_type TEXT NOT NULL,
                message TEXT NOT NULL,
                severity TEXT NOT NULL,
                pm25_value REAL NOT NULL,
                timestamp TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS air_quality_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sensor_id TEXT NOT NULL,
                location TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                pm25 REAL NOT NULL,
                pm10 REAL NOT NULL,
                o3 REAL NOT NULL,
                no2 REAL NOT NULL,
                co REAL NOT NULL,
                so2 REAL NOT NULL,
                aqi INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_sensor_time
                ON air_quality_readings(sensor_id, timestamp_ms);
            "#,
        )
        .context("Failed to create schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored alerts
    pub fn alert_count(&self) -> Result<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM air_quality_alerts", [], |row| row.get(0))
            .context("Failed to count alerts")
    }

    /// Number of stored readings
    pub fn reading_count(&self) -> Result<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM air_quality_readings", [], |row| row.get(0))
            .context("Failed to count readings")
    }

    /// Seed the registry when it is empty. Returns the number of sensors inserted.
    pub fn seed_sensors(&self, sensors: &[Sensor]) -> Result<usize> {
        let existing: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM sensors", [], |row| row.get(0))
            .context("Failed to count sensors")?;
        if existing > 0 {
            return Ok(0);
        }

        for sensor in sensors {
            self.upsert_sensor(sensor)?;
        }
        Ok(sensors.len())
    }

    fn reading_from_row(row: &Row<'_>) -> Result<Reading> {
        let sensor_id: String = row.get(0)?;
        let location: String = row.get(1)?;
        let latitude: f64 = row.get(2)?;
        let longitude: f64 = row.get(3)?;
        let timestamp_ms: i64 = row.get(4)?;
        let data: String = row.get(5)?;

        let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| anyhow!("Invalid reading timestamp {}", timestamp_ms))?;
        let data: ReadingData =
            serde_json::from_str(&data).context("Failed to parse reading data")?;

        Ok(Reading {
            sensor_id,
            location,
            coordinates: [latitude, longitude],
            timestamp,
            data,
        })
    }
}

impl AlertStore for SqliteStore {
    fn save_alert(&self, alert: &AlertEvent) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO air_quality_alerts (
                sensor_id, location, alert_type, message, severity, pm25_value, timestamp
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                alert.sensor_id,
                alert.location,
                ALERT_TYPE,
                alert.message,
                alert.severity.as_str(),
                alert.pm25_value,
                alert.timestamp.to_rfc3339(),
            ],
        )
        .context("Failed to store alert")?;

        Ok(conn.last_insert_rowid())
    }
}

impl ReadingStore for SqliteStore {
    fn save_reading(&self, sensor_id: &str, reading: &Reading) -> Result<()> {
        let data = serde_json::to_string(&reading.data).context("Failed to serialize reading")?;

        self.conn()
            .execute(
                r#"
                INSERT INTO air_quality_readings (
                    sensor_id, location, latitude, longitude, timestamp_ms,
                    pm25, pm10, o3, no2, co, so2, aqi, data
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    sensor_id,
                    reading.location,
                    reading.coordinates[0],
                    reading.coordinates[1],
                    reading.timestamp.timestamp_millis(),
                    reading.data.pm25,
                    reading.data.pm10,
                    reading.data.o3,
                    reading.data.no2,
                    reading.data.co,
                    reading.data.so2,
                    reading.data.aqi,
                    data,
                ],
            )
            .context("Failed to store reading")?;

        Ok(())
    }

    fn latest_per_sensor(&self) -> Result<Vec<Reading>> {
        let conn = self.conn();
        // Group by sensor, keep the row with the max timestamp (ties: newest insert)
        let sql = format!(
            r#"
            SELECT {columns} FROM air_quality_readings r
            WHERE r.id = (
                SELECT id FROM air_quality_readings
                WHERE sensor_id = r.sensor_id
                ORDER BY timestamp_ms DESC, id DESC
                LIMIT 1
            )
            ORDER BY sensor_id
            "#,
            columns = READING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
        let mut rows = stmt.query([]).context("Failed to execute query")?;

        let mut readings = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            readings.push(Self::reading_from_row(row)?);
        }
        Ok(readings)
    }

    fn latest_for(&self, sensor_id: &str) -> Result<Option<Reading>> {
        let conn = self.conn();
        let sql = format!(
            r#"
            SELECT {columns} FROM air_quality_readings
            WHERE sensor_id = ?1
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT 1
            "#,
            columns = READING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
        let mut rows = stmt
            .query(params![sensor_id])
            .context("Failed to execute query")?;

        match rows.next().context("Failed to read row")? {
            Some(row) => Ok(Some(Self::reading_from_row(row)?)),
            None => Ok(None),
        }
    }
}

impl SensorRegistry for SqliteStore {
    fn upsert_sensor(&self, sensor: &Sensor) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                r#"
                INSERT INTO sensors (id, location, latitude, longitude, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    location = excluded.location,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude,
                    updated_at = excluded.updated_at
                "#,
                params![sensor.id, sensor.location, sensor.lat(), sensor.lon(), now, now],
            )
            .context("Failed to store sensor")?;

        Ok(())
    }

    fn list_sensors(&self) -> Result<Vec<SensorRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, location, latitude, longitude, status, updated_at FROM sensors ORDER BY id",
            )
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to execute query")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read results")?;

        rows.into_iter()
            .map(|(id, location, lat, lon, status, updated_at)| -> Result<SensorRecord> {
                let last_update = DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .context("Failed to parse updated_at timestamp")?;
                Ok(SensorRecord {
                    id,
                    location,
                    coordinates: [lat, lon],
                    status,
                    last_update,
                })
            })
            .collect()
    }
}
