use crate::error::{ProcessingError, Result};
use crate::utils::constants::{BASE_RELATION, VIEW_STATION_METADATA};
use duckdb::{params, AccessMode, Config, Connection};
use serde::Serialize;
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationInfo {
    pub sitename: Option<String>,
    pub county: Option<String>,
    pub siteid: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub first_measurement: Option<String>,
    pub last_measurement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub county: Option<String>,
    pub total_measurements: u64,
    pub avg_aqi: Option<f64>,
    pub max_aqi: Option<f64>,
    pub min_aqi: Option<f64>,
    pub avg_pm25: Option<f64>,
    pub avg_pm10: Option<f64>,
    pub avg_o3: Option<f64>,
}

/// Read-side access to a loaded database.
pub struct AirQualityDatabase {
    conn: Connection,
}

impl AirQualityDatabase {
    pub fn open_read_only(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ProcessingError::SourceNotFound(path.to_path_buf()));
        }
        let config = Config::default().access_mode(AccessMode::ReadOnly)?;
        Ok(Self {
            conn: Connection::open_with_flags(path, config)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {BASE_RELATION}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn view_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ? AND table_type = 'VIEW'",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column names of the base relation, in table order.
    pub fn column_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map(params![BASE_RELATION], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Earliest and latest timestamps, formatted `YYYY-MM-DD HH:MM:SS`.
    pub fn date_range(&self) -> Result<Option<(String, String)>> {
        let (min, max): (Option<String>, Option<String>) = self.conn.query_row(
            &format!(
                "SELECT strftime(MIN(date), '{TIMESTAMP_FORMAT}'), strftime(MAX(date), '{TIMESTAMP_FORMAT}') FROM {BASE_RELATION}"
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max))
    }

    pub fn station_list(&self) -> Result<Vec<StationInfo>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sitename, county, CAST(siteid AS DOUBLE), CAST(longitude AS DOUBLE), CAST(latitude AS DOUBLE),
                    strftime(first_measurement, '{TIMESTAMP_FORMAT}'), strftime(last_measurement, '{TIMESTAMP_FORMAT}')
             FROM {VIEW_STATION_METADATA}
             ORDER BY sitename, county"
        ))?;
        let stations = stmt
            .query_map([], |row| {
                Ok(StationInfo {
                    sitename: row.get(0)?,
                    county: row.get(1)?,
                    siteid: row.get(2)?,
                    longitude: row.get(3)?,
                    latitude: row.get(4)?,
                    first_measurement: row.get(5)?,
                    last_measurement: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stations)
    }

    /// Per-county measurement summary, optionally restricted to one county.
    pub fn region_summary(&self, county: Option<&str>) -> Result<Vec<RegionSummary>> {
        let where_clause = if county.is_some() { "WHERE county = ?" } else { "" };
        let sql = format!(
            "SELECT county, COUNT(*),
                    CAST(AVG(aqi) AS DOUBLE), CAST(MAX(aqi) AS DOUBLE), CAST(MIN(aqi) AS DOUBLE),
                    CAST(AVG(pm2_5) AS DOUBLE), CAST(AVG(pm10) AS DOUBLE), CAST(AVG(o3) AS DOUBLE)
             FROM {BASE_RELATION}
             {where_clause}
             GROUP BY county
             ORDER BY county"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let map_row = |row: &duckdb::Row<'_>| {
            Ok(RegionSummary {
                county: row.get(0)?,
                total_measurements: row.get::<_, i64>(1)?.max(0) as u64,
                avg_aqi: row.get(2)?,
                max_aqi: row.get(3)?,
                min_aqi: row.get(4)?,
                avg_pm25: row.get(5)?,
                avg_pm10: row.get(6)?,
                avg_o3: row.get(7)?,
            })
        };
        let rows = match county {
            Some(county) => stmt
                .query_map(params![county], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Rows in one year partition; `None` counts the rows with no valid timestamp.
    pub fn partition_rows(&self, year: Option<i32>) -> Result<u64> {
        let count: i64 = match year {
            Some(year) => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {BASE_RELATION} WHERE year = ?"),
                params![year],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {BASE_RELATION} WHERE year IS NULL"),
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count.max(0) as u64)
    }
}
