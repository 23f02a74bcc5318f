use crate::error::{ProcessingError, Result};
use crate::models::{PartitionKey, StoreManifest};
use crate::utils::constants::{
    AQI_EXCEEDANCE_THRESHOLD, BASE_RELATION, VIEW_DAILY_AVERAGES, VIEW_HIGH_POLLUTION,
    VIEW_MONTHLY_SUMMARY, VIEW_STATION_METADATA,
};
use duckdb::Connection;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub row_count: u64,
    pub views_created: Vec<String>,
    pub views_failed: Vec<String>,
    pub files_loaded: usize,
    pub partitions: Vec<PartitionKey>,
    pub database_path: PathBuf,
    pub database_bytes: u64,
    pub elapsed_seconds: f64,
}

impl LoadSummary {
    pub fn summary(&self) -> String {
        format!(
            "Load Summary:\n\
            - Relation rows: {}\n\
            - Files loaded: {} across {} partitions\n\
            - Views created: {}\n\
            - Views failed: {}\n\
            - Database: {} ({:.2} MB)\n\
            - Elapsed: {:.2}s",
            self.row_count,
            self.files_loaded,
            self.partitions.len(),
            display_list(&self.views_created),
            display_list(&self.views_failed),
            self.database_path.display(),
            self.database_bytes as f64 / 1_048_576.0,
            self.elapsed_seconds
        )
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Named aggregate views created over the base relation, in creation order.
pub fn view_definitions() -> Vec<(&'static str, String)> {
    vec![
        (
            VIEW_DAILY_AVERAGES,
            format!(
                "CREATE VIEW {VIEW_DAILY_AVERAGES} AS
                SELECT
                    DATE_TRUNC('day', date) AS date,
                    sitename,
                    county,
                    AVG(aqi) AS avg_aqi,
                    AVG(pm2_5) AS avg_pm25,
                    AVG(pm10) AS avg_pm10,
                    AVG(o3) AS avg_o3,
                    COUNT(*) AS measurement_count
                FROM {BASE_RELATION}
                GROUP BY DATE_TRUNC('day', date), sitename, county"
            ),
        ),
        (
            VIEW_MONTHLY_SUMMARY,
            format!(
                "CREATE VIEW {VIEW_MONTHLY_SUMMARY} AS
                SELECT
                    year,
                    MONTH(date) AS month,
                    county,
                    AVG(aqi) AS avg_aqi,
                    MAX(aqi) AS max_aqi,
                    MIN(aqi) AS min_aqi,
                    AVG(pm2_5) AS avg_pm25,
                    COUNT(*) AS measurement_count,
                    COUNT(DISTINCT sitename) AS station_count
                FROM {BASE_RELATION}
                GROUP BY year, MONTH(date), county"
            ),
        ),
        (
            VIEW_HIGH_POLLUTION,
            format!(
                "CREATE VIEW {VIEW_HIGH_POLLUTION} AS
                SELECT date, sitename, county, aqi, pollutant, status, pm2_5, pm10, o3
                FROM {BASE_RELATION}
                WHERE aqi > {AQI_EXCEEDANCE_THRESHOLD}
                ORDER BY aqi DESC"
            ),
        ),
        (
            VIEW_STATION_METADATA,
            format!(
                "CREATE VIEW {VIEW_STATION_METADATA} AS
                SELECT
                    sitename,
                    county,
                    siteid,
                    longitude,
                    latitude,
                    MIN(date) AS first_measurement,
                    MAX(date) AS last_measurement
                FROM {BASE_RELATION}
                GROUP BY sitename, county, siteid, longitude, latitude"
            ),
        ),
    ]
}

/// Bulk-loads a Parquet store into a fresh DuckDB database file.
pub struct StoreLoader {
    store_root: PathBuf,
    database_path: PathBuf,
}

impl StoreLoader {
    pub fn new(store_root: &Path, database_path: &Path) -> Self {
        Self {
            store_root: store_root.to_path_buf(),
            database_path: database_path.to_path_buf(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Discover the store's files and load them.
    pub fn load(&self) -> Result<LoadSummary> {
        let manifest = StoreManifest::discover(&self.store_root)?;
        self.load_manifest(&manifest)
    }

    /// Load exactly the files named by `manifest` in one statement, then create the views.
    pub fn load_manifest(&self, manifest: &StoreManifest) -> Result<LoadSummary> {
        let start = Instant::now();
        if manifest.is_empty() {
            return Err(ProcessingError::NoData(manifest.root().to_path_buf()));
        }

        info!(
            files = manifest.len(),
            database = %self.database_path.display(),
            "loading store into database"
        );

        self.remove_previous_database()?;
        if let Some(parent) = self.database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (row_count, views_created, views_failed) = {
            let conn = Connection::open(&self.database_path)?;

            let sql = format!(
                "CREATE TABLE {BASE_RELATION} AS SELECT * FROM read_parquet({}, union_by_name = true)",
                file_list_literal(manifest)
            );
            conn.execute_batch(&sql)?;

            let row_count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {BASE_RELATION}"), [], |row| {
                    row.get(0)
                })?;

            let (created, failed) = create_views(&conn);
            (row_count.max(0) as u64, created, failed)
        };

        let summary = LoadSummary {
            row_count,
            views_created,
            views_failed,
            files_loaded: manifest.len(),
            partitions: manifest.partitions().into_iter().collect(),
            database_path: self.database_path.clone(),
            database_bytes: fs::metadata(&self.database_path)?.len(),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };

        info!(
            rows = summary.row_count,
            views = summary.views_created.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "database load finished"
        );

        Ok(summary)
    }

    fn remove_previous_database(&self) -> Result<()> {
        let mut wal = self.database_path.clone().into_os_string();
        wal.push(".wal");

        for path in [self.database_path.clone(), PathBuf::from(wal)] {
            if path.exists() {
                debug!(path = %path.display(), "removing previous database file");
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Create each view independently; a failing view is logged and skipped.
fn create_views(conn: &Connection) -> (Vec<String>, Vec<String>) {
    let mut created = Vec::new();
    let mut failed = Vec::new();

    for (name, sql) in view_definitions() {
        match conn.execute_batch(&sql) {
            Ok(()) => {
                debug!(view = name, "created view");
                created.push(name.to_string());
            }
            Err(e) => {
                warn!(view = name, error = %e, "failed to create view");
                failed.push(name.to_string());
            }
        }
    }

    (created, failed)
}

/// `['a.parquet', 'b.parquet']` with quotes escaped.
fn file_list_literal(manifest: &StoreManifest) -> String {
    let quoted: Vec<String> = manifest
        .entries()
        .iter()
        .map(|entry| format!("'{}'", entry.path.to_string_lossy().replace('\'', "''")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::StreamingConverter;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn convert(contents: &str, output: &Path) -> Result<()> {
        let mut source = NamedTempFile::new()?;
        source.write_all(contents.as_bytes())?;
        source.flush()?;
        StreamingConverter::new(source.path(), output, 100)?.convert(None)?;
        Ok(())
    }

    const FULL_HEADER: &str = "date,sitename,county,aqi,pollutant,status,so2,co,o3,o3_8hr,pm10,pm2.5,no2,nox,no,windspeed,winddirec,unit,co_8hr,pm2.5_avg,pm10_avg,so2_avg,longitude,latitude,siteid";

    #[test]
    fn test_load_creates_relation_and_views() -> Result<()> {
        let output = TempDir::new()?;
        let source = format!(
            "{FULL_HEADER}\n\
             2023-12-31 23:00,Keelung,Keelung City,150,PM2.5,Unhealthy,1,0.2,30,28,80,60,10,12,2,1.5,90,,0.3,55,70,1,121.76,25.13,1\n\
             2024-01-01 00:00,Keelung,Keelung City,40,,Good,1,0.2,30,28,20,10,10,12,2,1.5,90,,0.3,9,18,1,121.76,25.13,1\n\
             2024-01-01 01:00,Xizhi,New Taipei City,55,O3,Moderate,1,0.2,60,50,25,12,10,12,2,1.5,90,,0.3,11,22,1,121.66,25.07,2\n"
        );
        convert(&source, output.path())?;

        let db_path = output.path().join("air_quality.duckdb");
        let summary = StoreLoader::new(output.path(), &db_path).load()?;

        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.files_loaded, 2);
        assert_eq!(
            summary.views_created,
            vec![
                "daily_averages",
                "monthly_summary",
                "high_pollution_events",
                "station_metadata"
            ]
        );
        assert!(summary.views_failed.is_empty());
        assert!(db_path.exists());

        let conn = Connection::open(&db_path)?;
        let high: i64 = conn.query_row("SELECT COUNT(*) FROM high_pollution_events", [], |r| r.get(0))?;
        assert_eq!(high, 1);
        let stations: i64 = conn.query_row("SELECT COUNT(*) FROM station_metadata", [], |r| r.get(0))?;
        assert_eq!(stations, 2);
        Ok(())
    }

    #[test]
    fn test_view_failure_does_not_abort_load() -> Result<()> {
        let output = TempDir::new()?;
        convert(
            "date,sitename,county,aqi,siteid,longitude,latitude\n\
             2024-01-01 00:00,Keelung,Keelung City,40,1,121.76,25.13\n",
            output.path(),
        )?;

        let db_path = output.path().join("air_quality.duckdb");
        let summary = StoreLoader::new(output.path(), &db_path).load()?;

        assert_eq!(summary.row_count, 1);
        assert_eq!(summary.views_created, vec!["station_metadata"]);
        assert_eq!(summary.views_failed.len(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_store_is_no_data() {
        let output = TempDir::new().unwrap();
        let result = StoreLoader::new(output.path(), &output.path().join("db.duckdb")).load();
        assert!(matches!(result, Err(ProcessingError::NoData(_))));
    }

    #[test]
    fn test_reload_replaces_database() -> Result<()> {
        let output = TempDir::new()?;
        convert("date,aqi\n2024-01-01 00:00,1\n2024-01-01 01:00,2\n", output.path())?;
        let db_path = output.path().join("air_quality.duckdb");

        let loader = StoreLoader::new(output.path(), &db_path);
        assert_eq!(loader.load()?.row_count, 2);
        assert_eq!(loader.load()?.row_count, 2);
        Ok(())
    }

    #[test]
    fn test_file_list_escapes_quotes() {
        let manifest = StoreManifest::from_entries(
            "/store",
            vec![crate::models::ManifestEntry {
                partition: PartitionKey::Year(2024),
                path: PathBuf::from("/store/it's/part-000000.parquet"),
            }],
        );
        assert_eq!(
            file_list_literal(&manifest),
            "['/store/it''s/part-000000.parquet']"
        );
    }
}
