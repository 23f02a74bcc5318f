use crate::database::AirQualityDatabase;
use crate::error::{ProcessingError, Result};
use crate::models::{SchemaPolicy, StoreManifest};
use crate::processors::{BatchBuilder, Representations};
use crate::readers::{numeric_values, string_values, SourceReader, StoreReader};
use crate::utils::constants::{BASE_RELATION, DEFAULT_SAMPLE_ROWS};
use crate::utils::stats::ratio;
use arrow::array::{Array, AsArray};
use arrow::datatypes::TimestampMicrosecondType;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileSizes {
    pub flat_bytes: Option<u64>,
    pub store_bytes: Option<u64>,
    pub relation_bytes: Option<u64>,
    pub compression_ratio: Option<f64>,
    pub space_saved_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadTimings {
    pub sample_rows: usize,
    pub flat_seconds: Option<f64>,
    pub flat_rows: Option<usize>,
    pub store_seconds: Option<f64>,
    pub store_rows: Option<usize>,
    pub relation_seconds: Option<f64>,
    pub relation_rows: Option<usize>,
    pub store_load_speedup: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryTimings {
    pub query_start: Option<NaiveDate>,
    pub query_end: Option<NaiveDate>,
    pub store_seconds: Option<f64>,
    pub store_groups: Option<usize>,
    pub relation_seconds: Option<f64>,
    pub relation_groups: Option<usize>,
    pub relation_query_speedup: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub sizes: FileSizes,
    pub load: LoadTimings,
    pub query: QueryTimings,
}

/// Measures size, sample-load latency and one aggregation across the representations.
pub struct PerformanceBenchmark {
    representations: Representations,
    sample_rows: usize,
    query_start: NaiveDate,
    query_end: NaiveDate,
}

impl PerformanceBenchmark {
    pub fn new(representations: Representations) -> Self {
        Self {
            representations,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            query_start: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap_or_default(),
            query_end: NaiveDate::from_ymd_opt(2024, 8, 31).unwrap_or_default(),
        }
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows.max(1);
        self
    }

    /// Inclusive date window for the aggregation query.
    pub fn with_query_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.query_start = start;
        self.query_end = end;
        self
    }

    /// Run every measurement. Individual failures are logged and left out.
    pub fn run(&self) -> BenchmarkReport {
        info!("starting benchmark");
        let report = BenchmarkReport {
            sizes: self.measure_sizes(),
            load: self.measure_load(),
            query: self.measure_query(),
        };
        info!("benchmark finished");
        report
    }

    pub fn measure_sizes(&self) -> FileSizes {
        let flat_bytes = measured("flat file size", || {
            Ok(fs::metadata(&self.representations.source)?.len())
        });
        let store_bytes = measured("store size", || {
            let manifest = self.manifest()?;
            manifest.total_bytes()
        });
        let relation_bytes = measured("database size", || {
            Ok(fs::metadata(&self.representations.database)?.len())
        });

        let (compression_ratio, space_saved_percent) = match (flat_bytes, store_bytes) {
            (Some(flat), Some(store)) if flat > 0 => (
                ratio(flat as f64, store as f64),
                Some((flat as f64 - store as f64) / flat as f64 * 100.0),
            ),
            _ => (None, None),
        };

        FileSizes {
            flat_bytes,
            store_bytes,
            relation_bytes,
            compression_ratio,
            space_saved_percent,
        }
    }

    pub fn measure_load(&self) -> LoadTimings {
        let flat = measured("flat file load", || timed(|| self.load_flat_sample()));
        let store = measured("store load", || timed(|| self.load_store_sample()));
        let relation = measured("relation load", || timed(|| self.load_relation_sample()));

        let store_load_speedup = match (flat, store) {
            (Some((flat_secs, _)), Some((store_secs, _))) => ratio(flat_secs, store_secs),
            _ => None,
        };

        LoadTimings {
            sample_rows: self.sample_rows,
            flat_seconds: flat.map(|m| m.0),
            flat_rows: flat.map(|m| m.1),
            store_seconds: store.map(|m| m.0),
            store_rows: store.map(|m| m.1),
            relation_seconds: relation.map(|m| m.0),
            relation_rows: relation.map(|m| m.1),
            store_load_speedup,
        }
    }

    pub fn measure_query(&self) -> QueryTimings {
        let store = measured("store query", || timed(|| self.query_store()));
        let relation = measured("relation query", || timed(|| self.query_relation()));

        let relation_query_speedup = match (store, relation) {
            (Some((store_secs, _)), Some((relation_secs, _))) => ratio(store_secs, relation_secs),
            _ => None,
        };

        QueryTimings {
            query_start: Some(self.query_start),
            query_end: Some(self.query_end),
            store_seconds: store.map(|m| m.0),
            store_groups: store.map(|m| m.1),
            relation_seconds: relation.map(|m| m.0),
            relation_groups: relation.map(|m| m.1),
            relation_query_speedup,
        }
    }

    fn manifest(&self) -> Result<StoreManifest> {
        let manifest = StoreManifest::discover(&self.representations.store_root)?;
        if manifest.is_empty() {
            return Err(ProcessingError::NoData(manifest.root().to_path_buf()));
        }
        Ok(manifest)
    }

    /// Parse and cast the first rows of the flat file the way the converter does.
    fn load_flat_sample(&self) -> Result<usize> {
        let mut chunks = SourceReader::new(self.sample_rows).open(&self.representations.source)?;
        let schema = SchemaPolicy::default().resolve(chunks.header());
        let builder = BatchBuilder::new(schema);
        match chunks.next() {
            Some(chunk) => Ok(builder.build(&chunk?.records)?.total_rows()),
            None => Ok(0),
        }
    }

    fn load_store_sample(&self) -> Result<usize> {
        let manifest = self.manifest()?;
        let batches = StoreReader::new(&manifest).read_head(self.sample_rows)?;
        Ok(batches.iter().map(|b| b.num_rows()).sum())
    }

    fn load_relation_sample(&self) -> Result<usize> {
        let db = AirQualityDatabase::open_read_only(&self.representations.database)?;
        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT * FROM {BASE_RELATION} LIMIT {}", self.sample_rows))?;
        let mut rows = stmt.query([])?;

        let mut count = 0usize;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.clear();
            for i in 0..row.as_ref().column_count() {
                values.push(row.get::<_, duckdb::types::Value>(i)?);
            }
            count += 1;
        }
        Ok(count)
    }

    /// Mean aqi per county over the window, computed in process from a projected scan.
    fn query_store(&self) -> Result<usize> {
        let manifest = self.manifest()?;
        let (start, end) = self.window_micros()?;
        let mut groups: BTreeMap<Option<String>, (f64, u64)> = BTreeMap::new();

        StoreReader::new(&manifest).scan(Some(&["date", "county", "aqi"]), |_, batch| {
            let (Some(date), Some(county), Some(aqi)) = (
                batch.column_by_name("date"),
                batch.column_by_name("county"),
                batch.column_by_name("aqi"),
            ) else {
                return Ok(());
            };
            let dates = date.as_primitive_opt::<TimestampMicrosecondType>().ok_or_else(|| {
                ProcessingError::InvalidFormat(format!(
                    "date column has type {}",
                    date.data_type()
                ))
            })?;
            let counties = string_values(county)?;
            let aqi = numeric_values(aqi)?;

            for i in 0..batch.num_rows() {
                if dates.is_null(i) {
                    continue;
                }
                let ts = dates.value(i);
                if ts < start || ts >= end {
                    continue;
                }
                let entry = groups.entry(counties[i].clone()).or_insert((0.0, 0));
                if let Some(v) = aqi[i] {
                    entry.0 += v;
                    entry.1 += 1;
                }
            }
            Ok(())
        })?;

        let means: BTreeMap<_, _> = groups
            .into_iter()
            .map(|(county, (sum, n))| (county, if n > 0 { Some(sum / n as f64) } else { None }))
            .collect();
        Ok(means.len())
    }

    fn query_relation(&self) -> Result<usize> {
        let db = AirQualityDatabase::open_read_only(&self.representations.database)?;
        let end_exclusive = self.end_exclusive()?;
        let sql = format!(
            "SELECT county, AVG(aqi) AS avg_aqi
             FROM {BASE_RELATION}
             WHERE date >= TIMESTAMP '{} 00:00:00' AND date < TIMESTAMP '{} 00:00:00'
             GROUP BY county",
            self.query_start, end_exclusive
        );
        let mut stmt = db.connection().prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<f64>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.len())
    }

    fn end_exclusive(&self) -> Result<NaiveDate> {
        self.query_end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ProcessingError::Config(format!("query end {} out of range", self.query_end)))
    }

    fn window_micros(&self) -> Result<(i64, i64)> {
        let start = self.query_start.and_hms_opt(0, 0, 0);
        let end = self.end_exclusive()?.and_hms_opt(0, 0, 0);
        match (start, end) {
            (Some(start), Some(end)) => Ok((
                start.and_utc().timestamp_micros(),
                end.and_utc().timestamp_micros(),
            )),
            _ => Err(ProcessingError::Config("invalid query window".to_string())),
        }
    }

    pub fn generate_report(&self, report: &BenchmarkReport) -> String {
        let rule = "=".repeat(80);
        let thin = "-".repeat(80);
        let mb = |bytes: u64| bytes as f64 / 1_048_576.0;
        let mut lines = vec![
            rule.clone(),
            "AIR QUALITY DATA FORMAT PERFORMANCE REPORT".to_string(),
            rule.clone(),
            String::new(),
            "FILE SIZES".to_string(),
            thin.clone(),
        ];

        let sizes = &report.sizes;
        if let Some(b) = sizes.flat_bytes {
            lines.push(format!("Flat file:        {:>10.2} MB", mb(b)));
        }
        if let Some(b) = sizes.store_bytes {
            lines.push(format!("Parquet store:    {:>10.2} MB", mb(b)));
        }
        if let Some(b) = sizes.relation_bytes {
            lines.push(format!("Database:         {:>10.2} MB", mb(b)));
        }
        if let (Some(r), Some(p)) = (sizes.compression_ratio, sizes.space_saved_percent) {
            lines.push(format!("Compression:      {:>10.2}x", r));
            lines.push(format!("Space Saved:      {:>10.1}%", p));
        }
        lines.push(String::new());

        let load = &report.load;
        lines.push(format!("LOAD PERFORMANCE (first {} rows)", load.sample_rows));
        lines.push(thin.clone());
        if let Some(s) = load.flat_seconds {
            lines.push(format!("Flat file:        {:>10.3} seconds", s));
        }
        if let Some(s) = load.store_seconds {
            lines.push(format!("Parquet store:    {:>10.3} seconds", s));
        }
        if let Some(s) = load.relation_seconds {
            lines.push(format!("Database:         {:>10.3} seconds", s));
        }
        if let Some(x) = load.store_load_speedup {
            lines.push(format!("Speedup:          {:>10.2}x", x));
        }
        lines.push(String::new());

        let query = &report.query;
        match (query.query_start, query.query_end) {
            (Some(start), Some(end)) => lines.push(format!(
                "QUERY PERFORMANCE (mean aqi by county, {} to {})",
                start, end
            )),
            _ => lines.push("QUERY PERFORMANCE (mean aqi by county)".to_string()),
        }
        lines.push(thin);
        if let Some(s) = query.store_seconds {
            lines.push(format!("Parquet store:    {:>10.3} seconds", s));
        }
        if let Some(s) = query.relation_seconds {
            lines.push(format!("Database:         {:>10.3} seconds", s));
        }
        if let Some(x) = query.relation_query_speedup {
            lines.push(format!("Speedup:          {:>10.2}x", x));
        }
        lines.push(String::new());
        lines.push(rule);

        lines.join("\n")
    }
}

fn timed<T>(f: impl FnOnce() -> Result<T>) -> Result<(f64, T)> {
    let start = Instant::now();
    let value = f()?;
    Ok((start.elapsed().as_secs_f64(), value))
}

/// Run one measurement, logging and discarding any failure.
fn measured<T>(what: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(metric = what, error = %e, "benchmark measurement skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreLoader;
    use crate::processors::StreamingConverter;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn build_representations(temp: &TempDir) -> Result<Representations> {
        let source = temp.path().join("air_quality.csv");
        let mut file = fs::File::create(&source)?;
        writeln!(file, "date,sitename,county,aqi")?;
        let sites = [("A", "Taipei City"), ("B", "Keelung City"), ("C", "Hualien County")];
        for hour in 0..48 {
            let (site, county) = sites[hour % sites.len()];
            writeln!(file, "2024-08-{:02} {:02}:00,{},{},{}", 1 + hour / 24, hour % 24, site, county, 20 + hour)?;
        }
        // Outside the default August window.
        writeln!(file, "2024-07-31 23:00,D,Taitung County,55")?;
        writeln!(file, "2024-09-01 00:00,D,Taitung County,65")?;
        file.flush()?;

        let store_root = temp.path().join("store");
        let database = store_root.join("air_quality.duckdb");
        StreamingConverter::new(&source, &store_root, 16)?.convert(None)?;
        StoreLoader::new(&store_root, &database).load()?;

        Ok(Representations {
            source,
            store_root,
            database,
        })
    }

    fn missing_representations(temp: &TempDir) -> Representations {
        Representations {
            source: temp.path().join("absent.csv"),
            store_root: temp.path().join("store"),
            database: temp.path().join("absent.duckdb"),
        }
    }

    #[test]
    fn test_missing_representations_are_omitted() {
        let temp = TempDir::new().unwrap();
        let benchmark = PerformanceBenchmark::new(missing_representations(&temp)).with_sample_rows(10);
        let report = benchmark.run();

        assert_eq!(report.sizes, FileSizes::default());
        assert_eq!(report.load.sample_rows, 10);
        assert_eq!(report.load.flat_seconds, None);
        assert_eq!(report.load.store_load_speedup, None);
        assert_eq!(report.query.store_groups, None);
        assert_eq!(report.query.relation_query_speedup, None);

        let text = benchmark.generate_report(&report);
        assert!(text.contains("FILE SIZES"));
        assert!(!text.contains("Compression:"));
    }

    #[test]
    fn test_store_and_relation_agree() -> Result<()> {
        let temp = TempDir::new()?;
        let benchmark = PerformanceBenchmark::new(build_representations(&temp)?).with_sample_rows(20);
        let report = benchmark.run();

        assert_eq!(report.query.store_groups, Some(3));
        assert_eq!(report.query.relation_groups, Some(3));
        assert!(report.query.store_seconds.is_some());
        assert!(report.query.relation_seconds.is_some());

        assert!(report.sizes.flat_bytes.is_some());
        assert!(report.sizes.store_bytes.is_some());
        assert!(report.sizes.relation_bytes.is_some());
        assert!(report.sizes.compression_ratio.is_some());
        assert!(report.sizes.space_saved_percent.is_some());

        assert_eq!(report.load.flat_rows, Some(20));
        assert_eq!(report.load.store_rows, Some(20));
        assert_eq!(report.load.relation_rows, Some(20));

        let text = benchmark.generate_report(&report);
        assert!(text.contains("Compression:"));
        assert!(text.contains("2024-08-01 to 2024-08-31"));
        Ok(())
    }

    #[test]
    fn test_empty_window_matches_no_groups() -> Result<()> {
        let temp = TempDir::new()?;
        let benchmark = PerformanceBenchmark::new(build_representations(&temp)?).with_query_window(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 31).unwrap(),
        );
        let query = benchmark.measure_query();
        assert_eq!(query.store_groups, Some(0));
        assert_eq!(query.relation_groups, Some(0));
        Ok(())
    }

    #[test]
    fn test_window_is_end_inclusive() -> Result<()> {
        let benchmark = PerformanceBenchmark::new(Representations {
            source: PathBuf::from("a.csv"),
            store_root: PathBuf::from("store"),
            database: PathBuf::from("db.duckdb"),
        })
        .with_query_window(
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 8, 31).unwrap(),
        );
        let (start, end) = benchmark.window_micros()?;
        assert_eq!(end - start, 31 * 24 * 3600 * 1_000_000);
        Ok(())
    }
}
