use crate::database::AirQualityDatabase;
use crate::error::{ProcessingError, Result};
use crate::models::{SchemaPolicy, StoreManifest};
use crate::readers::{count_data_lines, numeric_values, StoreReader};
use crate::utils::constants::{
    AQI_RANGE, DEFAULT_MISSING_THRESHOLD_PERCENT, NETWORK_MAX_LAT, NETWORK_MAX_LON,
    NETWORK_MIN_LAT, NETWORK_MIN_LON, O3_RANGE, PM10_RANGE, PM25_RANGE,
};
use crate::utils::stats::{describe, DescriptiveStats, RunningRange};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Fields with documented bounds, checked against the store.
pub fn expected_ranges() -> Vec<(&'static str, (f64, f64))> {
    vec![
        ("aqi", AQI_RANGE),
        ("pm2_5", PM25_RANGE),
        ("pm10", PM10_RANGE),
        ("o3", O3_RANGE),
        ("latitude", (NETWORK_MIN_LAT, NETWORK_MAX_LAT)),
        ("longitude", (NETWORK_MIN_LON, NETWORK_MAX_LON)),
    ]
}

pub const STATISTICS_FIELDS: [&str; 4] = ["aqi", "pm2_5", "pm10", "o3"];

/// Locations of the three representations of the dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Representations {
    pub source: PathBuf,
    pub store_root: PathBuf,
    pub database: PathBuf,
}

/// Per-representation row counts. `None` means the representation was not on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowCountCheck {
    pub source: Option<u64>,
    pub store: Option<u64>,
    pub relation: Option<u64>,
    /// Representations present on disk that could not be counted, with the reason.
    pub unreadable: BTreeMap<String, String>,
    pub matches: bool,
}

impl RowCountCheck {
    fn from_counts(
        source: Option<u64>,
        store: Option<u64>,
        relation: Option<u64>,
        unreadable: BTreeMap<String, String>,
    ) -> Self {
        let available: BTreeSet<u64> = [source, store, relation].into_iter().flatten().collect();
        let matches = unreadable.is_empty() && available.len() == 1;
        Self {
            source,
            store,
            relation,
            unreadable,
            matches,
        }
    }

    /// `source=3, store=3, relation=unavailable`
    pub fn describe(&self) -> String {
        let show = |name: &str, count: Option<u64>| match (count, self.unreadable.get(name)) {
            (Some(count), _) => format!("{}={}", name, count),
            (None, Some(_)) => format!("{}=unreadable", name),
            (None, None) => format!("{}=unavailable", name),
        };
        [
            show("source", self.source),
            show("store", self.store),
            show("relation", self.relation),
        ]
        .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaCheck {
    pub store_available: bool,
    pub expected: BTreeSet<String>,
    pub found: BTreeSet<String>,
    /// Expected columns absent from the store; warnings.
    pub missing: BTreeSet<String>,
    /// Store columns the policy does not name, excluding derived columns; informational.
    pub extra: BTreeSet<String>,
}

impl SchemaCheck {
    fn unavailable(expected: BTreeSet<String>) -> Self {
        Self {
            store_available: false,
            expected,
            found: BTreeSet::new(),
            missing: BTreeSet::new(),
            extra: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeFinding {
    pub expected_min: f64,
    pub expected_max: f64,
    pub observed_min: Option<f64>,
    pub observed_max: Option<f64>,
    pub in_range: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingDataAnalysis {
    pub total_rows: u64,
    pub threshold_percent: f64,
    /// Columns with at least one missing value.
    pub missing_counts: BTreeMap<String, u64>,
    pub missing_percent: BTreeMap<String, f64>,
    /// Columns above the threshold.
    pub flagged: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub row_counts: RowCountCheck,
    pub schema: SchemaCheck,
    pub value_ranges: BTreeMap<String, RangeFinding>,
    pub missing_data: Option<MissingDataAnalysis>,
    pub statistics: BTreeMap<String, Option<DescriptiveStats>>,
    pub warnings: Vec<String>,
    pub validation_passed: bool,
}

impl ValidationReport {
    /// Range violations only.
    pub fn range_violations(&self) -> impl Iterator<Item = (&String, &RangeFinding)> {
        self.value_ranges.iter().filter(|(_, f)| !f.in_range)
    }
}

/// Everything the advisory checks need, gathered in one pass over the store.
#[derive(Debug, Default)]
struct StoreProfile {
    total_rows: u64,
    columns: BTreeSet<String>,
    missing: BTreeMap<String, u64>,
    ranges: BTreeMap<String, RunningRange>,
    samples: BTreeMap<String, Vec<f64>>,
}

/// Re-derives counts, schema, ranges and missing ratios from each representation.
pub struct CrossValidator {
    representations: Representations,
    policy: SchemaPolicy,
    missing_threshold_percent: f64,
}

impl CrossValidator {
    pub fn new(representations: Representations) -> Self {
        Self {
            representations,
            policy: SchemaPolicy::default(),
            missing_threshold_percent: DEFAULT_MISSING_THRESHOLD_PERCENT,
        }
    }

    pub fn with_policy(mut self, policy: SchemaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_missing_threshold(mut self, percent: f64) -> Self {
        self.missing_threshold_percent = percent;
        self
    }

    pub fn representations(&self) -> &Representations {
        &self.representations
    }

    /// Run every check. Only a row-count disagreement fails the report.
    pub fn validate(&self) -> Result<ValidationReport> {
        info!("starting validation");
        let manifest = StoreManifest::discover(&self.representations.store_root)?;
        let mut warnings = Vec::new();

        let row_counts = self.check_row_counts_with(&manifest);
        if row_counts.matches {
            info!(counts = %row_counts.describe(), "row counts match");
        } else {
            error!(counts = %row_counts.describe(), "row count mismatch");
            warnings.push(format!("row count mismatch: {}", row_counts.describe()));
        }

        let schema = match self.check_schema_with(&manifest) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "could not read store schema");
                SchemaCheck::unavailable(self.policy.expected_columns())
            }
        };
        if !schema.store_available {
            warnings.push("columnar store not available for schema check".to_string());
        }
        for column in &schema.missing {
            warnings.push(format!("expected column missing from store: {}", column));
        }
        if !schema.extra.is_empty() {
            info!(extra = ?schema.extra, "extra columns in store");
        }

        let (value_ranges, missing_data, statistics) = if manifest.is_empty() {
            (BTreeMap::new(), None, BTreeMap::new())
        } else {
            match self.profile_store(&manifest) {
                Ok(mut profile) => (
                    self.value_ranges_from(&profile),
                    Some(self.missing_data_from(&profile)),
                    statistics_from(&mut profile.samples),
                ),
                Err(e) => {
                    warn!(error = %e, "could not profile columnar store");
                    warnings.push(format!("could not profile columnar store: {}", e));
                    (BTreeMap::new(), None, BTreeMap::new())
                }
            }
        };

        for (column, finding) in value_ranges.iter().filter(|(_, f)| !f.in_range) {
            let warning = format!(
                "{} observed [{}, {}] outside expected [{}, {}]",
                column,
                fmt_bound(finding.observed_min),
                fmt_bound(finding.observed_max),
                finding.expected_min,
                finding.expected_max
            );
            warn!("{}", warning);
            warnings.push(warning);
        }

        if let Some(missing) = &missing_data {
            for (column, pct) in &missing.flagged {
                warnings.push(format!(
                    "{} missing {:.2}% (threshold {:.1}%)",
                    column, pct, missing.threshold_percent
                ));
            }
        }

        for (column, stats) in &statistics {
            if let Some(stats) = stats {
                debug!(column = %column, mean = stats.mean, median = stats.median, "statistics");
            }
        }

        let validation_passed = row_counts.matches;
        if validation_passed {
            info!(warnings = warnings.len(), "validation passed");
        } else {
            error!("validation failed");
        }

        Ok(ValidationReport {
            row_counts,
            schema,
            value_ranges,
            missing_data,
            statistics,
            warnings,
            validation_passed,
        })
    }

    pub fn check_row_counts(&self) -> Result<RowCountCheck> {
        let manifest = StoreManifest::discover(&self.representations.store_root)?;
        Ok(self.check_row_counts_with(&manifest))
    }

    fn check_row_counts_with(&self, manifest: &StoreManifest) -> RowCountCheck {
        let mut unreadable = BTreeMap::new();

        let source = if self.representations.source.is_file() {
            match count_data_lines(&self.representations.source) {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(error = %e, "could not count source rows");
                    unreadable.insert("source".to_string(), e.to_string());
                    None
                }
            }
        } else {
            warn!(path = %self.representations.source.display(), "source file not found");
            None
        };

        let store = if manifest.is_empty() {
            warn!(path = %manifest.root().display(), "columnar store not found");
            None
        } else {
            match StoreReader::new(manifest).row_count() {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(error = %e, "could not count store rows");
                    unreadable.insert("store".to_string(), e.to_string());
                    None
                }
            }
        };

        let relation = if self.representations.database.is_file() {
            match AirQualityDatabase::open_read_only(&self.representations.database)
                .and_then(|db| db.row_count())
            {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(error = %e, "could not count relation rows");
                    unreadable.insert("relation".to_string(), e.to_string());
                    None
                }
            }
        } else {
            warn!(path = %self.representations.database.display(), "database file not found");
            None
        };

        RowCountCheck::from_counts(source, store, relation, unreadable)
    }

    pub fn check_schema(&self) -> Result<SchemaCheck> {
        let manifest = StoreManifest::discover(&self.representations.store_root)?;
        self.check_schema_with(&manifest)
    }

    fn check_schema_with(&self, manifest: &StoreManifest) -> Result<SchemaCheck> {
        let expected = self.policy.expected_columns();
        if manifest.is_empty() {
            return Ok(SchemaCheck::unavailable(expected));
        }

        let found = StoreReader::new(manifest).column_names()?;
        let derived = self.policy.derived_columns();
        let missing = expected.difference(&found).cloned().collect();
        let extra = found
            .iter()
            .filter(|c| !expected.contains(*c) && !derived.contains(*c))
            .cloned()
            .collect();

        Ok(SchemaCheck {
            store_available: true,
            expected,
            found,
            missing,
            extra,
        })
    }

    pub fn check_value_ranges(&self) -> Result<BTreeMap<String, RangeFinding>> {
        let profile = self.profile_current_store()?;
        Ok(self.value_ranges_from(&profile))
    }

    pub fn analyze_missing_data(&self) -> Result<MissingDataAnalysis> {
        let profile = self.profile_current_store()?;
        Ok(self.missing_data_from(&profile))
    }

    /// Holds every non-missing value of the statistics fields in memory to take
    /// exact medians, so memory grows with the store size.
    pub fn compute_statistics(&self) -> Result<BTreeMap<String, Option<DescriptiveStats>>> {
        let mut profile = self.profile_current_store()?;
        Ok(statistics_from(&mut profile.samples))
    }

    fn profile_current_store(&self) -> Result<StoreProfile> {
        let manifest = StoreManifest::discover(&self.representations.store_root)?;
        if manifest.is_empty() {
            return Err(ProcessingError::NoData(manifest.root().to_path_buf()));
        }
        self.profile_store(&manifest)
    }

    fn profile_store(&self, manifest: &StoreManifest) -> Result<StoreProfile> {
        let reader = StoreReader::new(manifest);
        let mut profile = StoreProfile {
            columns: reader.column_names()?,
            ..StoreProfile::default()
        };

        let range_columns: Vec<&str> = expected_ranges().into_iter().map(|(c, _)| c).collect();

        reader.scan(None, |_, batch| {
            let rows = batch.num_rows() as u64;
            profile.total_rows += rows;

            for column in &profile.columns {
                let missing = match batch.column_by_name(column) {
                    Some(array) => array.null_count() as u64,
                    None => rows,
                };
                *profile.missing.entry(column.clone()).or_insert(0) += missing;
            }

            for column in range_columns.iter().chain(STATISTICS_FIELDS.iter()) {
                let Some(array) = batch.column_by_name(column) else {
                    continue;
                };
                let values = numeric_values(array)?;
                if range_columns.contains(column) {
                    let range = profile.ranges.entry(column.to_string()).or_default();
                    values.iter().flatten().for_each(|v| range.update(*v));
                }
                if STATISTICS_FIELDS.contains(column) {
                    profile
                        .samples
                        .entry(column.to_string())
                        .or_default()
                        .extend(values.into_iter().flatten());
                }
            }
            Ok(())
        })?;

        Ok(profile)
    }

    fn value_ranges_from(&self, profile: &StoreProfile) -> BTreeMap<String, RangeFinding> {
        let mut findings = BTreeMap::new();
        for (column, (expected_min, expected_max)) in expected_ranges() {
            if !profile.columns.contains(column) {
                debug!(column, "range column not in store");
                continue;
            }
            let bounds = profile.ranges.get(column).and_then(|r| r.bounds());
            let in_range = match bounds {
                Some((min, max)) => min >= expected_min && max <= expected_max,
                None => true,
            };
            findings.insert(
                column.to_string(),
                RangeFinding {
                    expected_min,
                    expected_max,
                    observed_min: bounds.map(|b| b.0),
                    observed_max: bounds.map(|b| b.1),
                    in_range,
                },
            );
        }
        findings
    }

    fn missing_data_from(&self, profile: &StoreProfile) -> MissingDataAnalysis {
        let mut missing_counts = BTreeMap::new();
        let mut missing_percent = BTreeMap::new();
        let mut flagged = BTreeMap::new();

        for (column, missing) in &profile.missing {
            let pct = if profile.total_rows > 0 {
                *missing as f64 / profile.total_rows as f64 * 100.0
            } else {
                0.0
            };
            if *missing > 0 {
                missing_counts.insert(column.clone(), *missing);
            }
            if pct > self.missing_threshold_percent {
                flagged.insert(column.clone(), pct);
            }
            missing_percent.insert(column.clone(), pct);
        }

        MissingDataAnalysis {
            total_rows: profile.total_rows,
            threshold_percent: self.missing_threshold_percent,
            missing_counts,
            missing_percent,
            flagged,
        }
    }

    /// Fail with the per-representation counts when they disagree.
    pub fn ensure_row_counts(report: &ValidationReport) -> Result<()> {
        if report.row_counts.matches {
            Ok(())
        } else {
            Err(ProcessingError::RowCountMismatch(report.row_counts.describe()))
        }
    }

    pub fn generate_summary(&self, report: &ValidationReport) -> String {
        let mut summary = String::new();

        summary.push_str("=== Validation Report ===\n");
        summary.push_str(&format!("Row Counts: {}\n", report.row_counts.describe()));
        summary.push_str(&format!(
            "Row Count Check: {}\n",
            if report.row_counts.matches { "PASS" } else { "FAIL" }
        ));

        if report.schema.store_available {
            summary.push_str(&format!(
                "Schema: {} columns found, {} missing, {} extra\n",
                report.schema.found.len(),
                report.schema.missing.len(),
                report.schema.extra.len()
            ));
        } else {
            summary.push_str("Schema: store not available\n");
        }

        let violations: Vec<_> = report.range_violations().collect();
        summary.push_str(&format!("\nRange Violations: {}\n", violations.len()));
        for (column, finding) in violations {
            summary.push_str(&format!(
                "  {}: observed [{}, {}], expected [{}, {}]\n",
                column,
                fmt_bound(finding.observed_min),
                fmt_bound(finding.observed_max),
                finding.expected_min,
                finding.expected_max
            ));
        }

        if let Some(missing) = &report.missing_data {
            summary.push_str(&format!(
                "\nColumns Above {:.1}% Missing: {}\n",
                missing.threshold_percent,
                missing.flagged.len()
            ));
            for (column, pct) in &missing.flagged {
                summary.push_str(&format!("  {}: {:.2}%\n", column, pct));
            }
        }

        if !report.statistics.is_empty() {
            summary.push_str("\nStatistics:\n");
            for (column, stats) in &report.statistics {
                match stats {
                    Some(s) => summary.push_str(&format!(
                        "  {}: mean={:.2} median={:.2} std={} min={:.2} max={:.2}\n",
                        column,
                        s.mean,
                        s.median,
                        s.std_dev.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string()),
                        s.min,
                        s.max
                    )),
                    None => summary.push_str(&format!("  {}: no values\n", column)),
                }
            }
        }

        summary.push_str(&format!(
            "\nValidation: {}\n",
            if report.validation_passed { "PASSED" } else { "FAILED" }
        ));

        summary
    }
}

/// Every statistics field gets an entry; fields absent from the store report `None`.
fn statistics_from(
    samples: &mut BTreeMap<String, Vec<f64>>,
) -> BTreeMap<String, Option<DescriptiveStats>> {
    STATISTICS_FIELDS
        .iter()
        .map(|column| {
            let stats = samples.get_mut(*column).and_then(|values| describe(values));
            (column.to_string(), stats)
        })
        .collect()
}

fn fmt_bound(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_verdicts() {
        let check = RowCountCheck::from_counts(Some(3), Some(3), Some(3), BTreeMap::new());
        assert!(check.matches);

        let check = RowCountCheck::from_counts(Some(3), None, None, BTreeMap::new());
        assert!(check.matches);
        assert_eq!(check.describe(), "source=3, store=unavailable, relation=unavailable");

        let check = RowCountCheck::from_counts(Some(84_008), Some(84_008), Some(84_000), BTreeMap::new());
        assert!(!check.matches);
        assert_eq!(check.describe(), "source=84008, store=84008, relation=84000");

        let check = RowCountCheck::from_counts(None, None, None, BTreeMap::new());
        assert!(!check.matches);

        let mut unreadable = BTreeMap::new();
        unreadable.insert("relation".to_string(), "corrupt".to_string());
        let check = RowCountCheck::from_counts(Some(3), Some(3), None, unreadable);
        assert!(!check.matches);
        assert!(check.describe().ends_with("relation=unreadable"));
    }

    #[test]
    fn test_statistics_from_samples() {
        let mut samples = BTreeMap::new();
        samples.insert("aqi".to_string(), vec![30.0, 10.0, 20.0]);
        samples.insert("o3".to_string(), Vec::new());

        let stats = statistics_from(&mut samples);
        let aqi = stats["aqi"].as_ref().unwrap();
        assert_eq!(aqi.median, 20.0);
        assert_eq!(aqi.std_dev, Some(10.0));
        assert_eq!(stats["o3"], None);
        assert_eq!(stats["pm2_5"], None);
        assert_eq!(
            stats.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["aqi", "o3", "pm10", "pm2_5"]
        );
    }
}
