/// Output file names
pub const DEFAULT_DATABASE_FILE: &str = "air_quality.duckdb";
pub const VALIDATION_REPORT_FILE: &str = "validation_report.json";
pub const BENCHMARK_REPORT_FILE: &str = "benchmark_report.json";
pub const STAGING_PREFIX: &str = ".staging-";

/// Relation and view names
pub const BASE_RELATION: &str = "air_quality";
pub const VIEW_DAILY_AVERAGES: &str = "daily_averages";
pub const VIEW_MONTHLY_SUMMARY: &str = "monthly_summary";
pub const VIEW_HIGH_POLLUTION: &str = "high_pollution_events";
pub const VIEW_STATION_METADATA: &str = "station_metadata";

/// AQI above which a reading counts as an exceedance
pub const AQI_EXCEEDANCE_THRESHOLD: f64 = 100.0;

/// Missing-data share (percent) above which a column is flagged
pub const DEFAULT_MISSING_THRESHOLD_PERCENT: f64 = 5.0;

/// Expected value ranges
pub const AQI_RANGE: (f64, f64) = (0.0, 500.0);
pub const PM25_RANGE: (f64, f64) = (0.0, 1000.0);
pub const PM10_RANGE: (f64, f64) = (0.0, 2000.0);
pub const O3_RANGE: (f64, f64) = (0.0, 500.0);

/// Monitoring network geographic bounds
pub const NETWORK_MIN_LAT: f64 = 21.0;
pub const NETWORK_MAX_LAT: f64 = 26.0;
pub const NETWORK_MIN_LON: f64 = 119.0;
pub const NETWORK_MAX_LON: f64 = 123.0;

/// Processing defaults
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 100_000;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB
pub const DEFAULT_SAMPLE_ROWS: usize = 100_000;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
pub const COMPRESSIONS: [&str; 5] = [
    COMPRESSION_SNAPPY,
    COMPRESSION_GZIP,
    COMPRESSION_LZ4,
    COMPRESSION_ZSTD,
    COMPRESSION_NONE,
];
