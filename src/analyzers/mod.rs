pub mod benchmark;

pub use benchmark::{BenchmarkReport, FileSizes, LoadTimings, PerformanceBenchmark, QueryTimings};
