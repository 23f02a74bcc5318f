//! Partition keys and the explicit store manifest.

use crate::error::Result;
use chrono::{Datelike, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const UNKNOWN_PARTITION: &str = "unknown";

/// Years that render as a four-digit directory name.
const PARTITION_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Calendar-year partition, or the bucket for rows without a valid timestamp.
///
/// `Year` sorts before `Unknown`, so the unknown bucket always lists last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionKey {
    Year(i32),
    Unknown,
}

impl PartitionKey {
    /// Years outside 0..=9999 land in `Unknown` so every key maps to a
    /// directory that `parse_dir_name` reads back.
    pub fn from_timestamp(timestamp: Option<&NaiveDateTime>) -> Self {
        match timestamp.map(|ts| ts.year()) {
            Some(year) if PARTITION_YEARS.contains(&year) => PartitionKey::Year(year),
            _ => PartitionKey::Unknown,
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self {
            PartitionKey::Year(year) => Some(*year),
            PartitionKey::Unknown => None,
        }
    }

    /// Directory name: the literal year or `unknown`.
    pub fn dir_name(&self) -> String {
        self.to_string()
    }

    pub fn parse_dir_name(name: &str) -> Option<Self> {
        if name == UNKNOWN_PARTITION {
            return Some(PartitionKey::Unknown);
        }
        if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
            return name.parse::<i32>().ok().map(PartitionKey::Year);
        }
        None
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Year(year) => write!(f, "{:04}", year),
            PartitionKey::Unknown => f.write_str(UNKNOWN_PARTITION),
        }
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub partition: PartitionKey,
    pub path: PathBuf,
}

/// The list of (partition, file) pairs making up a columnar store, built once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreManifest {
    root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl StoreManifest {
    pub fn from_entries(root: impl Into<PathBuf>, mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| (a.partition, &a.path).cmp(&(b.partition, &b.path)));
        Self {
            root: root.into(),
            entries,
        }
    }

    /// Walk the partition directories directly under `root`.
    ///
    /// Directories whose names are not partition keys (staging areas, the database
    /// file) are ignored. A missing root yields an empty manifest.
    pub fn discover(root: &Path) -> Result<Self> {
        let mut entries = Vec::new();

        if !root.is_dir() {
            return Ok(Self::from_entries(root, entries));
        }

        for dir_entry in fs::read_dir(root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let name = dir_entry.file_name();
            let Some(partition) = name.to_str().and_then(PartitionKey::parse_dir_name) else {
                continue;
            };

            for file_entry in fs::read_dir(dir_entry.path())? {
                let path = file_entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                    entries.push(ManifestEntry { partition, path });
                }
            }
        }

        Ok(Self::from_entries(root, entries))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn partitions(&self) -> BTreeSet<PartitionKey> {
        self.entries.iter().map(|e| e.partition).collect()
    }

    pub fn files_for(&self, partition: PartitionKey) -> Vec<&Path> {
        self.entries
            .iter()
            .filter(|e| e.partition == partition)
            .map(|e| e.path.as_path())
            .collect()
    }

    pub fn total_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for entry in &self.entries {
            total += fs::metadata(&entry.path)?.len();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_partition_key_from_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 8, 31)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        assert_eq!(PartitionKey::from_timestamp(Some(&ts)), PartitionKey::Year(2024));
        assert_eq!(PartitionKey::from_timestamp(None), PartitionKey::Unknown);
    }

    #[test]
    fn test_out_of_range_years_are_unknown() {
        for year in [-1, 10000] {
            let ts = NaiveDate::from_ymd_opt(year, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            let key = PartitionKey::from_timestamp(Some(&ts));
            assert_eq!(key, PartitionKey::Unknown);
            assert_eq!(PartitionKey::parse_dir_name(&key.dir_name()), Some(key));
        }

        let first = NaiveDate::from_ymd_opt(0, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let key = PartitionKey::from_timestamp(Some(&first));
        assert_eq!(key, PartitionKey::Year(0));
        assert_eq!(PartitionKey::parse_dir_name(&key.dir_name()), Some(key));
    }

    #[test]
    fn test_dir_names_round_trip() {
        assert_eq!(PartitionKey::Year(2024).dir_name(), "2024");
        assert_eq!(PartitionKey::Unknown.dir_name(), "unknown");
        assert_eq!(PartitionKey::parse_dir_name("2019"), Some(PartitionKey::Year(2019)));
        assert_eq!(PartitionKey::parse_dir_name("unknown"), Some(PartitionKey::Unknown));
        assert_eq!(PartitionKey::parse_dir_name(".staging-abc"), None);
        assert_eq!(PartitionKey::parse_dir_name("year=2024"), None);
    }

    #[test]
    fn test_unknown_sorts_last() {
        let mut keys = vec![
            PartitionKey::Unknown,
            PartitionKey::Year(2024),
            PartitionKey::Year(2016),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PartitionKey::Year(2016),
                PartitionKey::Year(2024),
                PartitionKey::Unknown
            ]
        );
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&PartitionKey::Year(2024)).unwrap();
        assert_eq!(json, "\"2024\"");
    }

    #[test]
    fn test_discover_ignores_foreign_entries() -> Result<()> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("2024"))?;
        fs::create_dir_all(temp.path().join("unknown"))?;
        fs::create_dir_all(temp.path().join(".staging-xyz"))?;
        fs::write(temp.path().join("2024/part-000000.parquet"), b"x")?;
        fs::write(temp.path().join("2024/notes.txt"), b"x")?;
        fs::write(temp.path().join("unknown/part-000000.parquet"), b"xy")?;
        fs::write(temp.path().join(".staging-xyz/part-000000.parquet"), b"x")?;
        fs::write(temp.path().join("air_quality.duckdb"), b"x")?;

        let manifest = StoreManifest::discover(temp.path())?;
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries()[0].partition, PartitionKey::Year(2024));
        assert_eq!(manifest.entries()[1].partition, PartitionKey::Unknown);
        assert_eq!(manifest.total_bytes()?, 3);
        assert_eq!(manifest.files_for(PartitionKey::Year(2024)).len(), 1);
        Ok(())
    }

    #[test]
    fn test_discover_missing_root() -> Result<()> {
        let temp = TempDir::new()?;
        let manifest = StoreManifest::discover(&temp.path().join("absent"))?;
        assert!(manifest.is_empty());
        Ok(())
    }
}
