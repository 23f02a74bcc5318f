use crate::error::{ProcessingError, Result};
use crate::utils::constants::DEFAULT_BUFFER_SIZE;
use csv::{ReaderBuilder, StringRecord};
use memmap2::Mmap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads a delimited source file in fixed-size row chunks.
pub struct SourceReader {
    chunk_size: usize,
    delimiter: u8,
}

impl SourceReader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Open the source and read its header row.
    pub fn open(&self, path: &Path) -> Result<SourceChunks> {
        if !path.is_file() {
            return Err(ProcessingError::SourceNotFound(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file));
        let header = reader.headers()?.clone();

        Ok(SourceChunks {
            reader,
            header,
            chunk_size: self.chunk_size,
            next_index: 0,
            rows_read: 0,
            exhausted: false,
        })
    }
}

/// One batch of raw source rows.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub index: usize,
    /// Zero-based position of the first row of this chunk among all data rows.
    pub first_row: u64,
    pub records: Vec<StringRecord>,
}

impl SourceChunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Iterator over the chunks of an open source; holds at most one chunk of rows.
pub struct SourceChunks {
    reader: csv::Reader<BufReader<File>>,
    header: StringRecord,
    chunk_size: usize,
    next_index: usize,
    rows_read: u64,
    exhausted: bool,
}

impl SourceChunks {
    pub fn header(&self) -> &StringRecord {
        &self.header
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn read_chunk(&mut self) -> Result<Option<SourceChunk>> {
        let mut records = Vec::with_capacity(self.chunk_size);
        let mut record = StringRecord::new();

        while records.len() < self.chunk_size {
            if !self.reader.read_record(&mut record)? {
                self.exhausted = true;
                break;
            }
            records.push(record.clone());
        }

        if records.is_empty() {
            return Ok(None);
        }

        let chunk = SourceChunk {
            index: self.next_index,
            first_row: self.rows_read,
            records,
        };
        self.next_index += 1;
        self.rows_read += chunk.records.len() as u64;
        Ok(Some(chunk))
    }
}

impl Iterator for SourceChunks {
    type Item = Result<SourceChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

/// Count data rows as line count minus the header line, using a memory map.
///
/// A final line without a trailing newline still counts. Blank lines are not
/// skipped, matching a plain line count.
pub fn count_data_lines(path: &Path) -> Result<u64> {
    if !path.is_file() {
        return Err(ProcessingError::SourceNotFound(path.to_path_buf()));
    }

    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(0);
    }

    let mmap = unsafe { Mmap::map(&file)? };
    let mut lines = mmap.iter().filter(|&&b| b == b'\n').count() as u64;
    if mmap.last() != Some(&b'\n') {
        lines += 1;
    }

    Ok(lines.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_source(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_reads_in_chunks() -> Result<()> {
        let file = write_source("date,aqi\n2024-01-01 00:00,1\n2024-01-01 01:00,2\n2024-01-01 02:00,3\n");
        let mut chunks = SourceReader::new(2).open(file.path())?;
        assert_eq!(chunks.header().len(), 2);

        let first = chunks.next().unwrap()?;
        assert_eq!(first.index, 0);
        assert_eq!(first.len(), 2);
        assert_eq!(first.first_row, 0);

        let second = chunks.next().unwrap()?;
        assert_eq!(second.index, 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second.first_row, 2);
        assert_eq!(&second.records[0][1], "3");

        assert!(chunks.next().is_none());
        assert_eq!(chunks.rows_read(), 3);
        Ok(())
    }

    #[test]
    fn test_ragged_rows_are_tolerated() -> Result<()> {
        let file = write_source("date,sitename,aqi\n2024-01-01 00:00,A\n2024-01-01 01:00,B,5,extra\n");
        let chunk = SourceReader::new(10).open(file.path())?.next().unwrap()?;
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.records[0].get(2), None);
        assert_eq!(chunk.records[1].get(2), Some("5"));
        Ok(())
    }

    #[test]
    fn test_missing_source() {
        let result = SourceReader::new(10).open(Path::new("/nonexistent/air_quality.csv"));
        assert!(matches!(result, Err(ProcessingError::SourceNotFound(_))));
    }

    #[test]
    fn test_count_data_lines() -> Result<()> {
        let file = write_source("date,aqi\n2024-01-01 00:00,1\n2024-01-01 01:00,2\n");
        assert_eq!(count_data_lines(file.path())?, 2);

        let no_trailing_newline = write_source("date,aqi\n2024-01-01 00:00,1\n2024-01-01 01:00,2");
        assert_eq!(count_data_lines(no_trailing_newline.path())?, 2);

        let header_only = write_source("date,aqi\n");
        assert_eq!(count_data_lines(header_only.path())?, 0);

        let empty = write_source("");
        assert_eq!(count_data_lines(empty.path())?, 0);
        Ok(())
    }
}
