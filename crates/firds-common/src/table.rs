//! In-memory table of string cells
//!
//! A [`Table`] is an ordered list of column names plus ordered rows, each row
//! holding exactly one textual cell per column. Tables are built once (from
//! extracted records or a CSV file), grown column-wise by derivation steps and
//! finally serialized as CSV with a header row and no index column.

use crate::error::{FirdsError, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered rows of string cells under a fixed, ordered column list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Position of `name` in the column list
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FirdsError::MissingColumn(name.to_string()))
    }

    /// All cells of one column, in row order
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Append a row; its length must match the column count
    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(FirdsError::RowLength {
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column whose cell for each row is computed from that row.
    ///
    /// `derive` receives the row's existing cells; the new cell is pushed at
    /// the end of the row, so row order and row count never change.
    pub fn append_derived_column<F>(&mut self, name: &str, mut derive: F) -> Result<()>
    where
        F: FnMut(&[String]) -> String,
    {
        if self.has_column(name) {
            return Err(FirdsError::DuplicateColumn(name.to_string()));
        }

        for row in &mut self.rows {
            let cell = derive(row);
            row.push(cell);
        }
        self.columns.push(name.to_string());
        Ok(())
    }

    /// Read a CSV document whose first record is the header
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns);

        for record in csv_reader.records() {
            let record = record?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }

        Ok(table)
    }

    /// Read a CSV file from disk
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::from_csv_reader(std::io::BufReader::new(file))?;
        debug!(path = %path.display(), rows = table.len(), "Read CSV table");
        Ok(table)
    }

    /// Write the table as CSV: header row, then one line per row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Serialize the table to CSV bytes
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    /// Write the table to a CSV file, replacing any existing file.
    ///
    /// The rows go to `<path>.part` first, which is renamed over `path` only
    /// once fully written. A failed write leaves `path` untouched.
    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write_atomically(path, |writer| self.write_csv(writer))?;
        debug!(path = %path.display(), rows = self.len(), "Wrote CSV table");
        Ok(())
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let part = part_path(path);
    let result = write_part(&part, write)
        .and_then(|()| std::fs::rename(&part, path).map_err(FirdsError::from));

    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn write_part<F>(part: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut writer = BufWriter::new(File::create(part)?);
    write(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Table {
        let mut table = Table::new(["name", "count"]);
        table.push_row(vec!["Alpha".into(), "1".into()]).unwrap();
        table.push_row(vec!["".into(), "0".into()]).unwrap();
        table
    }

    #[test]
    fn test_column_lookup() {
        let table = sample();
        assert_eq!(table.column_index("count").unwrap(), 1);
        assert_eq!(table.column("name").unwrap(), vec!["Alpha", ""]);

        match table.column_index("missing") {
            Err(FirdsError::MissingColumn(name)) => assert_eq!(name, "missing"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_push_row_rejects_wrong_length() {
        let mut table = sample();
        let err = table.push_row(vec!["only one".into()]).unwrap_err();
        assert!(matches!(
            err,
            FirdsError::RowLength { row: 2, expected: 2, actual: 1 }
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_append_derived_column() {
        let mut table = sample();
        table
            .append_derived_column("name_len", |row| row[0].len().to_string())
            .unwrap();

        assert_eq!(table.columns(), &["name", "count", "name_len"]);
        assert_eq!(table.column("name_len").unwrap(), vec!["5", "0"]);
    }

    #[test]
    fn test_append_duplicate_column_fails() {
        let mut table = sample();
        let err = table.append_derived_column("count", |_| String::new()).unwrap_err();
        assert!(matches!(err, FirdsError::DuplicateColumn(ref c) if c == "count"));
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn test_csv_output_format() {
        let csv = String::from_utf8(sample().to_csv_bytes().unwrap()).unwrap();
        assert_eq!(csv, "name,count\nAlpha,1\n,0\n");
    }

    #[test]
    fn test_csv_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");

        let mut table = Table::new(["FinInstrmGnlAttrbts.FullNm", "Issr"]);
        table
            .push_row(vec!["Alpha, \"Quoted\" Corp".into(), "Issuer123".into()])
            .unwrap();
        table.push_row(vec!["".into(), "".into()]).unwrap();
        table.write_csv_file(&path).unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_write_csv_file_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "stale,content\n1,2\n3,4\n").unwrap();

        sample().write_csv_file(&path).unwrap();

        assert_eq!(Table::read_csv(&path).unwrap(), sample());
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_failed_write_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");

        let err = write_atomically(&path, |writer| {
            writer.write_all(b"name,count\nAlpha,1\n")?;
            Err(FirdsError::Config("disk full".into()))
        })
        .unwrap_err();

        assert!(matches!(err, FirdsError::Config(_)));
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        sample().write_csv_file(&path).unwrap();

        let err = write_atomically(&path, |writer| {
            writer.write_all(b"half a ro")?;
            Err(FirdsError::Config("interrupted".into()))
        });

        assert!(err.is_err());
        assert_eq!(Table::read_csv(&path).unwrap(), sample());
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("table.csv");

        assert!(matches!(sample().write_csv_file(&path), Err(FirdsError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_missing_file() {
        let err = Table::read_csv("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, FirdsError::Io(_)));
    }

    proptest! {
        #[test]
        fn prop_csv_round_trip(cells in prop::collection::vec(
            prop::collection::vec("[ -~\n]{0,12}", 3), 0..20)
        ) {
            let mut table = Table::new(["a", "b", "c"]);
            for row in cells {
                table.push_row(row).unwrap();
            }
            let bytes = table.to_csv_bytes().unwrap();
            let loaded = Table::from_csv_reader(&bytes[..]).unwrap();
            prop_assert_eq!(loaded, table);
        }
    }
}
