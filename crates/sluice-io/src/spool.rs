//! Per-table CSV spool, gzipped on flush.

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use sluice_core::Table;
use tempfile::NamedTempFile;

/// A finalized, gzip-compressed spool awaiting staging.
#[derive(Debug)]
pub struct SpooledGzip {
    pub path: PathBuf,
    pub rows: u64,
}

/// Write buffer for one final table, backed by a temporary CSV file whose
/// header row equals the table's field names in dialect order.
///
/// The CSV temp file is deleted when the spool resets or drops; the gzip file
/// produced by [`RowSpool::flush_gzipped`] is owned by the staging path and
/// removed via [`RowSpool::delete_gzip`] or by the stage uploader.
pub struct RowSpool {
    field_names: Vec<String>,
    file: NamedTempFile,
    writer: csv::Writer<File>,
    rows: u64,
}

impl RowSpool {
    pub fn new(table: &Table) -> Result<Self> {
        Self::with_field_names(table.field_names())
    }

    fn with_field_names(field_names: Vec<String>) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("sluice-")
            .suffix(".csv")
            .tempfile()
            .context("create spool file")?;
        let mut writer = csv::Writer::from_writer(file.reopen().context("reopen spool file")?);
        writer.write_record(&field_names)?;
        writer.flush()?;

        Ok(Self {
            field_names,
            file,
            writer,
            rows: 0,
        })
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Appends one row of already-projected cells, in header order.
    pub fn write(&mut self, row: &[String]) -> Result<()> {
        self.writer.write_record(row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_count(&self) -> u64 {
        self.rows
    }

    /// Gzips the buffered CSV to a sibling `.gz` path and resets the spool to
    /// a fresh file with the header rewritten. Returns `None` when no rows
    /// are buffered.
    pub fn flush_gzipped(&mut self) -> Result<Option<SpooledGzip>> {
        if self.rows == 0 {
            return Ok(None);
        }
        self.writer.flush()?;

        let csv_path = self.file.path().to_path_buf();
        let gzip_path = PathBuf::from(format!("{}.gz", csv_path.display()));
        let mut input = File::open(&csv_path).context("open spool for compression")?;
        let mut encoder = GzEncoder::new(
            File::create(&gzip_path).context("create gzip stage file")?,
            Compression::default(),
        );
        io::copy(&mut input, &mut encoder)?;
        encoder.finish()?;

        let rows = self.rows;
        *self = Self::with_field_names(self.field_names.clone())?;

        Ok(Some(SpooledGzip {
            path: gzip_path,
            rows,
        }))
    }

    /// Unlinks a gzip file once the loader is done with it.
    pub fn delete_gzip(gzip: &SpooledGzip) -> Result<()> {
        fs::remove_file(&gzip.path).context("delete gzip stage file")?;
        Ok(())
    }
}
