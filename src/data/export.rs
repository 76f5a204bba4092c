use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, Float64Array, Float64Builder, Int64Array, ListArray, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::{info, warn};
use ndarray::Array1;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::loader::extension;
use super::model::Spectrum;
use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Output formats for the 1D spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Header `"Pixel", "Value"`, then `pixel,value` per line.
    Csv,
    /// Header `# x  y`, then `pixel  value` per line (`.xy` and `.dat`).
    Xy,
    /// One row with `x`/`y` list columns and metadata columns.
    Parquet,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension(path).as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xy" | "dat" => Some(ExportFormat::Xy),
            "parquet" | "pq" => Some(ExportFormat::Parquet),
            _ => None,
        }
    }
}

/// What [`write_spectrum1d`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(ExportFormat),
    /// Unknown extension: the warning "Unknown file format: .<extension>. No
    /// output written." was logged and no file was created.
    Skipped { extension: String },
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write the processed 1D spectrum. The format follows the file extension.
///
/// The spectrum must have been processed. An unknown extension is not an
/// error: it logs a warning and writes nothing.
pub fn write_spectrum1d(spectrum: &Spectrum, path: &Path) -> Result<ExportOutcome> {
    let values = spectrum.spectrum1d()?;

    let Some(format) = ExportFormat::from_path(path) else {
        let extension = extension(path);
        warn!("Unknown file format: .{extension}. No output written.");
        return Ok(ExportOutcome::Skipped { extension });
    };

    match format {
        ExportFormat::Csv => write_text(values, path, "\"Pixel\", \"Value\"", ",")?,
        ExportFormat::Xy => write_text(values, path, "# x  y", "  ")?,
        ExportFormat::Parquet => write_parquet(spectrum, values, path)?,
    }

    info!("Output written to file: {}", path.display());
    Ok(ExportOutcome::Written(format))
}

fn write_text(values: &Array1<f64>, path: &Path, header: &str, separator: &str) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{header}")?;
    for (pixel, value) in values.iter().enumerate() {
        writeln!(out, "{pixel}{separator}{value}")?;
    }
    out.flush()?;
    Ok(())
}

fn write_parquet(spectrum: &Spectrum, values: &Array1<f64>, path: &Path) -> Result<()> {
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    for pixel in 0..values.len() {
        x_builder.values().append_value(pixel as f64);
    }
    x_builder.append(true);

    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for &v in values {
        y_builder.values().append_value(v);
    }
    y_builder.append(true);

    let list_type = DataType::List(Arc::new(Field::new("item", DataType::Float64, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", list_type.clone(), false),
        Field::new("y", list_type, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("num_frames", DataType::Int64, true),
        Field::new("threshold", DataType::Int64, true),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(StringArray::from(vec![spectrum.name.as_str()])),
            Arc::new(StringArray::from(vec![spectrum.kind.to_string()])),
            Arc::new(Int64Array::from(vec![spectrum.num_frames().map(|n| n as i64)])),
            Arc::new(Int64Array::from(vec![spectrum.threshold().map(i64::from)])),
        ],
    )?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read back a 1D spectrum written by [`write_spectrum1d`].
///
/// Unlike the writer, an unknown extension is an error here.
pub fn read_spectrum1d(path: &Path) -> Result<Array1<f64>> {
    match ExportFormat::from_path(path) {
        Some(ExportFormat::Csv) => read_csv(path),
        Some(ExportFormat::Xy) => read_xy(path),
        Some(ExportFormat::Parquet) => read_parquet(path),
        None => Err(SpectrumError::UnsupportedFormat(format!(
            "cannot read a spectrum from .{}",
            extension(path)
        ))),
    }
}

fn read_csv(path: &Path) -> Result<Array1<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let (pixel, value) = match (record.get(0), record.get(1)) {
            (Some(p), Some(v)) => (p, v),
            _ => {
                return Err(SpectrumError::Malformed(format!(
                    "CSV row {row}: expected two columns"
                )))
            }
        };
        values.push(parse_pair(pixel, value, row)?);
    }
    Ok(Array1::from(values))
}

fn read_xy(path: &Path) -> Result<Array1<f64>> {
    let reader = BufReader::new(File::open(path)?);
    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let row = values.len();
        match (fields.next(), fields.next()) {
            (Some(pixel), Some(value)) => values.push(parse_pair(pixel, value, row)?),
            _ => {
                return Err(SpectrumError::Malformed(format!(
                    "line {row}: expected 'pixel  value'"
                )))
            }
        }
    }
    Ok(Array1::from(values))
}

/// Parse one `(pixel, value)` pair; pixels must count up from zero.
fn parse_pair(pixel: &str, value: &str, row: usize) -> Result<f64> {
    let index: usize = pixel
        .parse()
        .map_err(|_| SpectrumError::Malformed(format!("row {row}: '{pixel}' is not a pixel index")))?;
    if index != row {
        return Err(SpectrumError::Malformed(format!(
            "row {row}: expected pixel {row}, found {index}"
        )));
    }
    value
        .parse()
        .map_err(|_| SpectrumError::Malformed(format!("row {row}: '{value}' is not a number")))
}

fn read_parquet(path: &Path) -> Result<Array1<f64>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    for batch in reader {
        let batch = batch?;
        let y_idx = batch
            .schema()
            .index_of("y")
            .map_err(|_| SpectrumError::Malformed("Parquet file missing 'y' column".to_string()))?;
        if batch.num_rows() == 0 {
            continue;
        }
        let list = batch
            .column(y_idx)
            .as_any()
            .downcast_ref::<ListArray>()
            .ok_or_else(|| SpectrumError::Malformed("'y' is not a list column".to_string()))?;
        let row = list.value(0);
        let y = row
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| SpectrumError::Malformed("'y' items are not Float64".to_string()))?;
        return Ok(y.iter().map(|v| v.unwrap_or(f64::NAN)).collect());
    }

    Err(SpectrumError::Malformed("Parquet file has no rows".to_string()))
}
