use crate::ingest::discover::{ComponentFile, FileKind};
use crate::ingest::utils::{clean_cell, normalize_headers};
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    compute::concat_batches,
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use calamine::{open_workbook_auto, Data, Reader};
use std::{
    fs::File,
    io::{BufReader, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::{debug, warn};

const CSV_BATCH_ROWS: usize = 64 * 1024;

/// Read a component file into a batch of cleaned text columns.
///
/// Headers are normalized (trimmed + uppercased) and every cell is run through
/// [`clean_cell`], so missing markers are already null.
pub fn read_component(file: &ComponentFile) -> Result<RecordBatch> {
    match file.kind {
        FileKind::Csv => read_csv_text(&file.path),
        FileKind::Xlsx | FileKind::Xls => read_excel_text(&file.path),
    }
    .with_context(|| format!("reading {}", file.file_name))
}

/// All-Utf8 schema for the given headers.
fn text_schema(headers: &[String]) -> SchemaRef {
    let fields: Vec<Field> = headers
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Parse a CSV file with every column as Utf8, then clean every cell.
pub fn read_csv_text(path: &Path) -> Result<RecordBatch> {
    let mut file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;

    // Only the header row is needed; types are derived later from the text.
    let format = Format::default().with_header(true);
    let (header_schema, _) = format
        .infer_schema(BufReader::new(&mut file), Some(0))
        .context("reading CSV header")?;
    let raw_headers: Vec<String> = header_schema
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    if raw_headers.is_empty() {
        return Err(anyhow!("CSV has no header row"));
    }
    let schema = text_schema(&normalize_headers(&raw_headers));

    file.seek(SeekFrom::Start(0))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_truncated_rows(true)
        .with_batch_size(CSV_BATCH_ROWS)
        .build(BufReader::new(file))
        .context("creating CSV reader")?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch.context("reading CSV batch")?;
        batches.push(clean_batch(&batch)?);
    }
    let out = concat_batches(&schema, &batches).context("concatenating CSV batches")?;
    debug!(
        path = %path.display(),
        rows = out.num_rows(),
        cols = out.num_columns(),
        "read csv"
    );
    Ok(out)
}

/// Run [`clean_cell`] over every text column of `batch`.
fn clean_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let mut cols = Vec::with_capacity(batch.num_columns());
    for arr in batch.columns() {
        let sarr = arr
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| anyhow!("expected a text column"))?;
        let cleaned: StringArray = sarr.iter().map(clean_cell).collect();
        cols.push(Arc::new(cleaned) as ArrayRef);
    }
    RecordBatch::try_new(batch.schema(), cols).map_err(Into::into)
}

/// Render a spreadsheet cell as text; empty and error cells are missing.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => clean_cell(Some(s.as_str())),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => clean_cell(Some(other.to_string().as_str())),
    }
}

/// Read the first worksheet of an xlsx/xls workbook; row 0 is the header.
pub fn read_excel_text(path: &Path) -> Result<RecordBatch> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("opening {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("reading first worksheet")?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or_else(|| anyhow!("worksheet is empty"))?;
    let raw_headers: Vec<String> = header_row
        .iter()
        .map(|c| cell_text(c).unwrap_or_default())
        .collect();
    let headers = normalize_headers(&raw_headers);
    let width = headers.len();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    let mut blank_rows = 0usize;
    for row in rows {
        let cells: Vec<Option<String>> = (0..width)
            .map(|j| row.get(j).and_then(cell_text))
            .collect();
        // Trailing formatted-but-empty rows are common in hand-edited sheets.
        if cells.iter().all(Option::is_none) {
            blank_rows += 1;
            continue;
        }
        for (col, cell) in columns.iter_mut().zip(cells) {
            col.push(cell);
        }
    }
    if blank_rows > 0 {
        warn!(path = %path.display(), blank_rows, "skipped blank worksheet rows");
    }

    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| Arc::new(StringArray::from(c)) as ArrayRef)
        .collect();
    let out = RecordBatch::try_new(text_schema(&headers), arrays)
        .context("building worksheet batch")?;
    debug!(
        path = %path.display(),
        rows = out.num_rows(),
        cols = out.num_columns(),
        "read worksheet"
    );
    Ok(out)
}
