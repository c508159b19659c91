use crate::ingest::ComponentFile;
use crate::output::write_csv;
use anyhow::Result;
use arrow::{
    array::{ArrayRef, StringArray, UInt64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{fmt, path::Path, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Merged,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Merged => f.write_str("merged"),
            Status::Skipped => f.write_str("skipped"),
        }
    }
}

/// One line of the merge report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub component: String,
    pub file: String,
    pub rows: u64,
    pub cols: u64,
    pub status: Status,
    pub error: Option<String>,
}

/// Per-file outcome of a merge run, written next to the merged dataset.
#[derive(Debug, Default, Clone)]
pub struct MergeReport {
    pub rows: Vec<ReportRow>,
}

impl MergeReport {
    pub fn merged(&mut self, file: &ComponentFile, batch: &RecordBatch) {
        self.rows.push(ReportRow {
            component: file.component.clone(),
            file: file.file_name.clone(),
            rows: batch.num_rows() as u64,
            cols: batch.num_columns() as u64,
            status: Status::Merged,
            error: None,
        });
    }

    pub fn skipped(&mut self, file: &ComponentFile, err: &anyhow::Error) {
        self.rows.push(ReportRow {
            component: file.component.clone(),
            file: file.file_name.clone(),
            rows: 0,
            cols: 0,
            status: Status::Skipped,
            error: Some(format!("{:#}", err)),
        });
    }

    pub fn count(&self, status: Status) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn to_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("component", DataType::Utf8, false),
            Field::new("file", DataType::Utf8, false),
            Field::new("rows", DataType::UInt64, false),
            Field::new("cols", DataType::UInt64, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("error", DataType::Utf8, true),
        ]);

        let component: StringArray = self.rows.iter().map(|r| Some(r.component.as_str())).collect();
        let file: StringArray = self.rows.iter().map(|r| Some(r.file.as_str())).collect();
        let rows: UInt64Array = self.rows.iter().map(|r| Some(r.rows)).collect();
        let cols: UInt64Array = self.rows.iter().map(|r| Some(r.cols)).collect();
        let status: StringArray = self.rows.iter().map(|r| Some(r.status.to_string())).collect();
        let error: StringArray = self.rows.iter().map(|r| r.error.as_deref()).collect();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(component),
            Arc::new(file),
            Arc::new(rows),
            Arc::new(cols),
            Arc::new(status),
            Arc::new(error),
        ];
        RecordBatch::try_new(Arc::new(schema), columns).map_err(Into::into)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_csv(&self.to_batch()?, path)
    }
}
