//! Parquet ingestion of the raw position table.
//!
//! Every column is carried through, so each Arrow value is rendered to its
//! display text and the rows end up in the same shape as a CSV read. Arrow
//! nulls become empty fields, which the null filter then removes.

use anyhow::{Context, Result};
use arrow_array::Array;
use arrow_cast::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

static READ_BATCH_ROWS: usize = 8192;

/// Header names and rows of text from a parquet file. `check_headers` runs
/// on the schema before any row group is decoded.
pub fn read_parquet<F>(path: &Path, check_headers: F) -> Result<(Vec<String>, Vec<Vec<String>>)>
where
    F: FnOnce(&[String]) -> Result<()>,
{
    let file = File::open(path)
        .with_context(|| format!("failed to open position file {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("failed to read parquet metadata of {}", path.display()))?;

    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    check_headers(&headers)?;

    let reader = builder.with_batch_size(READ_BATCH_ROWS).build()?;
    let options = FormatOptions::default();

    let mut rows = Vec::new();
    for maybe_batch in reader {
        let batch =
            maybe_batch.with_context(|| format!("failed to decode {}", path.display()))?;
        let columns = batch.columns();
        let formatters = columns
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..batch.num_rows() {
            let row = columns
                .iter()
                .zip(&formatters)
                .map(|(column, fmt)| {
                    if column.is_null(i) {
                        String::new()
                    } else {
                        fmt.value(i).to_string()
                    }
                })
                .collect();
            rows.push(row);
        }
    }

    Ok((headers, rows))
}
