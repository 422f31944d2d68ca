//! Parquet read/write for event tables

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int8Array, Int16Array, Int32Array, Int64Array,
    UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use pfc_core::{Error, Result};

use crate::table::EventTable;

fn parquet_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Format(format!("{context}: {err}"))
}

/// Append a numeric Arrow column to `out` as `f64`. Null cells are an error.
fn extend_f64(name: &str, col: &ArrayRef, out: &mut Vec<f64>) -> Result<()> {
    if col.null_count() > 0 {
        let row = (0..col.len()).find(|&i| col.is_null(i)).unwrap_or(0);
        return Err(Error::Format(format!(
            "column '{name}': {} null value(s), first at batch row {row}",
            col.null_count()
        )));
    }
    macro_rules! promote {
        ($ty:ty) => {{
            let arr = col
                .as_any()
                .downcast_ref::<$ty>()
                .ok_or_else(|| Error::Format(format!("column '{name}': bad array type")))?;
            out.extend(arr.values().iter().map(|&v| v as f64));
        }};
    }
    match col.data_type() {
        DataType::Float64 => promote!(Float64Array),
        DataType::Float32 => promote!(Float32Array),
        DataType::Int64 => promote!(Int64Array),
        DataType::Int32 => promote!(Int32Array),
        DataType::Int16 => promote!(Int16Array),
        DataType::Int8 => promote!(Int8Array),
        DataType::UInt64 => promote!(UInt64Array),
        DataType::UInt32 => promote!(UInt32Array),
        DataType::UInt16 => promote!(UInt16Array),
        DataType::UInt8 => promote!(UInt8Array),
        other => {
            return Err(Error::Format(format!("column '{name}' has unsupported type {other:?}")));
        }
    }
    Ok(())
}

/// Read the requested columns of a Parquet file.
///
/// An empty `columns` slice reads every column.
pub fn read_parquet(path: &Path, columns: &[&str]) -> Result<EventTable> {
    let file = File::open(path)?;
    let context = format!("reading {}", path.display());
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(&context, e))?;

    let arrow_schema = builder.schema().clone();
    let wanted: Vec<String> = if columns.is_empty() {
        arrow_schema.fields().iter().map(|f| f.name().clone()).collect()
    } else {
        columns.iter().map(|c| c.to_string()).collect()
    };
    let mut roots = Vec::with_capacity(wanted.len());
    for name in &wanted {
        let idx = arrow_schema.index_of(name).map_err(|_| Error::MissingColumn(name.clone()))?;
        roots.push(idx);
    }
    let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
    let reader = builder.with_projection(mask).build().map_err(|e| parquet_err(&context, e))?;

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); wanted.len()];
    for batch in reader {
        let batch = batch.map_err(|e| parquet_err(&context, e))?;
        let schema = batch.schema();
        for (name, out) in wanted.iter().zip(values.iter_mut()) {
            let idx = schema.index_of(name).map_err(|_| Error::MissingColumn(name.clone()))?;
            extend_f64(name, batch.column(idx), out)?;
        }
    }

    EventTable::from_columns(wanted.into_iter().zip(values))
}

/// Write a table as Snappy-compressed Parquet with `Float32` columns.
pub fn write_parquet(path: &Path, table: &EventTable) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }

    let fields: Vec<Field> =
        table.columns().iter().map(|n| Field::new(n, DataType::Float32, false)).collect();
    let arrays: Vec<ArrayRef> = table
        .iter()
        .map(|(_, v)| Arc::new(Float32Array::from_iter_values(v.iter().map(|&x| x as f32))) as ArrayRef)
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let context = format!("writing {}", path.display());

    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();
    let file = File::create(path)?;
    let mut writer =
        ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(|e| parquet_err(&context, e))?;
    if !arrays.is_empty() {
        let batch = RecordBatch::try_new(schema, arrays).map_err(|e| parquet_err(&context, e))?;
        writer.write(&batch).map_err(|e| parquet_err(&context, e))?;
    }
    writer.close().map_err(|e| parquet_err(&context, e))?;
    Ok(())
}

/// Write mixed-precision columns: `Int32` for `int_columns`, `Float32` otherwise.
///
/// Used to produce ntuples with the same physical schema as the ntuplizer.
pub fn write_ntuple_parquet(path: &Path, table: &EventTable, int_columns: &[&str]) -> Result<()> {
    let mut fields = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();
    for (name, v) in table.iter() {
        if int_columns.contains(&name) {
            fields.push(Field::new(name, DataType::Int32, false));
            arrays.push(Arc::new(Int32Array::from_iter_values(v.iter().map(|&x| x as i32))));
        } else {
            fields.push(Field::new(name, DataType::Float32, false));
            arrays.push(Arc::new(Float32Array::from_iter_values(v.iter().map(|&x| x as f32))));
        }
    }
    let schema = Arc::new(Schema::new(fields));
    let context = format!("writing {}", path.display());
    let props = WriterProperties::builder().set_compression(Compression::SNAPPY).build();
    let file = File::create(path)?;
    let mut writer =
        ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(|e| parquet_err(&context, e))?;
    let batch = RecordBatch::try_new(schema, arrays).map_err(|e| parquet_err(&context, e))?;
    writer.write(&batch).map_err(|e| parquet_err(&context, e))?;
    writer.close().map_err(|e| parquet_err(&context, e))?;
    Ok(())
}
