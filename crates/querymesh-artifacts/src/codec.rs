//! `ResultFrame` <-> parquet bytes conversion (spec §4.5 "format is columnar
//! (parquet)").

use crate::error::ArtifactError;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use querymesh_core::{ColumnSpec, ResultFrame};
use std::sync::Arc;

fn arrow_type_for(column: &ColumnSpec) -> DataType {
    match column.data_type.as_str() {
        "integer" | "int" | "bigint" => DataType::Int64,
        "float" | "double" | "numeric" => DataType::Float64,
        "boolean" | "bool" => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn build_column(column: &ColumnSpec, column_index: usize, rows: &[Vec<serde_json::Value>]) -> ArrayRef {
    match arrow_type_for(column) {
        DataType::Int64 => Arc::new(Int64Array::from_iter(rows.iter().map(|row| {
            row.get(column_index).and_then(serde_json::Value::as_i64)
        }))) as ArrayRef,
        DataType::Float64 => Arc::new(Float64Array::from_iter(rows.iter().map(|row| {
            row.get(column_index).and_then(serde_json::Value::as_f64)
        }))) as ArrayRef,
        DataType::Boolean => Arc::new(BooleanArray::from_iter(rows.iter().map(|row| {
            row.get(column_index).and_then(serde_json::Value::as_bool)
        }))) as ArrayRef,
        _ => Arc::new(StringArray::from_iter(rows.iter().map(|row| {
            row.get(column_index).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }))) as ArrayRef,
    }
}

/// Encodes a successful [`ResultFrame`] as parquet bytes. Encoding is a pure
/// function of `frame.columns`/`frame.rows`: identical content always
/// produces identical bytes, which is what lets the artifact store derive a
/// stable `content_hash` (spec §8 property 2).
pub fn encode_result_frame(frame: &ResultFrame) -> Result<Vec<u8>, ArtifactError> {
    let fields: Vec<Field> = frame
        .columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type_for(c), true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let arrays: Vec<ArrayRef> = frame
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| build_column(c, i, &frame.rows))
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| ArtifactError::EncodeFailed(e.to_string()))?;

    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)
            .map_err(|e| ArtifactError::EncodeFailed(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| ArtifactError::EncodeFailed(e.to_string()))?;
        writer.close().map_err(|e| ArtifactError::EncodeFailed(e.to_string()))?;
    }
    Ok(buffer)
}

/// Decodes parquet bytes back into a successful [`ResultFrame`].
pub fn decode_result_frame(bytes: Vec<u8>) -> Result<ResultFrame, ArtifactError> {
    let bytes = bytes::Bytes::from(bytes);
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .map_err(|e| ArtifactError::DecodeFailed(e.to_string()))?;
    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| ArtifactError::DecodeFailed(e.to_string()))?;

    let columns: Vec<ColumnSpec> = schema
        .fields()
        .iter()
        .map(|f| ColumnSpec {
            name: f.name().clone(),
            data_type: f.data_type().to_string(),
        })
        .collect();

    let mut rows: Vec<Vec<serde_json::Value>> = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| ArtifactError::DecodeFailed(e.to_string()))?;
        for row_idx in 0..batch.num_rows() {
            let mut row = Vec::with_capacity(batch.num_columns());
            for col_idx in 0..batch.num_columns() {
                row.push(cell_to_json(batch.column(col_idx), row_idx));
            }
            rows.push(row);
        }
    }

    Ok(ResultFrame::success(columns, rows))
}

fn cell_to_json(array: &ArrayRef, row_idx: usize) -> serde_json::Value {
    use arrow::array::Array;
    if array.is_null(row_idx) {
        return serde_json::Value::Null;
    }
    if let Some(a) = array.as_any().downcast_ref::<Int64Array>() {
        return serde_json::json!(a.value(row_idx));
    }
    if let Some(a) = array.as_any().downcast_ref::<Float64Array>() {
        return serde_json::json!(a.value(row_idx));
    }
    if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
        return serde_json::json!(a.value(row_idx));
    }
    if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
        return serde_json::json!(a.value(row_idx));
    }
    serde_json::Value::Null
}
