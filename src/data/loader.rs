use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{RawRow, RawTable, RawValue};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a raw vehicle table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row; `;` or `,` delimited (sniffed from the header)
/// * `.json`    – `[{ "Make": "Honda", "Year": 2015, ... }, ...]`
/// * `.parquet` – flat scalar columns
pub fn load_table(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" | "txt" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "Loaded {} rows with {} columns from {}",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// The EPA export is `;`-separated, the sports table `,`-separated.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path).context("opening CSV")?;
    let mut header = String::new();
    BufReader::new(file)
        .read_line(&mut header)
        .context("reading CSV header line")?;
    let semis = header.matches(';').count();
    let commas = header.matches(',').count();
    Ok(if semis > commas { b';' } else { b',' })
}

fn load_csv(path: &Path) -> Result<RawTable> {
    let delimiter = sniff_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;

    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(col_idx, name)| {
                let cell = record.get(col_idx).map(guess_cell_type).unwrap_or(RawValue::Null);
                (name.clone(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawTable::from_rows(rows))
}

fn guess_cell_type(s: &str) -> RawValue {
    let s = s.trim();
    if s.is_empty() {
        return RawValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return RawValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return RawValue::Float(f);
    }
    if s == "true" || s == "false" {
        return RawValue::Bool(s == "true");
    }
    RawValue::Text(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented array, the default `df.to_json(orient='records')`.
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let row: RawRow = obj
            .iter()
            .map(|(key, val)| (key.clone(), json_to_cell(val)))
            .collect();
        rows.push(row);
    }

    Ok(RawTable::from_rows(rows))
}

fn json_to_cell(val: &JsonValue) -> RawValue {
    match val {
        JsonValue::String(s) => RawValue::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                RawValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                RawValue::Float(f)
            } else {
                RawValue::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => RawValue::Bool(*b),
        JsonValue::Null => RawValue::Null,
        other => RawValue::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Every column becomes a raw cell; nested types are rendered as text.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let names: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

        for row in 0..batch.num_rows() {
            let raw: RawRow = names
                .iter()
                .enumerate()
                .map(|(col_idx, name)| (name.clone(), extract_cell(batch.column(col_idx), row)))
                .collect();
            rows.push(raw);
        }
    }

    Ok(RawTable::from_rows(rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> RawValue {
    if col.is_null(row) {
        return RawValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => RawValue::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => RawValue::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => RawValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => RawValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => RawValue::Float(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => RawValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => RawValue::Bool(col.as_boolean().value(row)),
        _ => array_value_to_string(col, row)
            .map(RawValue::Text)
            .unwrap_or(RawValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{body}").unwrap();
        path
    }

    #[test]
    fn test_semicolon_csv() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "epa.csv",
            "Make;Model;Year;Fuel Type;Combined Mpg For Fuel Type1;Co2  Tailpipe For Fuel Type1\n\
             Honda;Civic;2015;Regular;33;269\n\
             Nissan;Leaf;2016;Electricity;112;\n",
        );
        let table = load_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("Year"), Some(&RawValue::Integer(2015)));
        assert_eq!(
            table.rows[1].get("Fuel Type"),
            Some(&RawValue::Text("Electricity".into()))
        );
        assert_eq!(
            table.rows[1].get("Co2  Tailpipe For Fuel Type1"),
            Some(&RawValue::Null)
        );
    }

    #[test]
    fn test_comma_csv_with_quoted_numbers() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "sports.csv",
            "Car Make,Car Model,Year,Price (in USD)\nPorsche,911,2022,\"101,200\"\n",
        );
        let table = load_table(&path).unwrap();
        assert_eq!(
            table.rows[0].get("Price (in USD)"),
            Some(&RawValue::Text("101,200".into()))
        );
        assert_eq!(table.columns.len(), 4);
    }

    #[test]
    fn test_json_records() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "rows.json",
            r#"[{"Make": "Honda", "Year": 2015, "Horsepower (est)": 158.5, "Model": null}]"#,
        );
        let table = load_table(&path).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.get("Year"), Some(&RawValue::Integer(2015)));
        assert_eq!(row.get("Horsepower (est)"), Some(&RawValue::Float(158.5)));
        assert_eq!(row.get("Model"), Some(&RawValue::Null));
    }

    #[test]
    fn test_json_must_be_array() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "obj.json", r#"{"Make": "Honda"}"#);
        assert!(load_table(&path).is_err());
    }

    #[test]
    fn test_parquet_scalar_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("epa.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("Make", DataType::Utf8, false),
            Field::new("Year", DataType::Int64, false),
            Field::new("Combined Mpg For Fuel Type1", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["Honda", "Nissan"])),
                Arc::new(Int64Array::from(vec![2015, 2016])),
                Arc::new(Float64Array::from(vec![Some(33.0), None])),
            ],
        )
        .unwrap();
        let file = File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("Make"), Some(&RawValue::Text("Honda".into())));
        assert_eq!(table.rows[1].get("Year"), Some(&RawValue::Integer(2016)));
        assert_eq!(
            table.rows[1].get("Combined Mpg For Fuel Type1"),
            Some(&RawValue::Null)
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_table(Path::new("vehicles.xlsx")).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported"));
    }
}
