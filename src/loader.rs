//! Loading CSV, Parquet and Arrow files into [`Record`]s.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::LoadError;
use crate::value::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Parquet,
    Arrow,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
}

/// A loaded file: column names in file order and one record per row.
#[derive(Debug)]
pub struct Dataset {
    pub name: String,
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

pub fn detect_file_type(path: &Path) -> Result<FileType, LoadError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::Csv),
        Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
        _ => Err(LoadError::UnknownFileType),
    }
}

pub fn get_file_info(path: PathBuf) -> Result<FileInfo, LoadError> {
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => LoadError::FileNotFound,
        ErrorKind::PermissionDenied => LoadError::PermissionDenied,
        _ => LoadError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(LoadError::NotAFile);
    }
    let file_type = detect_file_type(&path)?;
    Ok(FileInfo {
        path,
        file_size: metadata.len(),
        file_type,
    })
}

/// Loads a whole file. Columns are converted in parallel, each row gets its
/// row number as key.
pub fn load_records(path: PathBuf) -> Result<Dataset, LoadError> {
    let file_info = get_file_info(path)?;
    debug!("Loading {:?}", file_info);
    let frame = match file_info.file_type {
        FileType::Csv => scan_csv(&file_info.path)?,
        FileType::Parquet => scan_parquet(&file_info.path)?,
        FileType::Arrow => scan_arrow(&file_info.path)?,
    };

    let start_time = Instant::now();
    let df = frame.collect()?;
    let columns: Vec<(String, Vec<Value>)> = df
        .get_column_names()
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect::<Result<_, PolarsError>>()?;
    if columns.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut records: Vec<Record> = (0..df.height())
        .map(|row| Record::with_key(row.to_string()))
        .collect();
    let mut names = Vec::with_capacity(columns.len());
    for (name, values) in columns {
        for (record, value) in records.iter_mut().zip(values) {
            record.insert(name.clone(), value);
        }
        names.push(name);
    }

    info!(
        "Loaded {} rows x {} columns in {}ms",
        records.len(),
        names.len(),
        start_time.elapsed().as_millis()
    );
    Ok(Dataset {
        name: file_info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string(),
        columns: names,
        records,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Float,
    Bool,
    Text,
}

fn kind_of(dtype: &DataType) -> Kind {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Kind::Int,
        DataType::Float32 | DataType::Float64 => Kind::Float,
        DataType::Boolean => Kind::Bool,
        _ => Kind::Text,
    }
}

fn to_value(kind: Kind, raw: &str) -> Value {
    let parsed = match kind {
        Kind::Int => raw.parse().ok().map(Value::Int),
        Kind::Float => raw.parse().ok().map(Value::Float),
        Kind::Bool => raw.parse().ok().map(Value::Bool),
        Kind::Text => None,
    };
    // u64 values past i64::MAX fall back to text.
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

fn load_column(df: &DataFrame, name: &str) -> Result<(String, Vec<Value>), PolarsError> {
    let kind = kind_of(df.column(name)?.dtype());
    let col = df.column(name)?.cast(&DataType::String)?;
    let series = col.str()?;
    let values = series
        .into_iter()
        .map(|value| match value {
            Some(raw) => to_value(kind, raw),
            None => Value::Null,
        })
        .collect();
    Ok((name.to_string(), values))
}

fn scan_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn scan_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn scan_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RowData;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_detect_file_type() {
        assert_eq!(detect_file_type(Path::new("a.csv")).unwrap(), FileType::Csv);
        assert_eq!(detect_file_type(Path::new("a.PQ")).unwrap(), FileType::Parquet);
        assert_eq!(detect_file_type(Path::new("a.feather")).unwrap(), FileType::Arrow);
        assert!(matches!(
            detect_file_type(Path::new("a.xlsx")),
            Err(LoadError::UnknownFileType)
        ));
        assert!(matches!(
            detect_file_type(Path::new("noext")),
            Err(LoadError::UnknownFileType)
        ));
    }

    #[test]
    fn test_file_info_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            get_file_info(dir.path().join("missing.csv")),
            Err(LoadError::FileNotFound)
        ));
        assert!(matches!(
            get_file_info(dir.path().to_path_buf()),
            Err(LoadError::NotAFile)
        ));
        let path = write_file(dir.path(), "data.txt", "a\n1\n");
        assert!(matches!(get_file_info(path), Err(LoadError::UnknownFileType)));
    }

    #[test]
    fn test_load_csv_keeps_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "people.csv",
            "name,age,score\nAda,36,1.5\nBob,,2\n\"Line\nbreak\",7,0.25\n",
        );
        let dataset = load_records(path).unwrap();
        assert_eq!(dataset.name, "people.csv");
        assert_eq!(dataset.columns, ["name", "age", "score"]);
        assert_eq!(dataset.records.len(), 3);

        let bob = &dataset.records[1];
        assert_eq!(bob.row_key().as_deref(), Some("1"));
        assert_eq!(bob.get("name"), Some(&Value::from("Bob")));
        assert_eq!(bob.get("age"), Some(&Value::Null));
        assert_eq!(bob.get("score"), Some(&Value::Float(2.0)));
        assert_eq!(dataset.records[0].get("age"), Some(&Value::Int(36)));
        // Raw values are kept; sanitizing happens when cells are rendered.
        assert_eq!(dataset.records[2].get("name"), Some(&Value::from("Line\nbreak")));
    }
}
