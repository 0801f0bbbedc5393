use polars::prelude::*;
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// A single cell as loaded from the worksheet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Empty,
}

impl Value {
    /// String form used for equality filters and dropdown options.
    /// Whole floats lose their fraction so `2020.0` and `2020` compare equal.
    pub fn normalized(&self) -> String {
        match self {
            Value::Text(s) => s.trim().to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{f:.0}"),
            Value::Float(f) => f.to_string(),
            Value::Empty => String::new(),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s.replace("\r\n", " ↵ ").replace('\n', " ↵ ")),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Empty => write!(f, "∅"),
        }
    }
}

/// One record. Cells are stored in the table's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Value>,
}

impl Row {
    pub fn new(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    pub fn get(&self, column_idx: usize) -> &Value {
        self.cells.get(column_idx).unwrap_or(&Value::Empty)
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Converts a collected frame into a table. Columns are converted in
    /// parallel and then stitched into rows.
    pub fn from_frame(name: impl Into<String>, df: &DataFrame) -> Result<Self, PolarsError> {
        let start_time = Instant::now();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        let converted: Result<Vec<Vec<Value>>, PolarsError> = names
            .par_iter()
            .map(|name| Self::load_column(df, name))
            .collect();
        let columns = converted?;

        let nrows = df.height();
        let rows = (0..nrows)
            .map(|ridx| {
                Row::new(
                    columns
                        .iter()
                        .map(|c| c.get(ridx).cloned().unwrap_or(Value::Empty))
                        .collect(),
                )
            })
            .collect::<Vec<Row>>();

        info!(
            "Converted {} rows x {} columns in {}ms",
            nrows,
            names.len(),
            start_time.elapsed().as_millis()
        );
        Ok(Self::new(name, names, rows))
    }

    fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<Value>, PolarsError> {
        let column = df.column(col_name)?;
        let dtype = column.dtype().clone();
        debug!("Column \"{col_name}\": {dtype:?}");

        let values: Vec<Value> = if Self::is_integer_type(&dtype) {
            let cast = column.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(Value::Int).unwrap_or(Value::Empty))
                .collect()
        } else if Self::is_float_type(&dtype) {
            let cast = column.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.map(Value::Float).unwrap_or(Value::Empty))
                .collect()
        } else {
            let cast = column.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| match v {
                    Some(s) if !s.is_empty() => Value::Text(s.to_string()),
                    _ => Value::Empty,
                })
                .collect()
        };
        Ok(values)
    }

    fn is_integer_type(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    fn is_float_type(dtype: &DataType) -> bool {
        matches!(dtype, DataType::Float32 | DataType::Float64)
    }
}
