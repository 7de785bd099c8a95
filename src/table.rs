//! Helpers for moving typed rows in and out of Polars frames.

use polars::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table '{table}' has no column '{column}'")]
    MissingColumn {
        table: String,
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("Column '{column}' of table '{table}' has an unexpected type")]
    ColumnType {
        table: String,
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("Null value in required column '{column}' of table '{table}' at row {row}")]
    NullValue {
        table: String,
        column: String,
        row: usize,
    },

    #[error("Invalid value '{value}' in column '{column}' of table '{table}'")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
    },

    #[error("Failed to assemble table '{table}'")]
    Build {
        table: String,
        #[source]
        source: PolarsError,
    },
}

/// Read access to the columns of one named table.
pub(crate) struct FrameReader<'a> {
    table: &'a str,
    df: &'a DataFrame,
}

impl<'a> FrameReader<'a> {
    pub fn new(table: &'a str, df: &'a DataFrame) -> Self {
        Self { table, df }
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn cast(&self, name: &str, dtype: &DataType) -> Result<Column, TableError> {
        let column = self
            .df
            .column(name)
            .map_err(|e| TableError::MissingColumn {
                table: self.table.to_string(),
                column: name.to_string(),
                source: e,
            })?;
        column.cast(dtype).map_err(|e| self.type_error(name, e))
    }

    fn type_error(&self, name: &str, source: PolarsError) -> TableError {
        TableError::ColumnType {
            table: self.table.to_string(),
            column: name.to_string(),
            source,
        }
    }

    fn null_error(&self, name: &str, row: usize) -> TableError {
        TableError::NullValue {
            table: self.table.to_string(),
            column: name.to_string(),
            row,
        }
    }

    pub fn invalid(&self, name: &str, value: impl ToString) -> TableError {
        TableError::InvalidValue {
            table: self.table.to_string(),
            column: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn strings(&self, name: &str) -> Result<Vec<Option<String>>, TableError> {
        let column = self.cast(name, &DataType::String)?;
        let values = column.str().map_err(|e| self.type_error(name, e))?;
        Ok(values
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect())
    }

    pub fn required_strings(&self, name: &str) -> Result<Vec<String>, TableError> {
        self.strings(name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| value.ok_or_else(|| self.null_error(name, row)))
            .collect()
    }

    /// NaN is read back as a missing value.
    pub fn floats(&self, name: &str) -> Result<Vec<Option<f64>>, TableError> {
        let column = self.cast(name, &DataType::Float64)?;
        let values = column.f64().map_err(|e| self.type_error(name, e))?;
        Ok(values
            .into_iter()
            .map(|value| value.filter(|v| !v.is_nan()))
            .collect())
    }

    pub fn required_floats(&self, name: &str) -> Result<Vec<f64>, TableError> {
        self.floats(name)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| value.ok_or_else(|| self.null_error(name, row)))
            .collect()
    }

    pub fn required_integers(&self, name: &str) -> Result<Vec<i64>, TableError> {
        let column = self.cast(name, &DataType::Int64)?;
        let values = column.i64().map_err(|e| self.type_error(name, e))?;
        values
            .into_iter()
            .enumerate()
            .map(|(row, value)| value.ok_or_else(|| self.null_error(name, row)))
            .collect()
    }
}

pub(crate) fn build_frame(table: &str, columns: Vec<Column>) -> Result<DataFrame, TableError> {
    DataFrame::new(columns).map_err(|e| TableError::Build {
        table: table.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        build_frame(
            "sample",
            vec![
                Column::new("name".into(), vec![Some("a"), None]),
                Column::new("value".into(), vec![Some(1.5), Some(f64::NAN)]),
                Column::new("count".into(), vec![3i64, 4]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_reads_typed_columns() {
        let df = sample();
        let reader = FrameReader::new("sample", &df);
        assert_eq!(reader.height(), 2);
        assert_eq!(
            reader.strings("name").unwrap(),
            vec![Some("a".to_string()), None]
        );
        assert_eq!(reader.floats("value").unwrap(), vec![Some(1.5), None]);
        assert_eq!(reader.required_integers("count").unwrap(), vec![3, 4]);
        // Integers widen to floats on request
        assert_eq!(reader.required_floats("count").unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_reports_missing_and_null() {
        let df = sample();
        let reader = FrameReader::new("sample", &df);
        assert!(matches!(
            reader.strings("nope"),
            Err(TableError::MissingColumn { .. })
        ));
        assert!(matches!(
            reader.required_strings("name"),
            Err(TableError::NullValue { row: 1, .. })
        ));
    }
}
