//! Reads experimental time-series data from comma- or tab-separated files.
//!
//! The file must have a header row and a time column named `t`, `time` or `Time`.
//! Every other column is an observable whose header should match the id of a state
//! species of the model. Empty cells are treated as missing measurements.

use std::path::{Path, PathBuf};

use polars::prelude::*;

use super::error::TabularError;

/// Accepted names of the time column, in order of preference
pub const TIME_COLUMNS: [&str; 3] = ["t", "time", "Time"];

/// Field separator of a data file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    /// Picks the delimiter from the file extension (`.csv` or `.tsv`)
    pub fn from_path(path: &Path) -> Result<Self, TabularError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(Delimiter::Comma),
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => Ok(Delimiter::Tab),
            _ => Err(TabularError::UnsupportedExtension(path.to_path_buf())),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }

    /// Julia character literal of the delimiter
    pub fn julia_literal(&self) -> &'static str {
        match self {
            Delimiter::Comma => "','",
            Delimiter::Tab => "'\\t'",
        }
    }
}

/// A measured column of the data file
#[derive(Debug, Clone, PartialEq)]
pub struct Observable {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Observable {
    /// Number of measured (non-missing) values
    pub fn measured(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }
}

/// Experimental time series read from a data file
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesData {
    pub delimiter: Delimiter,
    pub time_column: String,
    pub time: Vec<f64>,
    pub observables: Vec<Observable>,
}

impl TimeSeriesData {
    /// Names of the observable columns in file order
    pub fn observable_names(&self) -> Vec<&str> {
        self.observables.iter().map(|o| o.name.as_str()).collect()
    }

    /// Looks up an observable by column name
    pub fn observable(&self, name: &str) -> Option<&Observable> {
        self.observables.iter().find(|o| o.name == name)
    }
}

/// Reads a CSV or TSV time-series file
///
/// # Arguments
///
/// * `path` - Path to a `.csv` or `.tsv` file with a header row
///
/// # Returns
///
/// The parsed time series, or an error if the file is not a valid data file
pub fn read_time_series(path: impl AsRef<Path>) -> Result<TimeSeriesData, TabularError> {
    let path = path.as_ref();
    let delimiter = Delimiter::from_path(path)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|options| options.with_separator(delimiter.as_byte()))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()?;

    from_dataframe(&df, delimiter)
}

fn from_dataframe(df: &DataFrame, delimiter: Delimiter) -> Result<TimeSeriesData, TabularError> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let time_column = TIME_COLUMNS
        .iter()
        .find(|name| columns.iter().any(|column| column == *name))
        .map(|name| name.to_string())
        .ok_or_else(|| TabularError::MissingTimeColumn {
            expected: TIME_COLUMNS.join(", "),
        })?;

    let time = numeric_column(df, &time_column)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| value.ok_or(TabularError::MissingTime { row: row + 1 }))
        .collect::<Result<Vec<f64>, _>>()?;

    if time.len() < 2 {
        return Err(TabularError::TooFewRows(time.len()));
    }

    if let Some(row) = time.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(TabularError::NonIncreasingTime { row: row + 2 });
    }

    let observables = columns
        .iter()
        .filter(|column| **column != time_column)
        .map(|column| {
            Ok(Observable {
                name: column.clone(),
                values: numeric_column(df, column)?,
            })
        })
        .collect::<Result<Vec<_>, TabularError>>()?;

    if observables.is_empty() {
        return Err(TabularError::NoObservables);
    }

    Ok(TimeSeriesData {
        delimiter,
        time_column,
        time,
        observables,
    })
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, TabularError> {
    let non_numeric = || TabularError::NonNumeric {
        column: name.to_string(),
    };

    let series = df.column(name)?;
    let values = series
        .strict_cast(&DataType::Float64)
        .map_err(|_| non_numeric())?;
    let values = values.f64().map_err(|_| non_numeric())?;

    Ok(values.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_data(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_csv_fixture() {
        let data = read_time_series("tests/data/ensa_data.csv").unwrap();

        assert_eq!(data.delimiter, Delimiter::Comma);
        assert_eq!(data.time_column, "t");
        assert_eq!(data.time, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(data.observable_names(), vec!["Ensa", "pEnsa"]);
        assert_eq!(data.observable("pEnsa").unwrap().values[1], Some(0.18));
    }

    #[test]
    fn test_read_tsv_with_missing_values() {
        let file = write_data(".tsv", "time\tA\tB\n0\t1.0\t\n1\t0.5\t0.2\n2\t\t0.4\n");
        let data = read_time_series(file.path()).unwrap();

        assert_eq!(data.delimiter, Delimiter::Tab);
        assert_eq!(data.time_column, "time");
        assert_eq!(data.observable("A").unwrap().values, vec![Some(1.0), Some(0.5), None]);
        assert_eq!(data.observable("B").unwrap().measured(), 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_data(".txt", "t,A\n0,1\n1,2\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::UnsupportedExtension(_))));
    }

    #[test]
    fn test_missing_time_column() {
        let file = write_data(".csv", "x,A\n0,1\n1,2\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::MissingTimeColumn { .. })));
    }

    #[test]
    fn test_non_increasing_time() {
        let file = write_data(".csv", "t,A\n0,1\n2,2\n1,3\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::NonIncreasingTime { row: 3 })));
    }

    #[test]
    fn test_too_few_rows() {
        let file = write_data(".csv", "t,A\n0,1\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::TooFewRows(1))));
    }

    #[test]
    fn test_non_numeric_column() {
        let file = write_data(".csv", "t,A\n0,low\n1,high\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::NonNumeric { column }) if column == "A"));
    }

    #[test]
    fn test_no_observables() {
        let file = write_data(".csv", "t\n0\n1\n");
        let result = read_time_series(file.path());
        assert!(matches!(result, Err(TabularError::NoObservables)));
    }
}
