//! Results Workbook Module
//!
//! Writes the results of a fit to an xlsx workbook with one sheet per result key:
//! `x` (restart × parameter), `x_best` (parameter, value) and `states`
//! (restart × time × state).

use std::path::Path;

use polars::prelude::{AnyValue, DataFrame};
use rust_xlsxwriter::workbook::Workbook;
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Worksheet};

use super::error::TabularError;
use crate::runtime::FitRun;

/// Default column width
const DEFAULT_COLUMN_WIDTH: f64 = 20.0;

/// Border color for cells
const BORDER_COLOR: u32 = 0xB0B0B0;

/// Header background color
const HEADER_BG_COLOR: u32 = 0xD9EAD3;

impl TryFrom<&FitRun> for Workbook {
    type Error = TabularError;

    /// Converts fit results into a workbook with the sheets `x`, `x_best` and `states`
    fn try_from(run: &FitRun) -> Result<Self, Self::Error> {
        let mut workbook = Workbook::new();
        add_sheet(&mut workbook, "x", &run.x_frame()?)?;
        add_sheet(&mut workbook, "x_best", &run.x_best_frame()?)?;
        add_sheet(&mut workbook, "states", &run.states_frame()?)?;
        Ok(workbook)
    }
}

/// Writes fit results to an xlsx file, overwriting it if it exists
///
/// # Arguments
///
/// * `run` - Results of the fit
/// * `path` - Output file
pub fn write_workbook(run: &FitRun, path: &Path) -> Result<(), TabularError> {
    let mut workbook = Workbook::try_from(run)?;
    workbook.save(path)?;
    log::info!("Wrote results workbook {}", path.display());
    Ok(())
}

/// Adds a DataFrame as a worksheet to the workbook
///
/// # Arguments
///
/// * `workbook` - The Workbook to add the worksheet to
/// * `name` - Name of the worksheet
/// * `df` - The data to write, with the column names as header row
fn add_sheet(workbook: &mut Workbook, name: &str, df: &DataFrame) -> Result<(), TabularError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    // Write headers
    let header_format = get_header_format();
    for (i, column) in df.get_columns().iter().enumerate() {
        sheet.write_string_with_format(0, i as u16, column.name(), &header_format)?;
    }

    // Write data rows
    let data_format = get_non_header_format();
    for (col_idx, column) in df.iter().enumerate() {
        for (row_idx, value) in column.iter().enumerate() {
            write_cell(sheet, row_idx as u32 + 1, col_idx as u16, value, &data_format)?;
        }
    }

    // Set column widths
    for i in 0..df.width() {
        sheet.set_column_width(i as u16, DEFAULT_COLUMN_WIDTH)?;
    }

    Ok(())
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: AnyValue,
    format: &Format,
) -> Result<(), TabularError> {
    match value {
        AnyValue::Float64(value) if value.is_finite() => {
            sheet.write_number_with_format(row, col, value, format)?;
        }
        AnyValue::Int64(value) => {
            sheet.write_number_with_format(row, col, value as f64, format)?;
        }
        AnyValue::String(value) => {
            sheet.write_string_with_format(row, col, value, format)?;
        }
        AnyValue::Null | AnyValue::Float64(_) => {
            sheet.write_blank(row, col, format)?;
        }
        other => {
            sheet.write_string_with_format(row, col, other.to_string(), format)?;
        }
    }
    Ok(())
}

/// Returns a format for non-header cells
fn get_non_header_format() -> Format {
    Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_border_color(BORDER_COLOR)
}

/// Returns a format for header cells
fn get_header_format() -> Format {
    Format::new()
        .set_background_color(HEADER_BG_COLOR)
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_border_color(BORDER_COLOR)
        .set_border_bottom(FormatBorder::Double)
        .set_align(FormatAlign::VerticalCenter)
        .set_align(FormatAlign::Center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::parse_results;
    use calamine::{open_workbook, Reader, Xlsx};

    #[test]
    fn test_write_workbook() {
        let json = std::fs::read_to_string("tests/data/results_artifact.json").unwrap();
        let run = parse_results(&json).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");

        write_workbook(&run, &path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["x", "x_best", "states"]);

        let x_best = workbook.worksheet_range("x_best").unwrap();
        assert_eq!(x_best.height(), run.results.x_best.len() + 1);
    }

    #[test]
    fn test_write_workbook_with_clashing_names() {
        let run = parse_results(
            r#"{
                "t_sim": [0.0, 1.0],
                "x": {"1": {"iteration": 0.5}},
                "states": {"1": {"time": [1.0, 0.5]}}
            }"#,
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.xlsx");

        write_workbook(&run, &path).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let states = workbook.worksheet_range("states").unwrap();
        assert_eq!(states.get_size(), (3, 3));
    }
}
