//! Excel workbook with a `Data` table sheet and a `Pivot` summary sheet

use crate::error::Result;
use crate::report::{CellValue, Pivot, TabularRecord};
use rust_xlsxwriter::{ColNum, Format, RowNum, Table, TableColumn, Workbook, Worksheet, XlsxError};
use std::fs;
use std::path::Path;

/// Excel rejects longer cell strings
const MAX_CELL_CHARS: usize = 32_767;

fn clamp_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    value: &CellValue,
) -> std::result::Result<(), XlsxError> {
    match value {
        CellValue::Text(text) => {
            worksheet.write_string(row, col, clamp_text(text))?;
        }
        CellValue::Number(number) => {
            worksheet.write_number(row, col, *number)?;
        }
        CellValue::Bool(flag) => {
            worksheet.write_boolean(row, col, *flag)?;
        }
        CellValue::Empty => {}
    }
    Ok(())
}

fn write_data_sheet<R: TabularRecord>(
    worksheet: &mut Worksheet,
    records: &[R],
) -> std::result::Result<(), XlsxError> {
    let headers = R::headers();
    let header_format = Format::new().set_bold();

    worksheet.set_name("Data")?;

    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as ColNum, *header, &header_format)?;
    }

    for (index, record) in records.iter().enumerate() {
        let row = (index + 1) as RowNum;
        for (col, value) in record.row().iter().take(headers.len()).enumerate() {
            write_cell(worksheet, row, col as ColNum, value)?;
        }
    }

    // Tables need at least one data row
    if !records.is_empty() && !headers.is_empty() {
        let columns: Vec<TableColumn> = headers
            .iter()
            .map(|header| TableColumn::new().set_header(*header))
            .collect();
        let table = Table::new().set_columns(&columns);
        worksheet.add_table(
            0,
            0,
            records.len() as RowNum,
            (headers.len() - 1) as ColNum,
            &table,
        )?;
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();
    Ok(())
}

fn write_pivot_sheet(
    worksheet: &mut Worksheet,
    pivot: &Pivot,
) -> std::result::Result<(), XlsxError> {
    let bold = Format::new().set_bold();
    let total_col = (pivot.columns.len() + 1) as ColNum;

    worksheet.set_name("Pivot")?;
    worksheet.write_string_with_format(0, 0, pivot.row_label.as_str(), &bold)?;
    for (i, column) in pivot.columns.iter().enumerate() {
        worksheet.write_string_with_format(0, (i + 1) as ColNum, column.as_str(), &bold)?;
    }
    worksheet.write_string_with_format(0, total_col, "Total", &bold)?;

    for (index, (label, values)) in pivot.rows.iter().enumerate() {
        let row = (index + 1) as RowNum;
        worksheet.write_string(row, 0, clamp_text(label))?;
        for (i, value) in values.iter().enumerate() {
            worksheet.write_number(row, (i + 1) as ColNum, *value as f64)?;
        }
        let row_total: u64 = values.iter().sum();
        worksheet.write_number_with_format(row, total_col, row_total as f64, &bold)?;
    }

    let totals_row = (pivot.rows.len() + 1) as RowNum;
    worksheet.write_string_with_format(totals_row, 0, "Total", &bold)?;
    for (i, total) in pivot.column_totals().iter().enumerate() {
        worksheet.write_number_with_format(totals_row, (i + 1) as ColNum, *total as f64, &bold)?;
    }
    worksheet.write_number_with_format(totals_row, total_col, pivot.grand_total() as f64, &bold)?;

    worksheet.set_freeze_panes(1, 1)?;
    worksheet.autofit();
    Ok(())
}

/// Write the records table and its pivot summary to `path`
pub fn write_workbook<R: TabularRecord>(path: &Path, records: &[R], pivot: &Pivot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut workbook = Workbook::new();
    write_data_sheet(workbook.add_worksheet(), records)?;
    write_pivot_sheet(workbook.add_worksheet(), pivot)?;
    workbook.save(path)?;

    tracing::debug!(path = %path.display(), rows = records.len(), "Wrote workbook");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        name: String,
        done: bool,
        score: f64,
    }

    impl TabularRecord for Row {
        fn headers() -> &'static [&'static str] {
            &["Name", "Done", "Score"]
        }

        fn row(&self) -> Vec<CellValue> {
            vec![
                self.name.clone().into(),
                CellValue::Bool(self.done),
                CellValue::Number(self.score),
            ]
        }
    }

    fn pivot() -> Pivot {
        Pivot::from_pairs(
            "Name",
            &["Done"],
            vec![("a".to_string(), "Done".to_string())],
        )
    }

    #[test]
    fn test_clamp_text() {
        let long = "x".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(clamp_text(&long).chars().count(), MAX_CELL_CHARS);
        assert_eq!(clamp_text("short"), "short");
    }

    #[test]
    fn test_write_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let rows = vec![
            Row {
                name: "a".into(),
                done: true,
                score: 1.5,
            },
            Row {
                name: "b".into(),
                done: false,
                score: 0.0,
            },
        ];

        write_workbook(&path, &rows, &pivot()).unwrap();

        let bytes = fs::read(&path).unwrap();
        // xlsx files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_write_workbook_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        write_workbook::<Row>(&path, &[], &Pivot::from_pairs("Name", &[], Vec::new())).unwrap();
        assert!(path.exists());
    }
}
