//! Upload parser: CSV / XLSX / XLS bytes into task records.
//!
//! The first row is the header. Columns are looked up by name (`FirstName`,
//! `Phone`, `Notes`), so column order and extra columns do not matter. Rows
//! without a first name or phone are dropped and counted, never reported as
//! errors.

use super::PipelineError;
use super::record::{CellValue, RawRecord, TaskRecord};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use std::io::Cursor;
use std::str::FromStr;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Format from an uploaded file name, by extension.
    pub fn from_filename(name: &str) -> Result<Self, PipelineError> {
        match name.rsplit_once('.') {
            Some((_, ext)) => ext.parse(),
            None => Err(PipelineError::UnsupportedFormat(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xls => "xls",
        }
    }
}

impl FromStr for FileFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            _ => Err(PipelineError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parser output: retained tasks in file order plus the dropped-row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedUpload {
    pub tasks: Vec<TaskRecord>,
    pub dropped: usize,
}

/// Parse `bytes` as the declared format (`csv`, `xlsx` or `xls`).
pub fn parse_upload(bytes: &[u8], declared: &str) -> Result<ParsedUpload, PipelineError> {
    let format: FileFormat = declared.parse()?;
    parse_as(bytes, format)
}

/// Parse `bytes` with an already-validated format.
pub fn parse_as(bytes: &[u8], format: FileFormat) -> Result<ParsedUpload, PipelineError> {
    let rows = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Xlsx => {
            let workbook: Xlsx<_> = open_workbook(bytes, format)?;
            read_first_sheet(workbook, format)?
        }
        FileFormat::Xls => {
            let workbook: Xls<_> = open_workbook(bytes, format)?;
            read_first_sheet(workbook, format)?
        }
    };

    let total = rows.len();
    let tasks: Vec<TaskRecord> = rows.iter().filter_map(TaskRecord::from_raw).collect();
    let dropped = total - tasks.len();
    if dropped > 0 {
        tracing::warn!("parser[{format}]: dropped {dropped} of {total} rows missing FirstName or Phone");
    }
    Ok(ParsedUpload { tasks, dropped })
}

fn parse_failure(format: FileFormat, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ParseFailure {
        format,
        reason: e.to_string(),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<RawRecord>, PipelineError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| parse_failure(FileFormat::Csv, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| parse_failure(FileFormat::Csv, e))?;
        let mut raw = RawRecord::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            raw.push(name.clone(), CellValue::Text(value.to_string()));
        }
        rows.push(raw);
    }
    Ok(rows)
}

fn open_workbook<'a, R>(bytes: &'a [u8], format: FileFormat) -> Result<R, PipelineError>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: std::fmt::Display,
{
    R::new(Cursor::new(bytes)).map_err(|e| parse_failure(format, e))
}

fn read_first_sheet<'a, R>(mut workbook: R, format: FileFormat) -> Result<Vec<RawRecord>, PipelineError>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: std::fmt::Display,
{
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_failure(format, "workbook has no worksheets"))?
        .map_err(|e| parse_failure(format, e))?;
    Ok(sheet_records(&range))
}

/// Header row names every column; blank cells are left out of the record.
fn sheet_records(range: &Range<Data>) -> Vec<RawRecord> {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| CellValue::from(cell).normalize())
        .collect();

    rows.filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| {
            let mut raw = RawRecord::new();
            for (name, cell) in headers.iter().zip(row.iter()) {
                if name.is_empty() || matches!(cell, Data::Empty) {
                    continue;
                }
                raw.push(name.clone(), CellValue::from(cell));
            }
            raw
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn xlsx_fixture(build: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        build(sheet);
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_format_from_filename() {
        assert_eq!(FileFormat::from_filename("leads.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("Leads.XLSX").unwrap(), FileFormat::Xlsx);
        assert_eq!(FileFormat::from_filename("old.report.xls").unwrap(), FileFormat::Xls);
        assert!(matches!(
            FileFormat::from_filename("notes.txt"),
            Err(PipelineError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            FileFormat::from_filename("no-extension"),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_unsupported_declared_format() {
        let err = parse_upload(b"FirstName,Phone\nAna,555\n", "json").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat(f) if f == "json"));
    }

    #[test]
    fn test_csv_drops_incomplete_rows() {
        let csv = "FirstName,Phone,Notes\n\
                   Ana,555-0100,VIP\n\
                   Bo,,no phone\n\
                   ,555-0102,no name\n\
                   Cy,  555-0103 ,\n\
                   Di,555-0104\n";
        let parsed = parse_upload(csv.as_bytes(), "csv").unwrap();
        assert_eq!(parsed.dropped, 2);
        let names: Vec<&str> = parsed.tasks.iter().map(|t| t.first_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cy", "Di"]);
        assert_eq!(parsed.tasks[1].phone, "555-0103");
        assert_eq!(parsed.tasks[2].notes, "");
    }

    #[test]
    fn test_csv_whitespace_only_fields_are_blank() {
        let parsed = parse_upload(b"FirstName,Phone\n   ,555\nAna,   \n", "csv").unwrap();
        assert!(parsed.tasks.is_empty());
        assert_eq!(parsed.dropped, 2);
    }

    #[test]
    fn test_csv_column_order_and_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"Notes, Phone ,FirstName,Extra\nhello,555,Ana,x\n");
        let parsed = parse_upload(&bytes, "CSV").unwrap();
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].first_name, "Ana");
        assert_eq!(parsed.tasks[0].phone, "555");
        assert_eq!(parsed.tasks[0].notes, "hello");
    }

    #[test]
    fn test_csv_invalid_utf8_is_parse_failure() {
        let err = parse_upload(b"FirstName,Phone\n\xff\xfe,555\n", "csv").unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure { format: FileFormat::Csv, .. }));
    }

    #[test]
    fn test_empty_csv_yields_no_tasks() {
        let parsed = parse_upload(b"", "csv").unwrap();
        assert!(parsed.tasks.is_empty());
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn test_xlsx_numeric_phone_is_stringified() {
        let bytes = xlsx_fixture(|sheet| {
            sheet.write_string(0, 0, "FirstName").unwrap();
            sheet.write_string(0, 1, "Phone").unwrap();
            sheet.write_string(0, 2, "Notes").unwrap();
            sheet.write_string(1, 0, "Ana").unwrap();
            sheet.write_number(1, 1, 5551234567.0).unwrap();
            sheet.write_number(1, 2, 42.0).unwrap();
        });
        let parsed = parse_upload(&bytes, "xlsx").unwrap();
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].phone, "5551234567");
        assert_eq!(parsed.tasks[0].notes, "42");
    }

    #[test]
    fn test_xlsx_skips_blank_and_incomplete_rows() {
        let bytes = xlsx_fixture(|sheet| {
            sheet.write_string(0, 0, "FirstName").unwrap();
            sheet.write_string(0, 1, "Phone").unwrap();
            sheet.write_string(1, 0, "Ana").unwrap();
            sheet.write_string(1, 1, "555-0100").unwrap();
            sheet.write_string(2, 0, "Bo").unwrap();
            // row 3 left empty
            sheet.write_string(4, 0, " Cy ").unwrap();
            sheet.write_number(4, 1, 5550104.0).unwrap();
        });
        let parsed = parse_upload(&bytes, "xlsx").unwrap();
        let names: Vec<&str> = parsed.tasks.iter().map(|t| t.first_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cy"]);
        assert_eq!(parsed.tasks[1].phone, "5550104");
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn test_corrupt_workbook_is_parse_failure() {
        let err = parse_upload(b"definitely not a zip archive", "xlsx").unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure { format: FileFormat::Xlsx, .. }));

        let err = parse_upload(b"definitely not an ole file", "xls").unwrap_err();
        assert!(matches!(err, PipelineError::ParseFailure { format: FileFormat::Xls, .. }));
    }
}
