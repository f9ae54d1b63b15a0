use crate::config::PipelineConfig;
use crate::error::Result;
use crate::schema::{Cell, Worksheet};
use crate::utils::{extract_month_label, normalize_year_header};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::OnceLock;

pub const FILE_NAME_COLUMN: &str = "FileName";
pub const USER_EMAIL_COLUMN: &str = "UserEmail";

/// Rows with fewer populated cells than this are blank lines on the sheet
/// (FileName and UserEmail are always populated by the import).
const MIN_POPULATED_CELLS: usize = 3;

fn workbook_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^.*\\(.*)\.xls[xm]?.[|]*\W*(.*)\$").expect("workbook path pattern is valid")
    })
}

fn user_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*([ex]\d{3,7})@[^@\s]+$").expect("user id pattern is valid"))
}

/// Who submitted the sheet and where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionInfo {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub workbook_name: Option<String>,
    pub load_sheet_name: Option<String>,
}

impl SubmissionInfo {
    /// Reads the import metadata carried on the first data row.
    ///
    /// `FileName` holds the workbook path with the sheet appended
    /// (`C:\dir\Plan.xlsx|||Sheet1$`); `UserEmail` is the submitter address.
    pub fn from_worksheet(sheet: &Worksheet, config: &PipelineConfig) -> Self {
        let row = if sheet.height() > 1 { 1 } else { 0 };
        let path = sheet
            .column_index(FILE_NAME_COLUMN)
            .map(|col| sheet.cell(row, col).to_text())
            .unwrap_or_default();
        let email = sheet
            .column_index(USER_EMAIL_COLUMN)
            .map(|col| sheet.cell(row, col).to_text())
            .filter(|e| !e.is_empty());

        let mut info = Self::parse(&path, email.as_deref());
        if let Some(email) = &info.user_email {
            if config.forces_fallback(email) {
                info.user_email = Some(config.fallback_recipient.clone());
            }
        }
        info
    }

    pub fn parse(path: &str, email: Option<&str>) -> Self {
        let (workbook_name, load_sheet_name) = match workbook_path_regex().captures(path) {
            Some(caps) => (
                caps.get(1).map(|m| m.as_str().to_string()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };
        let user_id = email
            .and_then(|e| user_id_regex().captures(e))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        Self {
            user_id,
            user_email: email.map(str::to_string),
            workbook_name,
            load_sheet_name,
        }
    }

    pub fn workbook(&self) -> &str {
        self.workbook_name.as_deref().unwrap_or("")
    }

    pub fn load_sheet(&self) -> &str {
        self.load_sheet_name.as_deref().unwrap_or("")
    }

    pub fn user(&self) -> &str {
        self.user_id.as_deref().unwrap_or("")
    }

    /// Name under which reports about this submission are filed.
    pub fn enhanced_file_name(&self) -> String {
        format!("{}_{}_{}.txt", self.user(), self.workbook(), self.load_sheet())
    }
}

/// Reads a load sheet export. Blank fields become [`Cell::Empty`], numeric
/// fields become numbers, everything else is text.
pub fn read_worksheet_csv<R: Read>(reader: R) -> Result<Worksheet> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut row: Vec<Cell> = record.iter().map(parse_field).collect();
        row.resize(headers.len(), Cell::Empty);
        rows.push(row);
    }

    Ok(Worksheet::new(headers, rows))
}

fn parse_field(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Empty
    } else if let Ok(number) = field.trim().parse::<f64>() {
        Cell::Number(number)
    } else {
        Cell::Text(field.to_string())
    }
}

/// Reads the capacity account list: one account code per record, first column.
pub fn read_capacity_accounts<R: Read>(reader: R) -> Result<BTreeSet<String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut accounts = BTreeSet::new();
    for record in csv_reader.records() {
        let record = record?;
        if let Some(account) = record.get(0).map(str::trim).filter(|a| !a.is_empty()) {
            accounts.insert(account.to_string());
        }
    }
    Ok(accounts)
}

/// Tidies a raw sheet before layout validation.
///
/// Drops blank rows and columns, fills empty cells when the headers follow the
/// template (dimension cells get `""`, value cells get `0`), applies the
/// forced-fallback email rule and normalizes year headers and month labels.
pub fn prepare_worksheet(sheet: &Worksheet, config: &PipelineConfig) -> Worksheet {
    let rows: Vec<Vec<Cell>> = sheet
        .rows
        .iter()
        .filter(|row| row.iter().filter(|c| !c.is_empty()).count() >= MIN_POPULATED_CELLS)
        .cloned()
        .collect();

    let kept_columns: Vec<usize> = (0..sheet.width())
        .filter(|col| rows.iter().any(|row| row.get(*col).is_some_and(|c| !c.is_empty())))
        .collect();

    let mut prepared = Worksheet::new(
        kept_columns
            .iter()
            .map(|col| sheet.headers[*col].clone())
            .collect(),
        rows.iter()
            .map(|row| {
                kept_columns
                    .iter()
                    .map(|col| row.get(*col).cloned().unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect(),
    );
    debug!(
        "Sheet shape {}x{} -> {}x{} after dropping blank rows and columns",
        sheet.height(),
        sheet.width(),
        prepared.height(),
        prepared.width()
    );

    if follows_template_headers(&prepared.headers) {
        for row in prepared.rows.iter_mut() {
            for (col, cell) in row.iter_mut().enumerate() {
                if cell.is_empty() {
                    *cell = if col < 9 {
                        Cell::Text(String::new())
                    } else {
                        Cell::Number(0.0)
                    };
                }
            }
        }
    }

    if let Some(col) = prepared.column_index(USER_EMAIL_COLUMN) {
        let row = if prepared.height() > 1 { 1 } else { 0 };
        let email = prepared.cell(row, col).to_text();
        if config.forces_fallback(&email) {
            warn!(
                "UserEmail '{}' was forced to {}",
                email, config.fallback_recipient
            );
            for row in prepared.rows.iter_mut() {
                if let Some(cell) = row.get_mut(col) {
                    *cell = Cell::Text(config.fallback_recipient.clone());
                }
            }
        }
    }

    normalize_period_headers(&mut prepared);
    prepared
}

fn follows_template_headers(headers: &[String]) -> bool {
    headers.first().map(String::as_str) == Some("F1")
        && headers.get(8).map(String::as_str) == Some("F9")
        && headers.get(9).is_some_and(|h| h.starts_with("FY"))
}

fn normalize_period_headers(sheet: &mut Worksheet) {
    for col in 0..sheet.width() {
        let Some(header) = normalize_year_header(&sheet.headers[col]) else {
            continue;
        };
        sheet.headers[col] = header;

        let label = sheet.cell(0, col).to_text();
        match extract_month_label(&label) {
            Some(month) => {
                if let Some(cell) = sheet.rows.get_mut(0).and_then(|r| r.get_mut(col)) {
                    *cell = Cell::text(month);
                }
            }
            None => debug!("No month label match on '{}'", label),
        }
    }
}
