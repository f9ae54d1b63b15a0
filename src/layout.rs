//! Structural sanity pass over the prepared worksheet.
//!
//! Every rule is evaluated so the user gets the complete list of problems in
//! a single report.

use crate::config::PipelineConfig;
use crate::error::{LoadSheetError, Result};
use crate::ingestion::{SubmissionInfo, FILE_NAME_COLUMN, USER_EMAIL_COLUMN};
use crate::schema::{Cell, Dimension, SheetForm, ValidationIssue, Worksheet};
use crate::utils::{is_month_label, starts_with_month_abbreviation};
use log::info;
use regex::Regex;
use std::sync::OnceLock;

pub const FORECAST_COLUMNS_RULE: &str = "ForecastColumns";

const DIMENSION_COLUMNS: usize = 9;
const COLUMN_LETTERS: [char; DIMENSION_COLUMNS] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I'];

/// Lexical shape of the six coded dimensions in columns A-F (`CC:12345` or
/// `Label (12345)` forms).
const MEMBER_PATTERNS: [(Dimension, &str); 6] = [
    (Dimension::Account, r"\D\D:\d{4,7}|.*\([HFS]?\d{4,7}\)$"),
    (Dimension::CostCenter, r"CC:\d{5}|.*\(\d{5}\)$"),
    (Dimension::InternalOrder, r"IO:\d{6}|.*\(\d{6}\)$|IO:None"),
    (Dimension::Company, r"CO:\d{4}|.*\(\d{4}\)$"),
    (Dimension::ProfitCenter, r"PC:\d{4}|.*\(\d{4}\)$"),
    (Dimension::EquipmentType, r"ET:\d{3}|.*\(\d{3}M?X?\)$|ET:None"),
];

const SCENARIO_LABELS: [&str; 2] = ["Forecast", "Actual"];
const VERSION_LABELS: [&str; 4] = ["Working", "Locked", "Final", "Current Capacity"];
const TYPE_LABELS: [&str; 2] = ["Amount", "Adjustment"];

fn member_patterns() -> &'static [(Dimension, Regex)] {
    static PATTERNS: OnceLock<Vec<(Dimension, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        MEMBER_PATTERNS
            .iter()
            .map(|(d, p)| (*d, Regex::new(p).expect("member pattern is valid")))
            .collect()
    })
}

fn unlabeled_column_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"F\d{2}").expect("unlabeled column pattern is valid"))
}

/// Rejects submissions whose workbook and sheet names are too long to be
/// used in output file names.
pub fn validate_sheet_names(info: &SubmissionInfo, config: &PipelineConfig) -> Result<()> {
    let workbook_len = info.workbook().chars().count();
    let sheet_len = info.load_sheet().chars().count();

    if workbook_len + sheet_len <= config.max_sheet_name_length {
        return Ok(());
    }

    Err(LoadSheetError::SheetName {
        issues: vec![
            ValidationIssue::new(
                "workbook_name_error",
                format!(
                    "The combined workbook and load sheet names exceed {} characters",
                    config.max_sheet_name_length
                ),
            ),
            ValidationIssue::new(
                "workbook_name_length",
                format!("Workbook name length: {}", workbook_len),
            ),
            ValidationIssue::new(
                "load_sheet_name_length",
                format!("Load sheet name length: {}", sheet_len),
            ),
        ],
    })
}

pub fn validate_layout(sheet: &Worksheet, form: SheetForm) -> Result<()> {
    let issues = match form {
        SheetForm::YearInHeader => year_in_header_issues(sheet),
        SheetForm::YearInRow => year_in_row_issues(sheet),
    };

    if issues.is_empty() {
        info!("Worksheet meets layout rules.");
        Ok(())
    } else {
        Err(LoadSheetError::Layout { issues })
    }
}

fn year_in_header_issues(sheet: &Worksheet) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (col, (dimension, pattern)) in member_patterns().iter().enumerate() {
        let matched = column_texts(sheet, col, 0).any(|text| pattern.is_match(text));
        if !matched {
            issues.push(missing_member_issue(*dimension, col));
        }
    }

    let literal_checks: [(Dimension, &[&str]); 3] = [
        (Dimension::Scenario, &SCENARIO_LABELS),
        (Dimension::Version, &VERSION_LABELS),
        (Dimension::Type, &TYPE_LABELS),
    ];
    for (offset, (dimension, labels)) in literal_checks.iter().enumerate() {
        let col = 6 + offset;
        if !column_texts(sheet, col, 0).any(|text| labels.contains(&text)) {
            issues.push(missing_member_issue(*dimension, col));
        }
    }

    if !has_template_headers(&sheet.headers) {
        issues.push(ValidationIssue::new(
            "Year",
            "The Year dimension has at least one invalid and/or missing member in Row 1.",
        ));
    }

    let empty_labels = (0..DIMENSION_COLUMNS)
        .filter(|col| sheet.cell(0, *col).is_empty_string())
        .count();
    let first_month = sheet.cell(0, DIMENSION_COLUMNS).to_text();
    if empty_labels != DIMENSION_COLUMNS || !starts_with_month_abbreviation(&first_month) {
        issues.push(ValidationIssue::new(
            "Month",
            "The Month dimension has at least one invalid and/or missing member in Row 2.",
        ));
    }

    // Value-region checks only make sense once the frame of the sheet is right.
    if issues.is_empty() {
        let unlabeled = sheet
            .headers
            .iter()
            .any(|h| unlabeled_column_regex().is_match(h))
            || sheet
                .rows
                .first()
                .is_some_and(|row| row.iter().any(|c| *c == Cell::Number(0.0)));
        if unlabeled {
            issues.push(ValidationIssue::new(
                FORECAST_COLUMNS_RULE,
                "Forecast values were found in one or more columns that do not have column headers.",
            ));
        }

        let value_columns = DIMENSION_COLUMNS..sheet.width().saturating_sub(2);
        if let Some(issue) = non_numeric_issue(sheet, 1, value_columns) {
            issues.push(issue);
        }
    }

    issues
}

fn year_in_row_issues(sheet: &Worksheet) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if !has_metadata_trailer(&sheet.headers) {
        issues.push(ValidationIssue::new(
            "Metadata",
            "The last two columns must be FileName and UserEmail.",
        ));
    }

    let month_columns: Vec<usize> = (0..sheet.width())
        .filter(|col| is_month_label(&sheet.headers[*col]))
        .collect();
    if month_columns.is_empty() {
        issues.push(ValidationIssue::new(
            "Month",
            "No month column headers were found in Row 1.",
        ));
    }

    if let Some(issue) = non_numeric_issue(sheet, 0, month_columns) {
        issues.push(issue);
    }

    issues
}

fn missing_member_issue(dimension: Dimension, col: usize) -> ValidationIssue {
    ValidationIssue::new(
        dimension.label(),
        format!(
            "The {} dimension has at least one invalid and/or missing member in Column {}",
            dimension.label(),
            COLUMN_LETTERS[col]
        ),
    )
}

fn column_texts(sheet: &Worksheet, col: usize, from_row: usize) -> impl Iterator<Item = &str> {
    sheet
        .rows
        .iter()
        .skip(from_row)
        .filter_map(move |row| row.get(col).and_then(Cell::as_text))
}

fn has_metadata_trailer(headers: &[String]) -> bool {
    let n = headers.len();
    n >= 2 && headers[n - 2] == FILE_NAME_COLUMN && headers[n - 1] == USER_EMAIL_COLUMN
}

fn has_template_headers(headers: &[String]) -> bool {
    headers.len() > DIMENSION_COLUMNS + 2
        && headers[0] == "F1"
        && headers[8] == "F9"
        && headers[9].starts_with("FY")
        && has_metadata_trailer(headers)
}

fn non_numeric_issue(
    sheet: &Worksheet,
    from_row: usize,
    columns: impl IntoIterator<Item = usize> + Clone,
) -> Option<ValidationIssue> {
    let count = sheet
        .rows
        .iter()
        .skip(from_row)
        .map(|row| {
            columns
                .clone()
                .into_iter()
                .filter(|col| row.get(*col).and_then(Cell::to_number).is_none())
                .count()
        })
        .sum::<usize>();

    match count {
        0 => None,
        1 => Some(ValidationIssue::new(
            FORECAST_COLUMNS_RULE,
            "A non-numeric character was found in 1 cell in the Forecast values region of the sheet",
        )),
        n => Some(ValidationIssue::new(
            FORECAST_COLUMNS_RULE,
            format!(
                "A non-numeric character was found in {} cells in the Forecast values region of the sheet",
                n
            ),
        )),
    }
}
