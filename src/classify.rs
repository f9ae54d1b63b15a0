//! Column Classifier & Relabeler.
//!
//! Column headers on a load sheet are placeholders, so each column is
//! recognised by its content. Classification is a prioritized matcher: an
//! ordered list of rules evaluated once per column, left to right, the first
//! match winning. A dimension claimed by an earlier column is skipped for
//! later columns, which keeps the order of the rule list significant.

use crate::catalog::{detect_encoding, MemberEncoding, MemberIndex};
use crate::error::{LoadSheetError, Result};
use crate::ingestion::{FILE_NAME_COLUMN, USER_EMAIL_COLUMN};
use crate::schema::{Cell, Dimension, DimensionKey, PeriodColumn, SheetForm, Worksheet};
use crate::utils::{is_month_label, year_label};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// What a worksheet column turned out to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnRole {
    Dimension {
        dimension: Dimension,
        encoding: MemberEncoding,
    },
    Period(PeriodColumn),
    /// FileName / UserEmail.
    Metadata,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedColumn {
    pub index: usize,
    pub header: String,
    pub role: ColumnRole,
}

impl ClassifiedColumn {
    /// Header after relabeling (`ACCT`, `FY23_Jan`, or the header as submitted).
    pub fn canonical_header(&self) -> String {
        match &self.role {
            ColumnRole::Dimension { dimension, .. } => dimension.code().to_string(),
            ColumnRole::Period(period) => period.header(),
            ColumnRole::Metadata | ColumnRole::Unrecognized => self.header.clone(),
        }
    }
}

/// Content-based matchers, in precedence order.
#[derive(Debug, Clone, Copy)]
enum Matcher {
    /// Any data value is a catalog member name or alias of the dimension.
    Catalog(Dimension),
    /// Any data value is one of a fixed set of labels.
    Literal(Dimension, &'static [&'static str]),
    /// The month-label row names a month; only tried after every content rule.
    MonthLabel,
}

const PRECEDENCE: [Matcher; 11] = [
    Matcher::Catalog(Dimension::EquipmentType),
    Matcher::Catalog(Dimension::ProfitCenter),
    Matcher::Catalog(Dimension::Company),
    Matcher::Catalog(Dimension::InternalOrder),
    Matcher::Catalog(Dimension::CostCenter),
    Matcher::Catalog(Dimension::Account),
    Matcher::Catalog(Dimension::Year),
    Matcher::Literal(Dimension::Type, &["Amount", "Adjustment", "Rate", "Units"]),
    Matcher::Literal(Dimension::Version, &["Working", "Final", "Current Capacity"]),
    Matcher::Literal(
        Dimension::Scenario,
        &[
            "Forecast",
            "Actual",
            "Flash_Base",
            "Flash_GAAP",
            "Flash_NonGAAP",
            "Flash_Eco",
        ],
    ),
    Matcher::MonthLabel,
];

struct ColumnView<'a> {
    header: &'a str,
    label: &'a Cell,
    values: Vec<&'a str>,
}

impl Matcher {
    fn dimension(&self) -> Option<Dimension> {
        match self {
            Matcher::Catalog(d) | Matcher::Literal(d, _) => Some(*d),
            Matcher::MonthLabel => None,
        }
    }

    fn apply(&self, column: &ColumnView<'_>, form: SheetForm, index: &MemberIndex) -> Option<ColumnRole> {
        let matched = match self {
            Matcher::Catalog(dimension) => {
                column.values.iter().any(|v| index.mentions(*dimension, v))
            }
            Matcher::Literal(_, labels) => column.values.iter().any(|v| labels.contains(v)),
            Matcher::MonthLabel => {
                let label = column.label.to_text();
                return (form == SheetForm::YearInHeader && is_month_label(&label)).then(|| {
                    ColumnRole::Period(PeriodColumn {
                        year: Some(year_label(column.header).to_string()),
                        period: label,
                    })
                });
            }
        };

        let dimension = self.dimension()?;
        matched.then(|| ColumnRole::Dimension {
            dimension,
            encoding: detect_encoding(column.values.iter().copied()),
        })
    }
}

/// Result of classifying every worksheet column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub form: SheetForm,
    pub columns: Vec<ClassifiedColumn>,
}

pub fn classify_columns(sheet: &Worksheet, form: SheetForm, index: &MemberIndex) -> Classification {
    let first_data_row = form.first_data_row();
    let mut claimed: HashSet<Dimension> = HashSet::new();
    let mut columns = Vec::with_capacity(sheet.width());

    for (col, header) in sheet.headers.iter().enumerate() {
        let role = if header == FILE_NAME_COLUMN || header == USER_EMAIL_COLUMN {
            ColumnRole::Metadata
        } else if is_month_label(header) {
            // Bare month headers only carry periods on year-in-row extracts.
            match form {
                SheetForm::YearInRow => ColumnRole::Period(PeriodColumn {
                    year: None,
                    period: header.clone(),
                }),
                SheetForm::YearInHeader => ColumnRole::Unrecognized,
            }
        } else {
            let view = ColumnView {
                header,
                label: sheet.cell(0, col),
                values: sheet
                    .rows
                    .iter()
                    .skip(first_data_row)
                    .filter_map(|row| row.get(col).and_then(Cell::as_text))
                    .filter(|v| !v.is_empty())
                    .collect(),
            };
            PRECEDENCE
                .iter()
                .filter(|m| m.dimension().map_or(true, |d| !claimed.contains(&d)))
                .find_map(|m| m.apply(&view, form, index))
                .unwrap_or(ColumnRole::Unrecognized)
        };

        if let ColumnRole::Dimension { dimension, .. } = &role {
            claimed.insert(*dimension);
        }
        debug!("Column {} '{}' classified as {:?}", col, header, role);
        columns.push(ClassifiedColumn {
            index: col,
            header: header.clone(),
            role,
        });
    }

    Classification { form, columns }
}

impl Classification {
    pub fn dimension_column(&self, dimension: Dimension) -> Option<&ClassifiedColumn> {
        self.columns.iter().find(|c| {
            matches!(&c.role, ColumnRole::Dimension { dimension: d, .. } if *d == dimension)
        })
    }

    /// Column indexes of the nine key dimensions in key order, when all of
    /// them were recognised.
    pub fn key_columns(&self) -> Option<Vec<usize>> {
        Dimension::KEY
            .iter()
            .map(|d| self.dimension_column(*d).map(|c| c.index))
            .collect()
    }

    pub fn period_columns(&self) -> impl Iterator<Item = (usize, &PeriodColumn)> {
        self.columns.iter().filter_map(|c| match &c.role {
            ColumnRole::Period(period) => Some((c.index, period)),
            _ => None,
        })
    }

    pub fn unrecognized(&self) -> impl Iterator<Item = &ClassifiedColumn> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Unrecognized)
    }

    /// Year and Period labels named by the period columns, in column order.
    pub fn time_labels(&self) -> TimeLabels {
        let mut labels = TimeLabels::default();
        for (_, period) in self.period_columns() {
            if let Some(year) = &period.year {
                labels.years.push(year.clone());
            }
            labels.periods.push(period.period.clone());
        }
        labels
    }

    /// Header row after relabeling; alias columns appear as `X_Alias` next
    /// to the derived member-name column.
    pub fn relabeled_headers(&self) -> Vec<String> {
        let mut headers = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            if let ColumnRole::Dimension {
                dimension,
                encoding: MemberEncoding::Alias,
            } = &column.role
            {
                headers.push(format!("{}_Alias", dimension.code()));
            }
            headers.push(column.canonical_header());
        }
        headers
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeLabels {
    pub years: Vec<String>,
    pub periods: Vec<String>,
}

/// A data row after relabeling, with member names resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRow {
    pub sheet_row: usize,
    pub key: DimensionKey,
    /// Row-level year, year-in-row sheets only.
    pub year: Option<String>,
    /// Sheet values that were aliases, keyed by the dimension they resolved in.
    pub aliases: BTreeMap<Dimension, String>,
    /// One value per entry of `LoadSheet::periods`.
    pub values: Vec<Cell>,
    pub file_name: String,
    pub user_email: String,
}

/// The worksheet in canonical form, ready to reshape.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSheet {
    pub form: SheetForm,
    pub headers: Vec<String>,
    pub periods: Vec<PeriodColumn>,
    pub rows: Vec<LoadRow>,
}

/// Renames columns to their dimension codes and replaces alias values with
/// the member names they stand for. Runs after member validation, so every
/// non-empty value resolves.
pub fn relabel(
    sheet: &Worksheet,
    classification: &Classification,
    index: &MemberIndex,
) -> Result<LoadSheet> {
    let form = classification.form;
    let key_columns = classification.key_columns().ok_or_else(|| {
        LoadSheetError::Malformed("not every key dimension has a column".to_string())
    })?;

    let year_column = match form {
        SheetForm::YearInRow => Some(
            classification
                .dimension_column(Dimension::Year)
                .ok_or_else(|| LoadSheetError::Malformed("no Year column found".to_string()))?,
        ),
        SheetForm::YearInHeader => None,
    };

    let (period_indexes, periods): (Vec<usize>, Vec<PeriodColumn>) = classification
        .period_columns()
        .map(|(i, p)| (i, p.clone()))
        .unzip();

    let file_col = sheet.column_index(FILE_NAME_COLUMN);
    let email_col = sheet.column_index(USER_EMAIL_COLUMN);

    let rows = (form.first_data_row()..sheet.height())
        .map(|row| {
            let mut key = DimensionKey::default();
            let mut aliases = BTreeMap::new();
            for (dimension, col) in Dimension::KEY.iter().zip(&key_columns) {
                let value = resolve_cell(sheet, classification, index, *dimension, row, *col, &mut aliases);
                key.set(*dimension, value);
            }
            let year = year_column.map(|c| {
                resolve_cell(sheet, classification, index, Dimension::Year, row, c.index, &mut aliases)
            });

            LoadRow {
                sheet_row: Worksheet::sheet_row_number(row),
                key,
                year,
                aliases,
                values: period_indexes.iter().map(|c| sheet.cell(row, *c).clone()).collect(),
                file_name: file_col.map(|c| sheet.cell(row, c).to_text()).unwrap_or_default(),
                user_email: email_col.map(|c| sheet.cell(row, c).to_text()).unwrap_or_default(),
            }
        })
        .collect();

    Ok(LoadSheet {
        form,
        headers: classification.relabeled_headers(),
        periods,
        rows,
    })
}

fn resolve_cell(
    sheet: &Worksheet,
    classification: &Classification,
    index: &MemberIndex,
    dimension: Dimension,
    row: usize,
    col: usize,
    aliases: &mut BTreeMap<Dimension, String>,
) -> String {
    let value = sheet.cell(row, col).to_text();
    let encoding = match classification.columns.get(col).map(|c| &c.role) {
        Some(ColumnRole::Dimension { encoding, .. }) => *encoding,
        _ => return value,
    };
    if value.is_empty() {
        return value;
    }

    match index.allowed(dimension).resolve(&value, encoding) {
        Some(name) if name != value => {
            let name = name.to_string();
            aliases.insert(dimension, value);
            name
        }
        _ => value,
    }
}
