use crate::utils::format_number;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single worksheet cell as supplied by the host.
///
/// Spreadsheet imports distinguish a blank cell (`Empty`) from a cell holding
/// an empty string; the layout rules depend on that difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn is_empty_string(&self) -> bool {
        matches!(self, Cell::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Renders the cell the way it appears on the sheet.
    pub fn to_text(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Empty => String::new(),
        }
    }

    /// Numeric coercion; `None` marks a cell that is not a number.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

/// The raw, wide-format load sheet.
///
/// For the year-in-header template `rows[0]` is the secondary header row
/// holding month labels; data rows follow it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Worksheet {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Sheet row number (1-based, header row is row 1) of a row index.
    pub fn sheet_row_number(row: usize) -> usize {
        row + 2
    }
}

/// The two worksheet shapes the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetForm {
    /// Period headers carry year and month (`FY23` over a `Jan` month row).
    YearInHeader,
    /// Equipment-type-tagged extracts with a Year column and month headers.
    YearInRow,
}

impl SheetForm {
    pub fn detect(sheet: &Worksheet) -> Self {
        let first = sheet.cell(0, 0).to_text();
        if first.starts_with("ET:") {
            SheetForm::YearInRow
        } else {
            SheetForm::YearInHeader
        }
    }

    /// Index of the first data row.
    pub fn first_data_row(&self) -> usize {
        match self {
            SheetForm::YearInHeader => 1,
            SheetForm::YearInRow => 0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Dimension {
    #[serde(rename = "ACCT")]
    Account,
    #[serde(rename = "CC")]
    CostCenter,
    #[serde(rename = "IO")]
    InternalOrder,
    #[serde(rename = "CO")]
    Company,
    #[serde(rename = "PC")]
    ProfitCenter,
    #[serde(rename = "ET")]
    EquipmentType,
    #[serde(rename = "SCEN")]
    Scenario,
    #[serde(rename = "VER")]
    Version,
    #[serde(rename = "TYPE")]
    Type,
    #[serde(rename = "YEAR")]
    Year,
    #[serde(rename = "PERIOD")]
    Period,
}

impl Dimension {
    pub const ALL: [Dimension; 11] = [
        Dimension::Account,
        Dimension::CostCenter,
        Dimension::InternalOrder,
        Dimension::Company,
        Dimension::ProfitCenter,
        Dimension::EquipmentType,
        Dimension::Scenario,
        Dimension::Version,
        Dimension::Type,
        Dimension::Year,
        Dimension::Period,
    ];

    /// The nine row-level dimensions forming the natural key, in column order.
    pub const KEY: [Dimension; 9] = [
        Dimension::Account,
        Dimension::CostCenter,
        Dimension::InternalOrder,
        Dimension::Company,
        Dimension::ProfitCenter,
        Dimension::EquipmentType,
        Dimension::Scenario,
        Dimension::Version,
        Dimension::Type,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Dimension::Account => "ACCT",
            Dimension::CostCenter => "CC",
            Dimension::InternalOrder => "IO",
            Dimension::Company => "CO",
            Dimension::ProfitCenter => "PC",
            Dimension::EquipmentType => "ET",
            Dimension::Scenario => "SCEN",
            Dimension::Version => "VER",
            Dimension::Type => "TYPE",
            Dimension::Year => "YEAR",
            Dimension::Period => "PERIOD",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Account => "Account",
            Dimension::CostCenter => "Cost Center",
            Dimension::InternalOrder => "Internal Order",
            Dimension::Company => "Company Code",
            Dimension::ProfitCenter => "Profit Center",
            Dimension::EquipmentType => "Equipment Type",
            Dimension::Scenario => "Scenario",
            Dimension::Version => "Version",
            Dimension::Type => "Type",
            Dimension::Year => "Year",
            Dimension::Period => "Period",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Values of the nine key dimensions for one sheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
    pub account: String,
    pub cost_center: String,
    pub internal_order: String,
    pub company: String,
    pub profit_center: String,
    pub equipment_type: String,
    pub scenario: String,
    pub version: String,
    pub load_type: String,
}

impl DimensionKey {
    pub fn get(&self, dimension: Dimension) -> Option<&str> {
        let value = match dimension {
            Dimension::Account => &self.account,
            Dimension::CostCenter => &self.cost_center,
            Dimension::InternalOrder => &self.internal_order,
            Dimension::Company => &self.company,
            Dimension::ProfitCenter => &self.profit_center,
            Dimension::EquipmentType => &self.equipment_type,
            Dimension::Scenario => &self.scenario,
            Dimension::Version => &self.version,
            Dimension::Type => &self.load_type,
            Dimension::Year | Dimension::Period => return None,
        };
        Some(value.as_str())
    }

    pub fn set(&mut self, dimension: Dimension, value: String) {
        match dimension {
            Dimension::Account => self.account = value,
            Dimension::CostCenter => self.cost_center = value,
            Dimension::InternalOrder => self.internal_order = value,
            Dimension::Company => self.company = value,
            Dimension::ProfitCenter => self.profit_center = value,
            Dimension::EquipmentType => self.equipment_type = value,
            Dimension::Scenario => self.scenario = value,
            Dimension::Version => self.version = value,
            Dimension::Type => self.load_type = value,
            Dimension::Year | Dimension::Period => {}
        }
    }

    pub fn from_values(values: &[String]) -> Self {
        let mut key = Self::default();
        for (dimension, value) in Dimension::KEY.iter().zip(values) {
            key.set(*dimension, value.clone());
        }
        key
    }

    pub fn values(&self) -> Vec<&str> {
        Dimension::KEY
            .iter()
            .filter_map(|d| self.get(*d))
            .collect()
    }
}

/// One wide time column after classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodColumn {
    /// Year member for year-in-header sheets; `None` when the year is a row value.
    pub year: Option<String>,
    pub period: String,
}

impl PeriodColumn {
    /// Canonical `YEAR_MONTH` header.
    pub fn header(&self) -> String {
        match &self.year {
            Some(year) => format!("{}_{}", year, self.period),
            None => self.period.clone(),
        }
    }
}

/// A row of the primary load file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FactRow {
    #[serde(rename = "ACCT")]
    pub account: String,
    #[serde(rename = "CC")]
    pub cost_center: String,
    #[serde(rename = "IO")]
    pub internal_order: String,
    #[serde(rename = "CO")]
    pub company: String,
    #[serde(rename = "PC")]
    pub profit_center: String,
    #[serde(rename = "ET")]
    pub equipment_type: String,
    #[serde(rename = "SCEN")]
    pub scenario: String,
    #[serde(rename = "VER")]
    pub version: String,
    #[serde(rename = "TYPE")]
    pub load_type: String,
    #[serde(rename = "YEAR")]
    pub year: String,
    #[serde(rename = "PERIOD")]
    pub period: String,
    #[serde(rename = "DATA")]
    pub value: f64,
    #[serde(rename = "DATA_Backup")]
    #[schemars(description = "Value of the same key in the prior backup snapshot, zero when absent")]
    pub backup_value: f64,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "UserEmail")]
    pub user_email: String,
    #[serde(rename = "ccEmail")]
    pub cc_email: Option<String>,
}

impl FactRow {
    pub fn key(&self) -> DimensionKey {
        DimensionKey {
            account: self.account.clone(),
            cost_center: self.cost_center.clone(),
            internal_order: self.internal_order.clone(),
            company: self.company.clone(),
            profit_center: self.profit_center.clone(),
            equipment_type: self.equipment_type.clone(),
            scenario: self.scenario.clone(),
            version: self.version.clone(),
            load_type: self.load_type.clone(),
        }
    }

    pub fn dimension_value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Account => &self.account,
            Dimension::CostCenter => &self.cost_center,
            Dimension::InternalOrder => &self.internal_order,
            Dimension::Company => &self.company,
            Dimension::ProfitCenter => &self.profit_center,
            Dimension::EquipmentType => &self.equipment_type,
            Dimension::Scenario => &self.scenario,
            Dimension::Version => &self.version,
            Dimension::Type => &self.load_type,
            Dimension::Year => &self.year,
            Dimension::Period => &self.period,
        }
    }
}

/// A row of the secondary capacity flag file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CapacityFlagRow {
    #[serde(rename = "ACCT")]
    pub account: String,
    #[serde(rename = "CC")]
    pub cost_center: String,
    #[serde(rename = "IO")]
    pub internal_order: String,
    #[serde(rename = "CO")]
    pub company: String,
    #[serde(rename = "PC")]
    pub profit_center: String,
    #[serde(rename = "ET")]
    pub equipment_type: String,
    #[serde(rename = "SCEN")]
    pub scenario: String,
    #[serde(rename = "VER")]
    pub version: String,
    #[serde(rename = "TYPE")]
    pub load_type: String,
    #[serde(rename = "YEAR")]
    pub year: String,
    #[serde(rename = "PERIOD")]
    pub period: String,
    #[serde(rename = "DATA")]
    #[schemars(description = "1 recomputes stations and fleet, 2 recomputes fleet only")]
    pub flag: u8,
    #[serde(rename = "FileName")]
    pub file_name: String,
}

/// One itemized finding, keyed by the dimension or rule that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: String,
    pub detail: String,
}

impl ValidationIssue {
    pub fn new(rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            detail: detail.into(),
        }
    }
}

/// A sheet row whose key is shared with at least one other row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateRow {
    pub row_number: usize,
    pub key: Vec<String>,
}
