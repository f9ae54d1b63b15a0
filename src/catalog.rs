//! Reference Catalog: the read-only dimension member tables a run validates
//! against, and the prepared lookups built from them.

use crate::config::PipelineConfig;
use crate::error::{LoadSheetError, Result};
use crate::schema::{Dimension, ValidationIssue};
use crate::utils::is_month_label;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::sync::OnceLock;

pub const MEMBER_NAME_COLUMN: &str = "Member Name";
pub const ALIAS_COLUMN: &str = "Alias: Default";
pub const LEVEL_COLUMN: &str = "Level";
pub const DATA_STORAGE_ATTRIBUTE: &str = "Data Storage";

/// Literal member labels that only ever appear as member names.
const KNOWN_MEMBER_LABELS: [&str; 14] = [
    "Forecast",
    "Actual",
    "Flash_Base",
    "Flash_GAAP",
    "Flash_NonGAAP",
    "Flash_Eco",
    "Working",
    "Locked",
    "Final",
    "Current Capacity",
    "Amount",
    "Adjustment",
    "Rate",
    "Units",
];

fn fiscal_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"FY[2-9][0-9]").expect("fiscal year pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionMember {
    pub member_name: String,
    pub alias: Option<String>,
    /// Hierarchy level; `Some(0)` marks a leaf.
    pub level: Option<u32>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DimensionMember {
    pub fn new(member_name: impl Into<String>, alias: Option<&str>, level: u32) -> Self {
        Self {
            member_name: member_name.into(),
            alias: alias.map(str::to_string),
            level: Some(level),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.level == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionTable {
    pub dimension: Dimension,
    pub members: Vec<DimensionMember>,
}

impl DimensionTable {
    pub fn new(dimension: Dimension, members: Vec<DimensionMember>) -> Self {
        Self { dimension, members }
    }

    /// Reads an outline extract with `Member Name`, `Alias: Default` and
    /// `Level` columns; every other column becomes a member attribute.
    pub fn from_csv_reader<R: Read>(dimension: Dimension, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let name_idx = headers
            .iter()
            .position(|h| h == MEMBER_NAME_COLUMN)
            .ok_or_else(|| {
                LoadSheetError::Malformed(format!(
                    "{} dimension file has no '{}' column",
                    dimension.label(),
                    MEMBER_NAME_COLUMN
                ))
            })?;
        let alias_idx = headers.iter().position(|h| h == ALIAS_COLUMN);
        let level_idx = headers.iter().position(|h| h == LEVEL_COLUMN);

        let mut members = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let member_name = record.get(name_idx).unwrap_or("").to_string();
            let alias = alias_idx
                .and_then(|i| record.get(i))
                .filter(|a| !a.is_empty())
                .map(str::to_string);
            let level = level_idx
                .and_then(|i| record.get(i))
                .and_then(|l| l.trim().parse::<u32>().ok());

            let attributes = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != name_idx && Some(*i) != alias_idx && Some(*i) != level_idx)
                .filter_map(|(i, h)| record.get(i).map(|v| (h.to_string(), v.to_string())))
                .collect();

            members.push(DimensionMember {
                member_name,
                alias,
                level,
                attributes,
            });
        }

        Ok(Self::new(dimension, members))
    }
}

/// One table per dimension, loaded fresh for each run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCatalog {
    tables: BTreeMap<Dimension, DimensionTable>,
}

impl ReferenceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: DimensionTable) {
        self.tables.insert(table.dimension, table);
    }

    pub fn with_table(mut self, table: DimensionTable) -> Self {
        self.insert(table);
        self
    }

    pub fn table(&self, dimension: Dimension) -> Option<&DimensionTable> {
        self.tables.get(&dimension)
    }

    /// Completeness heuristic: every table must exist and reach its minimum
    /// row count. All dimensions are checked before failing.
    pub fn check_completeness(&self, config: &PipelineConfig) -> Result<()> {
        let mut issues = Vec::new();

        for dimension in Dimension::ALL {
            let minimum = config
                .minimum_catalog_rows
                .get(&dimension)
                .copied()
                .unwrap_or(0);
            match self.tables.get(&dimension) {
                None => issues.push(ValidationIssue::new(
                    dimension.code(),
                    format!("The {} dimension file is missing", dimension.label()),
                )),
                Some(table) if table.members.len() < minimum => {
                    issues.push(ValidationIssue::new(
                        dimension.code(),
                        format!(
                            "The {} dimension file contains only {} lines",
                            dimension.label(),
                            table.members.len()
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(LoadSheetError::ReferenceData { issues })
        }
    }
}

/// How a sheet column spells its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberEncoding {
    MemberName,
    Alias,
}

/// Decides whether sheet values are member names or aliases.
///
/// Ordered content checks: known literal labels, `XX:` codes, month names,
/// `FY2x`-style years. Anything else is assumed to be an alias. "May" counts as
/// a month.
pub fn detect_encoding<'a, I>(values: I) -> MemberEncoding
where
    I: IntoIterator<Item = &'a str>,
{
    let values: Vec<&str> = values.into_iter().collect();

    let is_name = values.iter().any(|v| KNOWN_MEMBER_LABELS.contains(v))
        || values.iter().any(|v| has_member_code_prefix(v))
        || values.iter().any(|v| is_month_label(v))
        || values.iter().any(|v| fiscal_year_regex().is_match(v));

    if is_name {
        MemberEncoding::MemberName
    } else {
        MemberEncoding::Alias
    }
}

/// True for `GL:12345`-style values, whose colon sits at byte offset 2.
pub fn has_member_code_prefix(value: &str) -> bool {
    value.find(':') == Some(2)
}

/// Loadable members of one dimension after level and policy filters.
#[derive(Debug, Clone, Default)]
pub struct AllowedMembers {
    names: BTreeSet<String>,
    alias_to_name: HashMap<String, String>,
    /// Aliases carried by more than one member, with every member carrying them.
    shared_aliases: BTreeMap<String, BTreeSet<String>>,
}

impl AllowedMembers {
    fn from_members<'a>(members: impl Iterator<Item = &'a DimensionMember>) -> Self {
        let mut allowed = Self::default();
        for member in members {
            if !allowed.names.insert(member.member_name.clone()) {
                continue;
            }
            let Some(alias) = &member.alias else {
                continue;
            };
            match allowed.alias_to_name.get(alias).cloned() {
                Some(first) if first != member.member_name => {
                    allowed
                        .shared_aliases
                        .entry(alias.clone())
                        .or_insert_with(|| BTreeSet::from([first]))
                        .insert(member.member_name.clone());
                }
                Some(_) => {}
                None => {
                    allowed
                        .alias_to_name
                        .insert(alias.clone(), member.member_name.clone());
                }
            }
        }
        allowed
    }

    /// A value is loadable when it is a member name or an unambiguous alias.
    pub fn contains(&self, value: &str) -> bool {
        self.resolve(value, MemberEncoding::MemberName).is_some()
    }

    pub fn is_member_name(&self, value: &str) -> bool {
        self.names.contains(value)
    }

    /// Members sharing `alias`, when more than one member carries it.
    pub fn shared_alias(&self, alias: &str) -> Option<&BTreeSet<String>> {
        self.shared_aliases.get(alias)
    }

    /// Canonical member name for a sheet value. The field `encoding` names is
    /// tried first; a shared alias resolves to nothing.
    pub fn resolve(&self, value: &str, encoding: MemberEncoding) -> Option<&str> {
        let by_name = self.names.get(value).map(String::as_str);
        let by_alias = self
            .alias_to_name
            .get(value)
            .filter(|_| !self.shared_aliases.contains_key(value))
            .map(String::as_str);
        match encoding {
            MemberEncoding::MemberName => by_name.or(by_alias),
            MemberEncoding::Alias => by_alias.or(by_name),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Lookups prepared once per run from the catalog and the run policy.
#[derive(Debug, Clone, Default)]
pub struct MemberIndex {
    mentioned: HashMap<Dimension, HashSet<String>>,
    allowed: HashMap<Dimension, AllowedMembers>,
    empty: AllowedMembers,
}

impl MemberIndex {
    pub fn build(catalog: &ReferenceCatalog, config: &PipelineConfig) -> Self {
        let mut index = Self::default();

        for (dimension, table) in &catalog.tables {
            let mentioned: HashSet<String> = table
                .members
                .iter()
                .flat_map(|m| std::iter::once(&m.member_name).chain(m.alias.iter()))
                .cloned()
                .collect();
            index.mentioned.insert(*dimension, mentioned);

            let allowed = AllowedMembers::from_members(
                table
                    .members
                    .iter()
                    .filter(|m| passes_policy(*dimension, m, config))
                    .filter(|m| m.is_leaf()),
            );
            debug!(
                "{} dimension: {} of {} members are loadable",
                dimension.label(),
                allowed.len(),
                table.members.len()
            );
            index.allowed.insert(*dimension, allowed);
        }

        index
    }

    /// Unfiltered membership by name or alias, used to recognise columns.
    pub fn mentions(&self, dimension: Dimension, value: &str) -> bool {
        self.mentioned
            .get(&dimension)
            .map(|set| set.contains(value))
            .unwrap_or(false)
    }

    pub fn allowed(&self, dimension: Dimension) -> &AllowedMembers {
        self.allowed.get(&dimension).unwrap_or(&self.empty)
    }
}

fn passes_policy(dimension: Dimension, member: &DimensionMember, config: &PipelineConfig) -> bool {
    if let Some(allowlist) = config.member_allowlists.get(&dimension) {
        let name = member.member_name.to_uppercase();
        if !allowlist.iter().any(|a| a.to_uppercase() == name) {
            return false;
        }
    }

    match dimension {
        Dimension::Account => member
            .attributes
            .get(DATA_STORAGE_ATTRIBUTE)
            .map(|storage| config.is_loadable_storage(storage))
            .unwrap_or(false),
        Dimension::Year => alias_year_number(member)
            .map(|year| year >= config.current_year() - config.year_lookback)
            .unwrap_or(false),
        _ => true,
    }
}

/// Year number from an alias such as `"FY 2024"`.
fn alias_year_number(member: &DimensionMember) -> Option<i32> {
    member
        .alias
        .as_deref()?
        .split_whitespace()
        .nth(1)?
        .parse::<i32>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config_for(year: i32) -> PipelineConfig {
        PipelineConfig::default()
            .with_run_at(
                NaiveDate::from_ymd_opt(year, 1, 15)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
            .with_minimum_catalog_rows(0)
    }

    #[test]
    fn test_encoding_heuristic() {
        assert_eq!(
            detect_encoding(["GL:12345", "Fuel (12345)"]),
            MemberEncoding::MemberName
        );
        assert_eq!(detect_encoding(["Working"]), MemberEncoding::MemberName);
        assert_eq!(detect_encoding(["Actual"]), MemberEncoding::MemberName);
        assert_eq!(detect_encoding(["Final"]), MemberEncoding::MemberName);
        assert_eq!(detect_encoding(["May"]), MemberEncoding::MemberName);
        assert_eq!(detect_encoding(["FY24"]), MemberEncoding::MemberName);
        assert_eq!(detect_encoding(["Fuel (12345)"]), MemberEncoding::Alias);
        assert_eq!(detect_encoding(["ABC:1"]), MemberEncoding::Alias);
    }

    #[test]
    fn test_account_storage_and_level_filters() {
        let catalog = ReferenceCatalog::new().with_table(DimensionTable::new(
            Dimension::Account,
            vec![
                DimensionMember::new("GL:10000", Some("Cash (10000)"), 0)
                    .with_attribute(DATA_STORAGE_ATTRIBUTE, "Store Data"),
                DimensionMember::new("GL:20000", Some("Calc (20000)"), 0)
                    .with_attribute(DATA_STORAGE_ATTRIBUTE, "Dynamic Calc"),
                DimensionMember::new("GL:Total", Some("Total"), 1)
                    .with_attribute(DATA_STORAGE_ATTRIBUTE, "Store Data"),
            ],
        ));
        let index = MemberIndex::build(&catalog, &config_for(2024));
        let allowed = index.allowed(Dimension::Account);

        assert!(allowed.is_member_name("GL:10000"));
        assert!(!allowed.is_member_name("GL:20000"));
        assert!(!allowed.is_member_name("GL:Total"));
        assert_eq!(allowed.resolve("Cash (10000)", MemberEncoding::Alias), Some("GL:10000"));
        assert_eq!(allowed.resolve("GL:10000", MemberEncoding::Alias), Some("GL:10000"));
        assert!(allowed.contains("Cash (10000)"));
        assert!(!allowed.contains("Calc (20000)"));

        assert!(index.mentions(Dimension::Account, "Calc (20000)"));
        assert!(!index.mentions(Dimension::CostCenter, "GL:10000"));
    }

    #[test]
    fn test_year_filter_keeps_recent_years() {
        let catalog = ReferenceCatalog::new().with_table(DimensionTable::new(
            Dimension::Year,
            vec![
                DimensionMember::new("FY21", Some("FY 2021"), 0),
                DimensionMember::new("FY23", Some("FY 2023"), 0),
                DimensionMember::new("FY24", Some("FY 2024"), 0),
                DimensionMember::new("FY25", Some("FY 2025"), 0),
            ],
        ));
        let index = MemberIndex::build(&catalog, &config_for(2024));
        let allowed = index.allowed(Dimension::Year);

        assert!(!allowed.is_member_name("FY21"));
        assert!(allowed.is_member_name("FY23"));
        assert!(allowed.is_member_name("FY25"));
    }

    #[test]
    fn test_shared_alias_does_not_resolve() {
        let catalog = ReferenceCatalog::new().with_table(DimensionTable::new(
            Dimension::CostCenter,
            vec![
                DimensionMember::new("CC:12345", Some("Ramp (12345)"), 0),
                DimensionMember::new("CC:54321", Some("Ramp (12345)"), 0),
                DimensionMember::new("CC:11111", Some("Hangar (11111)"), 0),
            ],
        ));
        let index = MemberIndex::build(&catalog, &config_for(2024));
        let allowed = index.allowed(Dimension::CostCenter);

        assert!(!allowed.contains("Ramp (12345)"));
        assert_eq!(allowed.resolve("Ramp (12345)", MemberEncoding::Alias), None);
        assert_eq!(
            allowed.shared_alias("Ramp (12345)").map(|names| names.len()),
            Some(2)
        );
        assert!(allowed.contains("CC:54321"));
        assert!(allowed.contains("Hangar (11111)"));
        assert_eq!(allowed.shared_alias("Hangar (11111)"), None);
    }

    #[test]
    fn test_allowlist_is_case_insensitive() {
        let catalog = ReferenceCatalog::new().with_table(DimensionTable::new(
            Dimension::EquipmentType,
            vec![
                DimensionMember::new("ET:None", Some("No Equipment"), 0),
                DimensionMember::new("ET:737", Some("Boeing 737 (737)"), 0),
            ],
        ));
        let index = MemberIndex::build(&catalog, &config_for(2024));
        let allowed = index.allowed(Dimension::EquipmentType);
        assert!(allowed.is_member_name("ET:None"));
        assert!(!allowed.is_member_name("ET:737"));
    }

    #[test]
    fn test_completeness_reports_all_dimensions() {
        let catalog = ReferenceCatalog::new().with_table(DimensionTable::new(
            Dimension::Account,
            vec![DimensionMember::new("GL:10000", None, 0)],
        ));
        let mut config = config_for(2024);
        config.minimum_catalog_rows.insert(Dimension::Account, 2);

        let err = catalog.check_completeness(&config).unwrap_err();
        let issues = err.issues();
        assert_eq!(issues.len(), 11);
        assert!(issues[0].detail.contains("contains only 1 lines"));
        assert!(issues.iter().any(|i| i.rule == "PERIOD" && i.detail.contains("missing")));
    }

    #[test]
    fn test_table_from_csv() {
        let data = "Member Name,Alias: Default,Level,Data Storage\n\
                    GL:10000,Cash (10000),0,Store Data\n\
                    GL:Parent,,2,Label Only\n";
        let table = DimensionTable::from_csv_reader(Dimension::Account, data.as_bytes()).unwrap();
        assert_eq!(table.members.len(), 2);
        assert_eq!(table.members[0].alias.as_deref(), Some("Cash (10000)"));
        assert!(table.members[0].is_leaf());
        assert_eq!(table.members[1].alias, None);
        assert_eq!(
            table.members[1].attributes.get(DATA_STORAGE_ATTRIBUTE).map(String::as_str),
            Some("Label Only")
        );
    }
}
