//! Backup Enricher: attaches the value each fact row held in the latest
//! backup extract.

use crate::error::{LoadSheetError, Result};
use crate::schema::{Dimension, DimensionKey, FactRow};
use crate::utils::MONTH_ABBREVIATIONS;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;

/// Positional layout of a backup extract. Headers in the file itself are
/// ignored.
pub const BACKUP_COLUMNS: [&str; 23] = [
    "ET", "PC", "CO", "TYPE", "IO", "CC", "YEAR", "VER", "SCEN", "ACCT", "Jan", "Feb", "Mar",
    "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec", "FileName",
];

const DIMENSION_POSITIONS: [(Dimension, usize); 10] = [
    (Dimension::EquipmentType, 0),
    (Dimension::ProfitCenter, 1),
    (Dimension::Company, 2),
    (Dimension::Type, 3),
    (Dimension::InternalOrder, 4),
    (Dimension::CostCenter, 5),
    (Dimension::Year, 6),
    (Dimension::Version, 7),
    (Dimension::Scenario, 8),
    (Dimension::Account, 9),
];
const FIRST_MONTH_POSITION: usize = 10;
const FILE_NAME_POSITION: usize = 22;

/// One wide row of the backup extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRow {
    pub key: DimensionKey,
    pub year: String,
    /// Jan..Dec.
    pub months: Vec<f64>,
    pub file_name: String,
}

impl BackupRow {
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        if fields.len() != BACKUP_COLUMNS.len() {
            return Err(LoadSheetError::Malformed(format!(
                "backup row has {} columns, expected {}",
                fields.len(),
                BACKUP_COLUMNS.len()
            )));
        }

        let mut key = DimensionKey::default();
        let mut year = String::new();
        for (dimension, position) in DIMENSION_POSITIONS {
            let value = fields[position].as_ref().to_string();
            match dimension {
                Dimension::Year => year = value,
                _ => key.set(dimension, value),
            }
        }

        let months = fields[FIRST_MONTH_POSITION..FIRST_MONTH_POSITION + 12]
            .iter()
            .map(|f| f.as_ref().trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0))
            .collect();

        Ok(Self {
            key,
            year,
            months,
            file_name: fields[FILE_NAME_POSITION].as_ref().to_string(),
        })
    }

    fn dimension_value(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Year => &self.year,
            _ => self.key.get(dimension).unwrap_or(""),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub rows: Vec<BackupRow>,
}

type JoinKey = (DimensionKey, String, String);

impl BackupSnapshot {
    pub fn new(rows: Vec<BackupRow>) -> Self {
        Self { rows }
    }

    /// Reads an extract whose first line is a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            rows.push(BackupRow::from_fields(&fields)?);
        }
        Ok(Self::new(rows))
    }

    /// Backup values keyed by (key, year, period), restricted to rows whose
    /// every dimension value occurs somewhere in `facts`.
    fn long_values(&self, facts: &[FactRow]) -> HashMap<JoinKey, Vec<f64>> {
        let universe: HashMap<Dimension, HashSet<&str>> = DIMENSION_POSITIONS
            .iter()
            .map(|(dimension, _)| {
                let values = facts.iter().map(|f| f.dimension_value(*dimension)).collect();
                (*dimension, values)
            })
            .collect();

        let in_universe = |row: &BackupRow| {
            universe
                .iter()
                .all(|(dimension, values)| values.contains(row.dimension_value(*dimension)))
        };

        let mut long: HashMap<JoinKey, Vec<f64>> = HashMap::new();
        let mut kept = 0;
        for row in self.rows.iter().filter(|r| in_universe(*r)) {
            kept += 1;
            for (month, value) in MONTH_ABBREVIATIONS.iter().zip(&row.months) {
                long.entry((row.key.clone(), row.year.clone(), month.to_string()))
                    .or_default()
                    .push(*value);
            }
        }
        debug!("Backup rows within the load universe: {} of {}", kept, self.rows.len());
        long
    }
}

/// Left-joins the snapshot onto `facts` on the full key plus YEAR and
/// PERIOD.
///
/// Facts with no backup row get a zero backup value. Several backup rows on
/// the same key repeat the fact once per backup row.
pub fn enrich_with_backup(facts: Vec<FactRow>, snapshot: &BackupSnapshot) -> Vec<FactRow> {
    let long = snapshot.long_values(&facts);
    if long.is_empty() {
        return facts;
    }

    let mut enriched = Vec::with_capacity(facts.len());
    for fact in facts {
        let key = (fact.key(), fact.year.clone(), fact.period.clone());
        match long.get(&key) {
            Some(values) => {
                for value in values {
                    enriched.push(FactRow {
                        backup_value: *value,
                        ..fact.clone()
                    });
                }
            }
            None => enriched.push(FactRow {
                backup_value: 0.0,
                ..fact
            }),
        }
    }
    enriched
}
