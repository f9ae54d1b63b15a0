//! Output Assembler: names the load file, fills the recipient columns and
//! derives the capacity flag table.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingestion::SubmissionInfo;
use crate::schema::{CapacityFlagRow, FactRow};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::io::Write;

pub const CAPACITY_VERSION: &str = "Current Capacity";
pub const ACTUAL_SCENARIO: &str = "Actual";

const CAPACITY_FLAG_ACCOUNT: &str = "CL:09962";
const CAPACITY_FLAG_VERSION_FOR_ACCOUNTS: &str = "Working";
const FLAG_STATIONS_AND_FLEET: u8 = 1;
const FLAG_FLEET_ONLY: u8 = 2;

/// Naming branch of a load file, chosen from the validated members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadKind {
    CapacityFleetOnly,
    Capacity,
    Actual,
    Working,
}

impl LoadKind {
    /// An empty fact set is a working load.
    pub fn detect(facts: &[FactRow], config: &PipelineConfig) -> Self {
        if facts.is_empty() {
            LoadKind::Working
        } else if all_capacity_version(facts) {
            if all_fleet(facts, config) {
                LoadKind::CapacityFleetOnly
            } else {
                LoadKind::Capacity
            }
        } else if facts.iter().all(|f| f.scenario == ACTUAL_SCENARIO) {
            LoadKind::Actual
        } else {
            LoadKind::Working
        }
    }

    pub fn file_name(&self, submission: &SubmissionInfo, timestamp: &str) -> String {
        let workbook = submission.workbook();
        match self {
            LoadKind::CapacityFleetOnly => {
                format!("CurrentCapacity_Load_FleetOnly_{}_{}", workbook, timestamp)
            }
            LoadKind::Capacity => format!("CurrentCapacity_Load_{}_{}", workbook, timestamp),
            LoadKind::Actual => format!("Actual_Load_{}_{}", workbook, timestamp),
            LoadKind::Working => format!(
                "Working_Load_{}_{}_{}_{}",
                submission.user(),
                workbook,
                submission.load_sheet(),
                timestamp
            ),
        }
    }
}

fn all_capacity_version(facts: &[FactRow]) -> bool {
    facts.iter().all(|f| f.version == CAPACITY_VERSION)
}

fn all_fleet(facts: &[FactRow], config: &PipelineConfig) -> bool {
    facts
        .iter()
        .all(|f| config.is_fleet_cost_center(&f.cost_center))
}

/// Capacity flag rows, one per distinct (YEAR, PERIOD) in first-seen order.
///
/// Produced when every row loads the capacity version, or otherwise when
/// every account is a capacity account. An empty fact set has no flags.
pub fn capacity_flags(
    facts: &[FactRow],
    capacity_accounts: &BTreeSet<String>,
    config: &PipelineConfig,
) -> Option<Vec<CapacityFlagRow>> {
    if facts.is_empty() {
        return None;
    }
    let version = if all_capacity_version(facts) {
        CAPACITY_VERSION
    } else if facts.iter().all(|f| capacity_accounts.contains(&f.account)) {
        CAPACITY_FLAG_VERSION_FOR_ACCOUNTS
    } else {
        return None;
    };

    let flag = if all_fleet(facts, config) {
        FLAG_FLEET_ONLY
    } else {
        FLAG_STATIONS_AND_FLEET
    };
    let file_name = format!("_{}", config.run_timestamp());

    let mut seen = HashSet::new();
    let rows = facts
        .iter()
        .filter(|f| seen.insert((f.year.as_str(), f.period.as_str())))
        .map(|f| CapacityFlagRow {
            account: CAPACITY_FLAG_ACCOUNT.to_string(),
            cost_center: "CC:None".to_string(),
            internal_order: "IO:None".to_string(),
            company: "CO:9001".to_string(),
            profit_center: "PC:1000".to_string(),
            equipment_type: "ET:None".to_string(),
            scenario: "Forecast".to_string(),
            version: version.to_string(),
            load_type: "Amount".to_string(),
            year: f.year.clone(),
            period: f.period.clone(),
            flag,
            file_name: file_name.clone(),
        })
        .collect();
    Some(rows)
}

/// Primary and copy recipients for a submission: the submitter with the
/// configured copy address, or the fallback address alone.
pub fn recipients(submission: &SubmissionInfo, config: &PipelineConfig) -> (String, Option<String>) {
    match &submission.user_email {
        Some(email) => (email.clone(), Some(config.cc_recipient.clone())),
        None => (config.fallback_recipient.clone(), None),
    }
}

/// The tables produced by a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOutput {
    pub file_name: String,
    pub kind: LoadKind,
    pub facts: Vec<FactRow>,
    pub capacity_flags: Option<Vec<CapacityFlagRow>>,
}

impl LoadOutput {
    pub fn assemble(
        mut facts: Vec<FactRow>,
        submission: &SubmissionInfo,
        capacity_accounts: &BTreeSet<String>,
        config: &PipelineConfig,
    ) -> Self {
        let kind = LoadKind::detect(&facts, config);
        let file_name = kind.file_name(submission, &config.run_timestamp());
        let (primary, cc) = recipients(submission, config);

        for fact in facts.iter_mut() {
            fact.file_name = file_name.clone();
            if submission.user_email.is_none() || fact.user_email.is_empty() {
                fact.user_email = primary.clone();
            }
            fact.cc_email = cc.clone();
        }

        let capacity_flags = capacity_flags(&facts, capacity_accounts, config);
        info!(
            "Load file {} assembled with {} rows{}",
            file_name,
            facts.len(),
            if capacity_flags.is_some() {
                " and a capacity flag table"
            } else {
                ""
            }
        );

        Self {
            file_name,
            kind,
            facts,
            capacity_flags,
        }
    }

    pub fn write_facts_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_csv(&self.facts, writer)
    }

    /// Writes nothing when the load has no capacity flag table.
    pub fn write_capacity_flags_csv<W: Write>(&self, writer: W) -> Result<()> {
        match &self.capacity_flags {
            Some(rows) => write_csv(rows, writer),
            None => Ok(()),
        }
    }
}

pub(crate) fn write_csv<T: Serialize, W: Write>(rows: &[T], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
