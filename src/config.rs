use crate::error::Result;
use crate::schema::Dimension;
use crate::utils::run_timestamp;
use chrono::{Datelike, Local, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Business policy for a single pipeline run.
///
/// The run timestamp, notification addresses, completeness thresholds and
/// member restrictions all live here so a host can inject them per invocation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(
        description = "Moment the run started. Drives the output file timestamp and the current year used to filter Year members."
    )]
    pub run_at: NaiveDateTime,

    #[schemars(description = "Recipient used when the submitter's address cannot be determined")]
    pub fallback_recipient: String,

    #[schemars(description = "Copy recipient added whenever the submitter is the primary recipient")]
    pub cc_recipient: String,

    #[schemars(
        description = "Submitter addresses of exactly this length are treated as a bare user id and replaced by the fallback recipient"
    )]
    pub forced_fallback_email_length: Option<usize>,

    #[schemars(description = "Maximum combined length of the workbook and load sheet names")]
    pub max_sheet_name_length: usize,

    #[schemars(
        description = "Minimum row count per reference table; a shorter table is considered an incomplete extract"
    )]
    pub minimum_catalog_rows: BTreeMap<Dimension, usize>,

    #[schemars(
        description = "Per-dimension restriction on loadable member names (case-insensitive). Dimensions without an entry are unrestricted."
    )]
    pub member_allowlists: BTreeMap<Dimension, Vec<String>>,

    #[schemars(description = "Accepted values of the Account 'Data Storage' attribute")]
    pub account_storage_values: Vec<String>,

    #[schemars(
        description = "Year members older than the current year minus this many years are not loadable"
    )]
    pub year_lookback: i32,

    #[schemars(description = "Cost centers that mark a load as fleet-only")]
    pub fleet_cost_centers: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let minimum_catalog_rows = BTreeMap::from([
            (Dimension::Account, 2796),
            (Dimension::CostCenter, 1743),
            (Dimension::InternalOrder, 257),
            (Dimension::Company, 14),
            (Dimension::ProfitCenter, 535),
            (Dimension::EquipmentType, 11),
            (Dimension::Scenario, 29),
            (Dimension::Version, 26),
            (Dimension::Type, 8),
            (Dimension::Year, 29),
            (Dimension::Period, 112),
        ]);

        let member_allowlists = BTreeMap::from([
            (Dimension::Company, vec!["CO:9001".to_string()]),
            (
                Dimension::ProfitCenter,
                vec!["PC:1000".to_string(), "HDQ (1000)".to_string()],
            ),
            (Dimension::EquipmentType, vec!["ET:None".to_string()]),
            (
                Dimension::Scenario,
                vec![
                    "Actual".to_string(),
                    "Forecast".to_string(),
                    "Flash_Base".to_string(),
                ],
            ),
            (
                Dimension::Version,
                vec![
                    "Final".to_string(),
                    "Working".to_string(),
                    "Current Capacity".to_string(),
                    "Current Capacity2".to_string(),
                ],
            ),
            (
                Dimension::Type,
                vec!["Amount".to_string(), "Adjustment".to_string()],
            ),
        ]);

        Self {
            run_at: Local::now().naive_local(),
            fallback_recipient: "fpa-load-admin@example.com".to_string(),
            cc_recipient: "fpa-load-admin@example.com".to_string(),
            forced_fallback_email_length: Some(9),
            max_sheet_name_length: 80,
            minimum_catalog_rows,
            member_allowlists,
            account_storage_values: vec![
                "STORE DATA".to_string(),
                "NEVER SHARE".to_string(),
                "STORE".to_string(),
            ],
            year_lookback: 1,
            fleet_cost_centers: vec![
                "CC:40001".to_string(),
                "Non Operating (40001)".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(PipelineConfig);
        serde_json::to_string_pretty(&schema)
    }

    pub fn with_run_at(mut self, run_at: NaiveDateTime) -> Self {
        self.run_at = run_at;
        self
    }

    /// Replaces every completeness threshold with `rows`.
    pub fn with_minimum_catalog_rows(mut self, rows: usize) -> Self {
        for threshold in self.minimum_catalog_rows.values_mut() {
            *threshold = rows;
        }
        self
    }

    pub fn run_timestamp(&self) -> String {
        run_timestamp(&self.run_at)
    }

    pub fn current_year(&self) -> i32 {
        self.run_at.year()
    }

    /// Whether a submitter address must be replaced by the fallback recipient.
    pub fn forces_fallback(&self, email: &str) -> bool {
        self.forced_fallback_email_length == Some(email.chars().count())
    }

    pub fn is_fleet_cost_center(&self, cost_center: &str) -> bool {
        self.fleet_cost_centers.iter().any(|cc| cc == cost_center)
    }

    /// Account data-storage check; case, space and underscore insensitive.
    pub fn is_loadable_storage(&self, storage: &str) -> bool {
        let normalized = normalize_storage(storage);
        self.account_storage_values
            .iter()
            .any(|v| normalize_storage(v) == normalized)
    }
}

fn normalize_storage(value: &str) -> String {
    value.trim().to_uppercase().replace('_', " ")
}
