//! Error reports routed to the notification collaborator when a run fails.

use crate::config::PipelineConfig;
use crate::error::{ErrorKind, LoadSheetError, Result};
use crate::ingestion::SubmissionInfo;
use crate::output::{recipients, write_csv};
use crate::schema::ValidationIssue;
use serde::{Deserialize, Serialize};
use std::io::Write;

const NOTHING_LOADED: &str = "NOTE: No data on your sheet has been loaded.";
const GENERIC_SUBJECT: &str = "WARNING: Load process failed - see attachment for details";

/// One line of the error attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReportRow {
    #[serde(rename = "Rule")]
    pub rule: String,
    #[serde(rename = "Details")]
    pub detail: String,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "UserEmail")]
    pub user_email: String,
    #[serde(rename = "ccEmail")]
    pub cc_email: Option<String>,
    #[serde(rename = "ErrorEmailSubject")]
    pub subject: String,
    #[serde(rename = "ErrorEmailBody")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// Name the attachment is filed under (`Validation_Errors_<user>_<book>_<sheet>.txt`).
    pub report_name: String,
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub cc_recipient: Option<String>,
    pub rows: Vec<ErrorReportRow>,
}

impl ErrorReport {
    pub fn from_error(
        error: &LoadSheetError,
        submission: &SubmissionInfo,
        config: &PipelineConfig,
    ) -> Self {
        let (subject, body) = message_for(error, config);
        let (recipient, cc_recipient) = recipients(submission, config);
        let file_name = submission.enhanced_file_name();

        let details: Vec<ValidationIssue> = match error {
            LoadSheetError::DuplicateKeys { rows } => rows
                .iter()
                .map(|r| ValidationIssue::new(format!("Row {}", r.row_number), r.key.join(" | ")))
                .collect(),
            e if e.is_validation_failure() => e.issues().to_vec(),
            e => vec![ValidationIssue::new("Runtime Error", e.to_string())],
        };

        let rows = details
            .into_iter()
            .map(|issue| ErrorReportRow {
                rule: issue.rule,
                detail: issue.detail,
                file_name: file_name.clone(),
                user_email: recipient.clone(),
                cc_email: cc_recipient.clone(),
                subject: subject.clone(),
                body: body.clone(),
            })
            .collect();

        Self {
            kind: error.kind(),
            report_name: format!("Validation_Errors_{}", file_name),
            subject,
            body,
            recipient,
            cc_recipient,
            rows,
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        write_csv(&self.rows, writer)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn message_for(error: &LoadSheetError, config: &PipelineConfig) -> (String, String) {
    let (subject, body) = match error {
        LoadSheetError::SheetName { .. } => (
            GENERIC_SUBJECT.to_string(),
            format!(
                "The load failed because the combined length of the workbook and load sheet names exceeds {} characters. See the attachment for details.",
                config.max_sheet_name_length
            ),
        ),
        LoadSheetError::ReferenceData { .. } => (
            GENERIC_SUBJECT.to_string(),
            "The load failed because at least one dimension validation file is missing or incomplete. See the attachment for details.".to_string(),
        ),
        LoadSheetError::Layout { .. } => (
            GENERIC_SUBJECT.to_string(),
            "The load process failed. Please see the attachment for details.".to_string(),
        ),
        LoadSheetError::DuplicateKeys { .. } => (
            "WARNING: Load process failed - duplicate rows found on the load sheet".to_string(),
            "Duplicate account/cost center/internal order combinations were found on the load sheet. The attachment lists the sheet row numbers of every duplicate. Please delete the appropriate rows from the sheet and repeat the load process.".to_string(),
        ),
        LoadSheetError::Membership { .. } => (
            "WARNING: Load process failed - invalid members found on the load sheet".to_string(),
            "The attached file lists the invalid members found on the load sheet. Invalid members are those without an exact match in the reference outline; capitalization, special characters and spaces are the usual causes. Please correct the load sheet and repeat the load process.".to_string(),
        ),
        _ => (
            "CRITICAL ERROR: Load process failed - see attachment for details".to_string(),
            "A critical error occurred during the load process. Please see the attachment for details.".to_string(),
        ),
    };
    (subject, format!("{} {}", body, NOTHING_LOADED))
}
