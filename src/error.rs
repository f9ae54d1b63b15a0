use crate::schema::{DuplicateRow, ValidationIssue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadSheetError {
    #[error("Load sheet does not follow the template layout ({} issue(s))", issues.len())]
    Layout { issues: Vec<ValidationIssue> },

    #[error("Workbook and load sheet names are too long ({} issue(s))", issues.len())]
    SheetName { issues: Vec<ValidationIssue> },

    #[error("Duplicate dimension combinations found on {} row(s)", rows.len())]
    DuplicateKeys { rows: Vec<DuplicateRow> },

    #[error("Invalid members found on the load sheet ({} issue(s))", issues.len())]
    Membership { issues: Vec<ValidationIssue> },

    #[error("Reference data is missing or incomplete ({} issue(s))", issues.len())]
    ReferenceData { issues: Vec<ValidationIssue> },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classes reported to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    LayoutError,
    DuplicateKeyError,
    MembershipError,
    ReferenceDataError,
    RuntimeFault,
}

impl LoadSheetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Layout { .. } | Self::SheetName { .. } => ErrorKind::LayoutError,
            Self::DuplicateKeys { .. } => ErrorKind::DuplicateKeyError,
            Self::Membership { .. } => ErrorKind::MembershipError,
            Self::ReferenceData { .. } => ErrorKind::ReferenceDataError,
            Self::Malformed(_) | Self::Csv(_) | Self::Serialization(_) | Self::Io(_) => {
                ErrorKind::RuntimeFault
            }
        }
    }

    /// True for the expected rejections a user fixes by editing the sheet.
    pub fn is_validation_failure(&self) -> bool {
        self.kind() != ErrorKind::RuntimeFault
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Layout { issues }
            | Self::SheetName { issues }
            | Self::Membership { issues }
            | Self::ReferenceData { issues } => issues,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadSheetError>;
