//! # FPA Load Builder
//!
//! Validates user-authored, wide-format financial planning load sheets and
//! reshapes them into narrow fact tables for a consolidation load.
//!
//! ## Core Concepts
//!
//! - **Load Sheet**: nine dimension columns, any number of period columns and
//!   the FileName/UserEmail metadata columns, with month labels on the first row
//! - **Reference Catalog**: member tables per dimension; only leaf members that
//!   pass the run policy are loadable
//! - **Classification**: columns are recognised by content, not by header
//! - **Fact Rows**: one row per dimension combination and period, enriched with
//!   the value from the latest backup extract
//! - **Error Report**: every failed run yields an itemized report instead of a
//!   load file
//!
//! ## Example
//!
//! ```rust,ignore
//! use fpa_load_builder::*;
//!
//! let inputs = PipelineInputs {
//!     worksheet: read_worksheet_csv(File::open("load_sheet.csv")?)?,
//!     catalog,
//!     backup: BackupSnapshot::from_csv_reader(File::open("backup.csv")?)?,
//!     capacity_accounts: read_capacity_accounts(File::open("capacity.csv")?)?,
//! };
//!
//! match LoadSheetProcessor::process_or_report(&inputs, &PipelineConfig::default()) {
//!     PipelineOutcome::Loaded(output) => output.write_facts_csv(File::create(&output.file_name)?)?,
//!     PipelineOutcome::Rejected(report) => report.write_csv(File::create(&report.report_name)?)?,
//! }
//! ```

pub mod backup;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod duplicates;
pub mod error;
pub mod ingestion;
pub mod layout;
pub mod members;
pub mod output;
pub mod report;
pub mod reshape;
pub mod schema;
pub mod utils;

pub use backup::{enrich_with_backup, BackupRow, BackupSnapshot};
pub use catalog::{
    detect_encoding, DimensionMember, DimensionTable, MemberEncoding, MemberIndex,
    ReferenceCatalog,
};
pub use classify::{classify_columns, relabel, Classification, ColumnRole, LoadSheet};
pub use config::PipelineConfig;
pub use diagnostics::{DiagnosticSink, LogSink, Outcome, RecordingSink, Stage, StageEvent};
pub use duplicates::find_duplicates;
pub use error::{ErrorKind, LoadSheetError, Result};
pub use ingestion::{prepare_worksheet, read_capacity_accounts, read_worksheet_csv, SubmissionInfo};
pub use layout::{validate_layout, validate_sheet_names};
pub use members::validate_members;
pub use output::{LoadKind, LoadOutput};
pub use report::{ErrorReport, ErrorReportRow};
pub use reshape::reshape;
pub use schema::*;

use log::{error, info};
use std::collections::BTreeSet;

/// Everything the host supplies for one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub worksheet: Worksheet,
    pub catalog: ReferenceCatalog,
    pub backup: BackupSnapshot,
    pub capacity_accounts: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Loaded(LoadOutput),
    Rejected(ErrorReport),
}

pub struct LoadSheetProcessor;

impl LoadSheetProcessor {
    pub fn process(inputs: &PipelineInputs, config: &PipelineConfig) -> Result<LoadOutput> {
        Self::process_with_sink(inputs, config, &mut LogSink)
    }

    pub fn process_with_sink(
        inputs: &PipelineInputs,
        config: &PipelineConfig,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<LoadOutput> {
        Self::run(inputs, config, sink).1
    }

    /// Runs the pipeline and turns any failure, expected or not, into an
    /// error report for the submitter.
    pub fn process_or_report(inputs: &PipelineInputs, config: &PipelineConfig) -> PipelineOutcome {
        let (submission, result) = Self::run(inputs, config, &mut LogSink);
        match result {
            Ok(output) => PipelineOutcome::Loaded(output),
            Err(e) => {
                let report = ErrorReport::from_error(&e, &submission, config);
                if e.is_validation_failure() {
                    error!(
                        "Validation failed: {}. For details see {}",
                        e, report.report_name
                    );
                } else {
                    error!("Load process failed with a runtime error: {}", e);
                }
                PipelineOutcome::Rejected(report)
            }
        }
    }

    fn run(
        inputs: &PipelineInputs,
        config: &PipelineConfig,
        sink: &mut dyn DiagnosticSink,
    ) -> (SubmissionInfo, Result<LoadOutput>) {
        let sheet = prepare_worksheet(&inputs.worksheet, config);
        sink.record(StageEvent::passed(Stage::Preparation, sheet.height()));

        let submission = SubmissionInfo::from_worksheet(&sheet, config);
        info!(
            "Processing load sheet '{}' of workbook '{}'",
            submission.load_sheet(),
            submission.workbook()
        );

        let result = Self::validate_and_build(&sheet, &submission, inputs, config, sink);
        (submission, result)
    }

    fn validate_and_build(
        sheet: &Worksheet,
        submission: &SubmissionInfo,
        inputs: &PipelineInputs,
        config: &PipelineConfig,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<LoadOutput> {
        track(sink, Stage::SheetName, validate_sheet_names(submission, config), |_| 0)?;
        track(
            sink,
            Stage::ReferenceData,
            inputs.catalog.check_completeness(config),
            |_| 0,
        )?;

        let form = SheetForm::detect(sheet);
        track(sink, Stage::Layout, validate_layout(sheet, form), |_| 0)?;

        let index = MemberIndex::build(&inputs.catalog, config);
        let classification = classify_columns(sheet, form, &index);
        sink.record(StageEvent::passed(
            Stage::Classification,
            classification.period_columns().count(),
        ));

        track(
            sink,
            Stage::Duplicates,
            duplicates::check_duplicates(sheet, &classification),
            |_| 0,
        )?;
        track(
            sink,
            Stage::Members,
            members::check_sheet_members(sheet, &classification, &index),
            |_| 0,
        )?;

        let load_sheet = relabel(sheet, &classification, &index)?;
        let facts = track(sink, Stage::Reshape, reshape(&load_sheet), Vec::len)?;

        let facts = enrich_with_backup(facts, &inputs.backup);
        sink.record(StageEvent::passed(Stage::Backup, facts.len()));

        let output = LoadOutput::assemble(facts, submission, &inputs.capacity_accounts, config);
        sink.record(StageEvent::passed(Stage::Output, output.facts.len()));
        info!("Worksheet validation successful. Load file {} produced", output.file_name);
        Ok(output)
    }
}

fn track<T>(
    sink: &mut dyn DiagnosticSink,
    stage: Stage,
    result: Result<T>,
    count: impl FnOnce(&T) -> usize,
) -> Result<T> {
    match &result {
        Ok(value) => sink.record(StageEvent::passed(stage, count(value))),
        Err(LoadSheetError::DuplicateKeys { rows }) => {
            sink.record(StageEvent::failed(stage, rows.len()))
        }
        Err(e) => sink.record(StageEvent::failed(stage, e.issues().len())),
    }
    result
}

pub fn process_load_sheet(inputs: &PipelineInputs, config: &PipelineConfig) -> Result<LoadOutput> {
    LoadSheetProcessor::process(inputs, config)
}
