use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    SheetName,
    ReferenceData,
    Preparation,
    Layout,
    Classification,
    Duplicates,
    Members,
    Reshape,
    Backup,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SheetName => "sheet-name",
            Stage::ReferenceData => "reference-data",
            Stage::Preparation => "preparation",
            Stage::Layout => "layout",
            Stage::Classification => "classification",
            Stage::Duplicates => "duplicates",
            Stage::Members => "members",
            Stage::Reshape => "reshape",
            Stage::Backup => "backup",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Passed,
    Failed,
}

/// One pipeline stage result. `count` is stage specific: rows kept, issues
/// found, fact rows produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub outcome: Outcome,
    pub count: usize,
}

impl StageEvent {
    pub fn passed(stage: Stage, count: usize) -> Self {
        Self {
            stage,
            outcome: Outcome::Passed,
            count,
        }
    }

    pub fn failed(stage: Stage, count: usize) -> Self {
        Self {
            stage,
            outcome: Outcome::Failed,
            count,
        }
    }
}

/// Receiver of the stage event stream.
pub trait DiagnosticSink {
    fn record(&mut self, event: StageEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn record(&mut self, event: StageEvent) {
        match event.outcome {
            Outcome::Passed => info!("Stage {} passed ({})", event.stage, event.count),
            Outcome::Failed => error!("Stage {} failed ({})", event.stage, event.count),
        }
    }
}

/// Keeps every event, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<StageEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events.iter().map(|e| e.stage).collect()
    }

    pub fn failure(&self) -> Option<&StageEvent> {
        self.events.iter().find(|e| e.outcome == Outcome::Failed)
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&mut self, event: StageEvent) {
        self.events.push(event);
    }
}
