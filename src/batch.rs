use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{GenomeAccession, GenomeId, Stage};
use crate::error::PipelineError;

/// What a stage does with an item-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next genome.
    Isolate,
    /// Record the failure and stop the batch.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct GenomeItem {
    pub id: Option<GenomeId>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<GenomeAccession>,
    pub artifacts: BTreeMap<String, Utf8PathBuf>,
    pub status: ItemStatus,
}

impl GenomeItem {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            accession: None,
            artifacts: BTreeMap::new(),
            status: ItemStatus::Pending,
        }
    }

    pub fn from_accession(accession: GenomeAccession) -> Self {
        let mut item = Self::new(accession.as_str());
        item.accession = Some(accession);
        item
    }

    pub fn label(&self) -> &str {
        self.id.as_ref().map(GenomeId::as_str).unwrap_or(self.source.as_str())
    }

    pub fn record(&mut self, artifact: &str, path: Utf8PathBuf) {
        self.artifacts.insert(artifact.to_string(), path);
    }

    pub fn artifact(&self, artifact: &str) -> Option<&Utf8PathBuf> {
        self.artifacts.get(artifact)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ItemStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltKind {
    ToolUnavailable,
    ItemFailure,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Halt {
    pub kind: HaltKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genome: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub stage: Stage,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub items: Vec<GenomeItem>,
    pub halt: Option<Halt>,
}

impl BatchReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            started_at: iso_timestamp(),
            finished_at: None,
            items: Vec::new(),
            halt: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().filter(|item| item.is_failed()).count()
    }

    pub fn halted_early(&self) -> bool {
        self.halt.is_some()
    }

    pub fn summary_line(&self) -> String {
        match &self.halt {
            None => format!(
                "{}: all items processed ({} succeeded, {} failed)",
                self.stage,
                self.succeeded(),
                self.failed()
            ),
            Some(halt) => format!(
                "{}: processing halted early after {} item(s): {}",
                self.stage,
                self.items.len(),
                halt.reason
            ),
        }
    }

    /// Turns a halted report into the error the binary exits with.
    pub fn into_result(mut self) -> Result<BatchReport, PipelineError> {
        let Some(halt) = self.halt.take() else {
            return Ok(self);
        };
        let stage = self.stage.to_string();
        Err(match halt.kind {
            HaltKind::ToolUnavailable => PipelineError::ToolUnavailable(halt.reason),
            HaltKind::Cancelled => PipelineError::Cancelled { stage },
            HaltKind::ItemFailure => PipelineError::BatchHalted {
                stage,
                genome: halt.genome.unwrap_or_default(),
                reason: halt.reason,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub genome: String,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the tracing subscriber.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                genome = %event.genome,
                elapsed_s = elapsed.as_secs(),
                "{}",
                event.message
            ),
            None => tracing::info!(genome = %event.genome, "{}", event.message),
        }
    }
}

/// Cooperative stop flag, checked before every external invocation.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Loop bookkeeping shared by the three stage orchestrators.
pub struct BatchRun<'a> {
    policy: FailurePolicy,
    sink: &'a dyn ProgressSink,
    cancel: &'a Cancellation,
    report: BatchReport,
}

impl<'a> BatchRun<'a> {
    pub fn new(
        stage: Stage,
        policy: FailurePolicy,
        sink: &'a dyn ProgressSink,
        cancel: &'a Cancellation,
    ) -> Self {
        Self {
            policy,
            sink,
            cancel,
            report: BatchReport::new(stage),
        }
    }

    pub fn progress(&self, genome: &str, message: impl Into<String>) {
        self.sink.event(ProgressEvent {
            genome: genome.to_string(),
            message: message.into(),
            elapsed: None,
        });
    }

    pub fn progress_timed(&self, genome: &str, message: impl Into<String>, elapsed: Duration) {
        self.sink.event(ProgressEvent {
            genome: genome.to_string(),
            message: message.into(),
            elapsed: Some(elapsed),
        });
    }

    /// Returns `Err(Cancelled)` once the flag is set so callers can bail with `?`.
    pub fn ensure_not_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: self.report.stage.to_string(),
            });
        }
        Ok(())
    }

    /// Records the item's outcome and decides whether the loop continues.
    pub fn settle(
        &mut self,
        mut item: GenomeItem,
        outcome: Result<(), PipelineError>,
    ) -> ControlFlow<()> {
        let label = item.label().to_string();
        // A child interrupted by the same signal fails like any other item.
        let outcome = match outcome {
            Err(PipelineError::ItemFailure(_)) if self.cancel.is_cancelled() => {
                Err(PipelineError::Cancelled {
                    stage: self.report.stage.to_string(),
                })
            }
            other => other,
        };
        let halt = match outcome {
            Ok(()) => {
                item.status = ItemStatus::Succeeded;
                self.progress(&label, "done");
                None
            }
            Err(PipelineError::ToolUnavailable(reason)) => {
                tracing::error!(genome = %label, "tool unavailable: {reason}");
                item.status = ItemStatus::Failed {
                    reason: reason.clone(),
                };
                Some(Halt {
                    kind: HaltKind::ToolUnavailable,
                    genome: Some(label),
                    reason,
                })
            }
            Err(PipelineError::Cancelled { .. }) => {
                tracing::warn!(genome = %label, "cancelled");
                item.status = ItemStatus::Failed {
                    reason: "cancelled".to_string(),
                };
                Some(Halt {
                    kind: HaltKind::Cancelled,
                    genome: Some(label),
                    reason: "cancelled".to_string(),
                })
            }
            Err(err) => {
                let reason = err.to_string();
                item.status = ItemStatus::Failed {
                    reason: reason.clone(),
                };
                match self.policy {
                    FailurePolicy::Isolate => {
                        tracing::warn!(genome = %label, "skipping: {reason}");
                        None
                    }
                    FailurePolicy::Halt => {
                        tracing::error!(genome = %label, "halting batch: {reason}");
                        Some(Halt {
                            kind: HaltKind::ItemFailure,
                            genome: Some(label),
                            reason,
                        })
                    }
                }
            }
        };
        self.report.items.push(item);
        match halt {
            Some(halt) => {
                self.report.halt = Some(halt);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        }
    }

    pub fn finish(mut self) -> BatchReport {
        self.report.finished_at = Some(iso_timestamp());
        tracing::info!("{}", self.report.summary_line());
        self.report
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
