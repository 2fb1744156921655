use std::fmt;

use chrono::{DateTime, Utc};

use crate::entry::{ArgData, LogEntry, LogKind};
use crate::error::SagaError;
use crate::ids::StepId;

/// Lifecycle state of a transaction, derived from its persisted log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    /// No entries.
    New,
    /// `StartTx` written, no step started since.
    Started,
    /// The action of this step was started and has not confirmed completion.
    StepRunning(StepId),
    /// The action of this step completed.
    StepDone(StepId),
    /// `AbortTx` written, compensations outstanding.
    Aborting,
    /// The compensation of this step was started.
    Compensating(StepId),
    /// Every started step has been compensated.
    Aborted,
    /// `EndTx` written.
    Ended,
}

impl TxState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted | Self::Ended)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("new"),
            Self::Started => f.write_str("started"),
            Self::StepRunning(step) => write!(f, "running '{step}'"),
            Self::StepDone(step) => write!(f, "done with '{step}'"),
            Self::Aborting => f.write_str("aborting"),
            Self::Compensating(step) => write!(f, "compensating '{step}'"),
            Self::Aborted => f.write_str("aborted"),
            Self::Ended => f.write_str("ended"),
        }
    }
}

/// Status of a started step in the transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Action started, completion never recorded.
    Started,
    /// Action completed.
    Executed,
    /// Compensation started, completion never recorded.
    Compensating,
    /// Compensation completed.
    Compensated,
}

/// Record of one started step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Id of the step.
    pub step: StepId,
    /// Current status.
    pub status: StepStatus,
    /// When the action was started.
    pub started_at: DateTime<Utc>,
    /// When the latest action or compensation completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Marshalled arguments the step was started with.
    pub args: Vec<ArgData>,
}

/// Decoded log of one transaction.
#[derive(Debug, Clone, Default)]
pub struct TxHistory {
    entries: Vec<LogEntry>,
}

impl TxHistory {
    #[must_use]
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Decodes persisted entries in order.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Serialization` naming the first entry that does
    /// not decode.
    pub fn from_encoded<S: AsRef<str>>(raw: &[S]) -> Result<Self, SagaError> {
        let entries = raw
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                LogEntry::decode(entry.as_ref()).map_err(|source| SagaError::Serialization {
                    what: format!("decode log entry {index}"),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry kinds in log order.
    #[must_use]
    pub fn kinds(&self) -> Vec<LogKind> {
        self.entries.iter().map(|entry| entry.kind).collect()
    }

    /// Folds the log into the transaction's current state.
    #[must_use]
    pub fn state(&self) -> TxState {
        let mut state = TxState::New;
        let mut started = 0_usize;
        let mut compensated = 0_usize;

        for entry in &self.entries {
            let step = || entry.sub_tx_id.clone().unwrap_or_default();
            state = match entry.kind {
                LogKind::StartTx => TxState::Started,
                LogKind::StartStep => {
                    started += 1;
                    TxState::StepRunning(step())
                }
                LogKind::EndStep => TxState::StepDone(step()),
                LogKind::AbortTx => {
                    compensated = 0;
                    if started == 0 {
                        TxState::Aborted
                    } else {
                        TxState::Aborting
                    }
                }
                LogKind::StartCompensateStep => TxState::Compensating(step()),
                LogKind::EndCompensateStep => {
                    compensated += 1;
                    if compensated >= started {
                        TxState::Aborted
                    } else {
                        TxState::Aborting
                    }
                }
                LogKind::EndTx => TxState::Ended,
            };
        }
        state
    }

    /// One record per `StartStep` entry, in the order the steps started.
    ///
    /// Each rollback pass compensates the started steps from the first one
    /// onward, so compensation entries are matched to records by position
    /// since the latest `AbortTx`.
    #[must_use]
    pub fn records(&self) -> Vec<StepRecord> {
        let mut records: Vec<StepRecord> = Vec::new();
        let mut cursor = 0;

        for entry in &self.entries {
            let Some(step) = entry.sub_tx_id.as_ref() else {
                if entry.kind == LogKind::AbortTx {
                    cursor = 0;
                }
                continue;
            };
            match entry.kind {
                LogKind::StartStep => records.push(StepRecord {
                    step: step.clone(),
                    status: StepStatus::Started,
                    started_at: entry.time,
                    completed_at: None,
                    args: entry.args.clone(),
                }),
                LogKind::EndStep => {
                    if let Some(record) = records
                        .iter_mut()
                        .rev()
                        .find(|r| r.step == *step && r.status == StepStatus::Started)
                    {
                        record.status = StepStatus::Executed;
                        record.completed_at = Some(entry.time);
                    }
                }
                LogKind::StartCompensateStep => {
                    if let Some(offset) = records[cursor.min(records.len())..]
                        .iter()
                        .position(|r| r.step == *step)
                    {
                        cursor += offset;
                        records[cursor].status = StepStatus::Compensating;
                    }
                }
                LogKind::EndCompensateStep => {
                    if let Some(record) = records.get_mut(cursor).filter(|r| r.step == *step) {
                        record.status = StepStatus::Compensated;
                        record.completed_at = Some(entry.time);
                        cursor += 1;
                    }
                }
                LogKind::StartTx | LogKind::EndTx | LogKind::AbortTx => {}
            }
        }
        records
    }

    /// Get a summary of the transaction for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in self.records() {
            let status = match record.status {
                StepStatus::Started => "…",
                StepStatus::Executed => "✓",
                StepStatus::Compensating => "⚠",
                StepStatus::Compensated => "↩",
            };
            lines.push(format!("{status} {}", record.step));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> StepId {
        StepId::from(id)
    }

    fn history(entries: Vec<LogEntry>) -> TxHistory {
        TxHistory::new(entries)
    }

    #[test]
    fn empty_log_is_new() {
        let history = TxHistory::default();

        assert_eq!(history.state(), TxState::New);
        assert!(history.records().is_empty());
        assert!(history.summary().is_empty());
    }

    #[test]
    fn forward_progress_states() {
        let mut entries = vec![LogEntry::start_tx()];
        assert_eq!(history(entries.clone()).state(), TxState::Started);

        entries.push(LogEntry::start_step(step("debit"), Vec::new()));
        assert_eq!(history(entries.clone()).state(), TxState::StepRunning(step("debit")));

        entries.push(LogEntry::end_step(step("debit")));
        assert_eq!(history(entries.clone()).state(), TxState::StepDone(step("debit")));

        entries.push(LogEntry::end_tx());
        let state = history(entries).state();
        assert_eq!(state, TxState::Ended);
        assert!(state.is_terminal());
    }

    #[test]
    fn abort_without_started_steps_is_aborted() {
        let state = history(vec![LogEntry::start_tx(), LogEntry::abort_tx()]).state();

        assert_eq!(state, TxState::Aborted);
    }

    #[test]
    fn aborted_once_every_started_step_is_compensated() {
        let mut entries = vec![
            LogEntry::start_tx(),
            LogEntry::start_step(step("debit"), Vec::new()),
            LogEntry::end_step(step("debit")),
            LogEntry::start_step(step("credit"), Vec::new()),
            LogEntry::abort_tx(),
        ];
        assert_eq!(history(entries.clone()).state(), TxState::Aborting);

        entries.push(LogEntry::start_compensate(step("debit")));
        assert_eq!(history(entries.clone()).state(), TxState::Compensating(step("debit")));

        entries.push(LogEntry::end_compensate(step("debit")));
        assert_eq!(history(entries.clone()).state(), TxState::Aborting);

        entries.push(LogEntry::start_compensate(step("credit")));
        entries.push(LogEntry::end_compensate(step("credit")));
        assert_eq!(history(entries).state(), TxState::Aborted);
    }

    #[test]
    fn retried_pass_restarts_compensation_count() {
        let entries = vec![
            LogEntry::start_tx(),
            LogEntry::start_step(step("a"), Vec::new()),
            LogEntry::start_step(step("b"), Vec::new()),
            LogEntry::abort_tx(),
            LogEntry::start_compensate(step("a")),
            LogEntry::end_compensate(step("a")),
            LogEntry::start_compensate(step("b")),
            LogEntry::abort_tx(),
            LogEntry::start_compensate(step("a")),
            LogEntry::end_compensate(step("a")),
        ];

        assert_eq!(history(entries).state(), TxState::Aborting);
    }

    #[test]
    fn records_track_each_started_step() {
        let entries = vec![
            LogEntry::start_tx(),
            LogEntry::start_step(step("debit"), vec![ArgData::new("i32", "100")]),
            LogEntry::end_step(step("debit")),
            LogEntry::start_step(step("credit"), Vec::new()),
        ];

        let records = history(entries).records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, StepStatus::Executed);
        assert!(records[0].completed_at.is_some());
        assert_eq!(records[0].args, vec![ArgData::new("i32", "100")]);
        assert_eq!(records[1].status, StepStatus::Started);
        assert!(records[1].completed_at.is_none());
    }

    #[test]
    fn records_match_compensations_by_position() {
        let entries = vec![
            LogEntry::start_tx(),
            LogEntry::start_step(step("reserve"), Vec::new()),
            LogEntry::end_step(step("reserve")),
            LogEntry::start_step(step("reserve"), Vec::new()),
            LogEntry::abort_tx(),
            LogEntry::start_compensate(step("reserve")),
            LogEntry::end_compensate(step("reserve")),
            LogEntry::start_compensate(step("reserve")),
        ];

        let records = history(entries).records();

        assert_eq!(records[0].status, StepStatus::Compensated);
        assert_eq!(records[1].status, StepStatus::Compensating);
    }

    #[test]
    fn summary_formats_all_steps() {
        let entries = vec![
            LogEntry::start_tx(),
            LogEntry::start_step(step("debit"), Vec::new()),
            LogEntry::end_step(step("debit")),
            LogEntry::start_step(step("credit"), Vec::new()),
            LogEntry::end_step(step("credit")),
            LogEntry::start_step(step("notify"), Vec::new()),
            LogEntry::abort_tx(),
            LogEntry::start_compensate(step("debit")),
            LogEntry::end_compensate(step("debit")),
            LogEntry::start_compensate(step("credit")),
        ];

        let summary = history(entries).summary();

        assert_eq!(summary, "↩ debit\n⚠ credit\n… notify");
    }

    #[test]
    fn from_encoded_reports_bad_entry_index() -> Result<(), serde_json::Error> {
        let raw = vec![LogEntry::start_tx().encode()?, String::from("not json")];

        let err = TxHistory::from_encoded(&raw).expect_err("second entry is corrupt");

        assert_eq!(err.to_string(), "could not decode log entry 1");
        Ok(())
    }

    #[test]
    fn from_encoded_rejects_step_entry_without_step_id() -> Result<(), serde_json::Error> {
        let raw = vec![
            LogEntry::start_tx().encode()?,
            String::from(r#"{"type":2,"time":"2024-01-01T00:00:00Z","args":[]}"#),
        ];

        let err = TxHistory::from_encoded(&raw).expect_err("step id missing");

        assert!(matches!(err, SagaError::Serialization { .. }));
        assert_eq!(err.to_string(), "could not decode log entry 1");
        Ok(())
    }
}
