use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::StepId;

/// Kind of a transaction log entry, persisted as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LogKind {
    StartTx = 1,
    StartStep = 2,
    EndStep = 3,
    StartCompensateStep = 4,
    EndCompensateStep = 5,
    EndTx = 6,
    AbortTx = 7,
}

impl LogKind {
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether entries of this kind carry a step id.
    #[must_use]
    pub fn is_step_scoped(self) -> bool {
        matches!(
            self,
            Self::StartStep | Self::EndStep | Self::StartCompensateStep | Self::EndCompensateStep
        )
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartTx => "StartTx",
            Self::StartStep => "StartStep",
            Self::EndStep => "EndStep",
            Self::StartCompensateStep => "StartCompensateStep",
            Self::EndCompensateStep => "EndCompensateStep",
            Self::EndTx => "EndTx",
            Self::AbortTx => "AbortTx",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown log entry kind {0}")]
pub struct UnknownLogKind(pub u8);

impl TryFrom<u8> for LogKind {
    type Error = UnknownLogKind;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::StartTx),
            2 => Ok(Self::StartStep),
            3 => Ok(Self::EndStep),
            4 => Ok(Self::StartCompensateStep),
            5 => Ok(Self::EndCompensateStep),
            6 => Ok(Self::EndTx),
            7 => Ok(Self::AbortTx),
            other => Err(UnknownLogKind(other)),
        }
    }
}

impl From<LogKind> for u8 {
    fn from(kind: LogKind) -> Self {
        kind.code()
    }
}

/// One marshalled argument: the registry name of its type and its encoded
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgData {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

impl ArgData {
    #[must_use]
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }
}

/// One immutable record in a transaction's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tx_id: Option<StepId>,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgData>,
}

impl LogEntry {
    fn new(kind: LogKind, sub_tx_id: Option<StepId>, args: Vec<ArgData>) -> Self {
        Self {
            kind,
            sub_tx_id,
            time: Utc::now(),
            args,
        }
    }

    #[must_use]
    pub fn start_tx() -> Self {
        Self::new(LogKind::StartTx, None, Vec::new())
    }

    #[must_use]
    pub fn start_step(step: StepId, args: Vec<ArgData>) -> Self {
        Self::new(LogKind::StartStep, Some(step), args)
    }

    #[must_use]
    pub fn end_step(step: StepId) -> Self {
        Self::new(LogKind::EndStep, Some(step), Vec::new())
    }

    #[must_use]
    pub fn start_compensate(step: StepId) -> Self {
        Self::new(LogKind::StartCompensateStep, Some(step), Vec::new())
    }

    #[must_use]
    pub fn end_compensate(step: StepId) -> Self {
        Self::new(LogKind::EndCompensateStep, Some(step), Vec::new())
    }

    #[must_use]
    pub fn end_tx() -> Self {
        Self::new(LogKind::EndTx, None, Vec::new())
    }

    #[must_use]
    pub fn abort_tx() -> Self {
        Self::new(LogKind::AbortTx, None, Vec::new())
    }

    /// Encodes the entry into its persisted form.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses an entry from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a valid encoded entry, or if a
    /// step-scoped entry carries no step id.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let entry: Self = serde_json::from_str(raw)?;
        if entry.kind.is_step_scoped() && entry.sub_tx_id.is_none() {
            return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                "{} entry without a step id",
                entry.kind
            )));
        }
        Ok(entry)
    }
}
