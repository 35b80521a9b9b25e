//! Per-call outcomes and how failures are presented to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::RequestKind;

/// What the upstream reported for one call of a bulk execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "lowercase")]
pub enum CallOutcome {
    Success(Value),
    Failure(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into the caller-facing shape under `mode`.
    pub fn normalize(self, mode: FailureMode) -> ReadOutcome {
        match self {
            Self::Success(value) => ReadOutcome::Value(value),
            Self::Failure(reason) => mode.on_failure(reason),
        }
    }
}

/// How failures are reported to callers.
///
/// `Swallow` collapses a failed call into [`ReadOutcome::Empty`], making it
/// indistinguishable from an empty read. `Report` keeps the failure visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    #[default]
    Swallow,
    Report,
}

impl FailureMode {
    /// Outcome for a call the upstream rejected.
    pub fn on_failure(self, reason: String) -> ReadOutcome {
        match self {
            Self::Swallow => ReadOutcome::Empty,
            Self::Report => ReadOutcome::Failed(reason),
        }
    }
}

/// The value one caller receives for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "lowercase")]
pub enum ReadOutcome {
    /// The call succeeded.
    Value(Value),
    /// No value: the call failed under `FailureMode::Swallow`, the batch
    /// failed as a whole, or the call was never sent (unresolved).
    Empty,
    /// The call failed; only produced under `FailureMode::Report`.
    Failed(String),
}

impl ReadOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// The settled result of one queued request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadData {
    Single(ReadOutcome),
    Multiple(Vec<ReadOutcome>),
}

impl ReadData {
    /// All-empty data of the given shape.
    pub fn empty(kind: RequestKind, len: usize) -> Self {
        match kind {
            RequestKind::Single => Self::Single(ReadOutcome::Empty),
            RequestKind::Multiple => Self::Multiple(vec![ReadOutcome::Empty; len]),
        }
    }

    /// Assemble data of the given shape from per-position outcomes.
    pub fn from_outcomes(kind: RequestKind, mut outcomes: Vec<ReadOutcome>) -> Self {
        match kind {
            RequestKind::Single => Self::Single(outcomes.pop().unwrap_or(ReadOutcome::Empty)),
            RequestKind::Multiple => Self::Multiple(outcomes),
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Single(_) => RequestKind::Single,
            Self::Multiple(_) => RequestKind::Multiple,
        }
    }

    /// Per-position outcomes (a single read is a list of one).
    pub fn outcomes(&self) -> &[ReadOutcome] {
        match self {
            Self::Single(o) => std::slice::from_ref(o),
            Self::Multiple(list) => list,
        }
    }

    pub fn into_outcomes(self) -> Vec<ReadOutcome> {
        match self {
            Self::Single(o) => vec![o],
            Self::Multiple(list) => list,
        }
    }

    /// Value of a single read.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Single(o) => o.value(),
            Self::Multiple(_) => None,
        }
    }

    /// Values of a multiple read, `None` in failed or empty positions.
    pub fn values(&self) -> Vec<Option<Value>> {
        self.outcomes().iter().map(|o| o.value().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn swallow_hides_failures() {
        let o = CallOutcome::Failure("execution reverted".into()).normalize(FailureMode::Swallow);
        assert_eq!(o, ReadOutcome::Empty);
    }

    #[test]
    fn report_keeps_failures() {
        let o = CallOutcome::Failure("execution reverted".into()).normalize(FailureMode::Report);
        assert_eq!(o, ReadOutcome::Failed("execution reverted".into()));
        assert!(o.is_failed());
    }

    #[test]
    fn success_passes_through() {
        let o = CallOutcome::Success(json!("0x10")).normalize(FailureMode::Report);
        assert_eq!(o.value(), Some(&json!("0x10")));
    }

    #[test]
    fn empty_data_has_shape() {
        assert_eq!(ReadData::empty(RequestKind::Single, 1), ReadData::Single(ReadOutcome::Empty));
        match ReadData::empty(RequestKind::Multiple, 3) {
            ReadData::Multiple(list) => assert_eq!(list.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn values_keep_positions() {
        let data = ReadData::Multiple(vec![
            ReadOutcome::Value(json!(1)),
            ReadOutcome::Empty,
            ReadOutcome::Value(json!(3)),
        ]);
        assert_eq!(data.values(), vec![Some(json!(1)), None, Some(json!(3))]);
        assert_eq!(data.value(), None);
    }

    #[test]
    fn outcome_serialization() {
        let s = serde_json::to_string(&CallOutcome::Success(json!(7))).unwrap();
        assert_eq!(s, r#"{"status":"success","result":7}"#);
        let mode: FailureMode = serde_json::from_str("\"report\"").unwrap();
        assert_eq!(mode, FailureMode::Report);
    }
}
