use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod aggregator;
pub mod parser;

pub use aggregator::{
    load_sources, load_texts, InMemorySources, LoadProgress, LoadReport, ProgressCallback,
    SourceFetcher, TrajectoryAggregator,
};
pub use parser::{
    parse_records, parse_report, ParseReport, SkipReason, SkippedLine, COVARIANCE_MARKER,
    REQUIRED_FIELDS,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("source `{0}` has no fetch capability registered")]
    UnregisteredSource(String),
}

/// Failure reported by a fetch collaborator for one source.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum FetchError {
    /// The text could not be obtained; the run continues with the next source.
    #[error("{reason}")]
    Unavailable { source_id: String, reason: String },
    /// The collaborator was handed an identifier it cannot serve. Aborts the run.
    #[error("source `{0}` is not registered")]
    Unregistered(String),
}

impl FetchError {
    #[must_use]
    pub fn unavailable(source_id: impl Into<String>, reason: impl Display) -> Self {
        Self::Unavailable { source_id: source_id.into(), reason: reason.to_string() }
    }
}

/// Numeric columns of a state-vector line, in file order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
}

impl StateField {
    pub const ALL: [Self; 6] = [Self::X, Self::Y, Self::Z, Self::Vx, Self::Vy, Self::Vz];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Vx => "vx",
            Self::Vy => "vy",
            Self::Vz => "vz",
        }
    }
}

impl Display for StateField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ephemeris sample. All six components are finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStateVector")]
pub struct StateVectorRecord {
    epoch: String,
    position: [f64; 3],
    velocity: [f64; 3],
}

#[derive(Deserialize)]
struct RawStateVector {
    epoch: String,
    position: [f64; 3],
    velocity: [f64; 3],
}

impl TryFrom<RawStateVector> for StateVectorRecord {
    type Error = CoreError;

    fn try_from(raw: RawStateVector) -> Result<Self, Self::Error> {
        Self::new(raw.epoch, raw.position, raw.velocity)
    }
}

impl StateVectorRecord {
    /// # Errors
    /// Returns [`CoreError::Validation`] when any component is NaN or infinite.
    pub fn new(
        epoch: impl Into<String>,
        position: [f64; 3],
        velocity: [f64; 3],
    ) -> Result<Self, CoreError> {
        let values = position.iter().chain(velocity.iter());
        if let Some((field, value)) =
            StateField::ALL.iter().zip(values).find(|(_, value)| !value.is_finite())
        {
            return Err(CoreError::Validation(format!("{field} MUST be finite, got {value}")));
        }
        Ok(Self::from_checked(epoch, position, velocity))
    }

    pub(crate) fn from_checked(
        epoch: impl Into<String>,
        position: [f64; 3],
        velocity: [f64; 3],
    ) -> Self {
        Self { epoch: epoch.into(), position, velocity }
    }

    #[must_use]
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    #[must_use]
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    #[must_use]
    pub fn velocity(&self) -> [f64; 3] {
        self.velocity
    }
}

/// Records in source order, then line order within each source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory(Vec<StateVectorRecord>);

impl Trajectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[StateVectorRecord] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateVectorRecord> {
        self.0.iter()
    }

    /// Flat position triples for point or path rendering.
    #[must_use]
    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.0.iter().map(StateVectorRecord::position).collect()
    }

    #[must_use]
    pub fn last_positions(&self, count: usize) -> Vec<[f64; 3]> {
        let start = self.0.len().saturating_sub(count);
        self.0[start..].iter().map(StateVectorRecord::position).collect()
    }

    pub(crate) fn append(&mut self, records: Vec<StateVectorRecord>) {
        self.0.extend(records);
    }

    #[must_use]
    pub fn into_records(self) -> Vec<StateVectorRecord> {
        self.0
    }
}

impl From<Vec<StateVectorRecord>> for Trajectory {
    fn from(records: Vec<StateVectorRecord>) -> Self {
        Self(records)
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a StateVectorRecord;
    type IntoIter = std::slice::Iter<'a, StateVectorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Loaded,
    /// Parsed fine but held no valid positions. Informational, not an error.
    Empty,
    Failed,
}

impl OutcomeStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Empty => "empty",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SourceLoadOutcome {
    pub source_id: String,
    pub record_count: usize,
    pub status: OutcomeStatus,
    pub error: Option<String>,
}

impl SourceLoadOutcome {
    #[must_use]
    pub fn loaded(source_id: impl Into<String>, record_count: usize) -> Self {
        Self {
            source_id: source_id.into(),
            record_count,
            status: OutcomeStatus::Loaded,
            error: None,
        }
    }

    #[must_use]
    pub fn empty(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            record_count: 0,
            status: OutcomeStatus::Empty,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            record_count: 0,
            status: OutcomeStatus::Failed,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }

    /// Diagnostic line suitable for a processing monitor.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.status {
            OutcomeStatus::Loaded => {
                format!("Loaded {} positions from {}", self.record_count, self.source_id)
            }
            OutcomeStatus::Empty => format!("{}: No valid positions found", self.source_id),
            OutcomeStatus::Failed => format!(
                "Failed to load {}: {}",
                self.source_id,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
