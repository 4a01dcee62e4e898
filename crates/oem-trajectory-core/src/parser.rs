//! Line-oriented reader for OEM ephemeris text.
//!
//! Every non-blank line ahead of the covariance marker is a candidate state vector:
//! `<epoch> <x> <y> <z> <vx> <vy> <vz> [ignored...]`. Header and metadata lines fall out
//! naturally because they either carry fewer than seven fields or fail numeric parsing.

use serde::{Deserialize, Serialize};

use crate::{StateField, StateVectorRecord};

/// Exact (trimmed, case-sensitive) line that starts the covariance section.
pub const COVARIANCE_MARKER: &str = "COVARIANCE_START";

/// Epoch plus three position and three velocity components.
pub const REQUIRED_FIELDS: usize = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    TooFewFields { found: usize },
    InvalidNumber { field: StateField },
    NonFinite { field: StateField },
}

impl SkipReason {
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::TooFewFields { found } => {
                format!("expected at least {REQUIRED_FIELDS} fields, found {found}")
            }
            Self::InvalidNumber { field } => format!("{} is not a number", field.as_str()),
            Self::NonFinite { field } => format!("{} is not finite", field.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the raw text.
    pub line_number: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ParseReport {
    pub records: Vec<StateVectorRecord>,
    pub skipped: Vec<SkippedLine>,
    /// 1-based line number of the covariance marker, if one was seen.
    pub covariance_line: Option<usize>,
}

/// Parses raw OEM text into its ordered state vectors, dropping malformed lines.
#[must_use]
pub fn parse_records(raw_text: &str) -> Vec<StateVectorRecord> {
    parse_report(raw_text).records
}

/// Same scan as [`parse_records`], keeping a note of every line that was dropped.
#[must_use]
pub fn parse_report(raw_text: &str) -> ParseReport {
    let mut report = ParseReport::default();
    let mut covariance_active = false;

    for (index, line) in raw_text.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        if trimmed == COVARIANCE_MARKER {
            if !covariance_active {
                report.covariance_line = Some(line_number);
            }
            covariance_active = true;
            continue;
        }
        if covariance_active {
            continue;
        }

        match parse_line(trimmed) {
            Ok(record) => report.records.push(record),
            Err(reason) => {
                tracing::debug!(line_number, reason = %reason.describe(), "skipping ephemeris line");
                report.skipped.push(SkippedLine { line_number, reason });
            }
        }
    }

    tracing::trace!(
        records = report.records.len(),
        skipped = report.skipped.len(),
        "parsed ephemeris text"
    );
    report
}

fn parse_line(line: &str) -> Result<StateVectorRecord, SkipReason> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < REQUIRED_FIELDS {
        return Err(SkipReason::TooFewFields { found: tokens.len() });
    }

    let mut values = [0.0_f64; 6];
    for (slot, (field, token)) in
        values.iter_mut().zip(StateField::ALL.into_iter().zip(&tokens[1..REQUIRED_FIELDS]))
    {
        let value = token.parse::<f64>().map_err(|_| SkipReason::InvalidNumber { field })?;
        if !value.is_finite() {
            return Err(SkipReason::NonFinite { field });
        }
        *slot = value;
    }

    let [x, y, z, vx, vy, vz] = values;
    Ok(StateVectorRecord::from_checked(tokens[0], [x, y, z], [vx, vy, vz]))
}
