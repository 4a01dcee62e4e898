//! Sequential multi-source trajectory assembly.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;

use crate::parser::parse_records;
use crate::{CoreError, FetchError, OutcomeStatus, SourceLoadOutcome, Trajectory};

/// Observer invoked once per source boundary.
pub type ProgressCallback = Box<dyn Fn(LoadProgress) + Send + Sync>;

/// Obtains raw text for a source identifier. Transport, timeouts and retries live here.
pub trait SourceFetcher {
    fn fetch(&self, source_id: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadProgress {
    pub processed: usize,
    pub total: usize,
    pub source_id: String,
    pub message: String,
}

impl LoadProgress {
    /// `processed / total`, in `(0, 1]` once at least one source has been handled.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.processed as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LoadReport {
    pub trajectory: Trajectory,
    pub outcomes: Vec<SourceLoadOutcome>,
}

impl LoadReport {
    #[must_use]
    pub fn sources_processed(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn total_records(&self) -> usize {
        self.trajectory.len()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceLoadOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.status == OutcomeStatus::Failed)
    }

    pub fn empty_sources(&self) -> impl Iterator<Item = &SourceLoadOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.status == OutcomeStatus::Empty)
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} sources processed, {} valid records",
            self.sources_processed(),
            self.total_records()
        )
    }
}

/// Accumulates one source at a time into a single owned trajectory.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryAggregator {
    total: usize,
    report: LoadReport,
}

impl TrajectoryAggregator {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self { total, report: LoadReport::default() }
    }

    /// Parses `raw_text` as the next source and appends its records.
    pub fn ingest_text(&mut self, source_id: &str, raw_text: &str) -> LoadProgress {
        let records = parse_records(raw_text);
        let outcome = if records.is_empty() {
            tracing::warn!(source_id, "no valid positions found");
            SourceLoadOutcome::empty(source_id)
        } else {
            tracing::info!(source_id, records = records.len(), "loaded positions");
            let outcome = SourceLoadOutcome::loaded(source_id, records.len());
            self.report.trajectory.append(records);
            outcome
        };
        self.finish_source(outcome)
    }

    /// Records a source whose text could not be obtained.
    ///
    /// # Errors
    /// Returns [`CoreError::UnregisteredSource`] for [`FetchError::Unregistered`]; that is a
    /// caller bug and the run must stop.
    pub fn ingest_failure(
        &mut self,
        source_id: &str,
        error: &FetchError,
    ) -> Result<LoadProgress, CoreError> {
        if let FetchError::Unregistered(id) = error {
            tracing::error!(source_id = %id, "source has no fetch capability");
            return Err(CoreError::UnregisteredSource(id.clone()));
        }
        tracing::warn!(source_id, error = %error, "failed to load source");
        Ok(self.finish_source(SourceLoadOutcome::failed(source_id, error.to_string())))
    }

    /// # Errors
    /// See [`TrajectoryAggregator::ingest_failure`].
    pub fn ingest(
        &mut self,
        source_id: &str,
        fetched: Result<&str, &FetchError>,
    ) -> Result<LoadProgress, CoreError> {
        match fetched {
            Ok(raw_text) => Ok(self.ingest_text(source_id, raw_text)),
            Err(error) => self.ingest_failure(source_id, error),
        }
    }

    #[must_use]
    pub fn processed(&self) -> usize {
        self.report.outcomes.len()
    }

    #[must_use]
    pub fn finish(self) -> LoadReport {
        self.report
    }

    fn finish_source(&mut self, outcome: SourceLoadOutcome) -> LoadProgress {
        let message = outcome.describe();
        let source_id = outcome.source_id.clone();
        self.report.outcomes.push(outcome);
        let processed = self.report.outcomes.len();
        // Never report more than 100%, even if the caller undercounted.
        self.total = self.total.max(processed);
        LoadProgress { processed, total: self.total, source_id, message }
    }
}

/// Assembles a trajectory from text that is already in memory.
pub fn load_texts<I, S, T>(sources: I, progress: Option<&ProgressCallback>) -> LoadReport
where
    I: IntoIterator<Item = (S, T)>,
    I::IntoIter: ExactSizeIterator,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let sources = sources.into_iter();
    let mut aggregator = TrajectoryAggregator::new(sources.len());
    for (source_id, raw_text) in sources {
        let update = aggregator.ingest_text(source_id.as_ref(), raw_text.as_ref());
        if let Some(progress) = progress {
            progress(update);
        }
    }
    aggregator.finish()
}

/// Fetches and parses each source in order. Source `i + 1` is not requested until
/// source `i` has been fully handled.
///
/// # Errors
/// Returns [`CoreError::UnregisteredSource`] as soon as the fetcher reports an
/// identifier it cannot serve. Ordinary fetch failures never abort the run.
pub async fn load_sources<F>(
    fetcher: &F,
    source_ids: &[String],
    progress: Option<&ProgressCallback>,
) -> Result<LoadReport, CoreError>
where
    F: SourceFetcher + Sync,
{
    let mut aggregator = TrajectoryAggregator::new(source_ids.len());
    for source_id in source_ids {
        let fetched = fetcher.fetch(source_id).await;
        let update = match &fetched {
            Ok(raw_text) => aggregator.ingest_text(source_id, raw_text),
            Err(error) => aggregator.ingest_failure(source_id, error)?,
        };
        if let Some(progress) = progress {
            progress(update);
        }
    }
    Ok(aggregator.finish())
}

/// Fixed set of texts keyed by identifier, with optional simulated fetch failures.
#[derive(Debug, Clone, Default)]
pub struct InMemorySources {
    texts: BTreeMap<String, Result<String, String>>,
}

impl InMemorySources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_text(mut self, source_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        self.texts.insert(source_id.into(), Ok(raw_text.into()));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.texts.insert(source_id.into(), Err(reason.into()));
        self
    }

    #[must_use]
    pub fn source_ids(&self) -> Vec<String> {
        self.texts.keys().cloned().collect()
    }
}

impl SourceFetcher for InMemorySources {
    fn fetch(&self, source_id: &str) -> impl Future<Output = Result<String, FetchError>> + Send {
        let fetched = match self.texts.get(source_id) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(FetchError::unavailable(source_id, reason)),
            None => Err(FetchError::Unregistered(source_id.to_string())),
        };
        std::future::ready(fetched)
    }
}
