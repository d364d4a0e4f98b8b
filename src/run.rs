//! One lookup run: generate, dispatch, record, summarize.

use std::io;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;

use serde::Serialize;
use tracing::{error, info};

use crate::check::{Lookup, LookupError, Outcome};
use crate::dispatch::{BatchPolicy, dispatch};
use crate::generate::{ALPHABET, Candidate, MAX_LENGTH, MIN_LENGTH, generate_unique, space_size};
use crate::sink::{ResultSink, SinkError};

/// Largest accepted concurrency limit; each slot is one worker thread.
pub const MAX_CONCURRENCY: usize = 512;

/// A run configuration that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Asked to check zero names.
    #[error("candidate count must be at least 1")]
    ZeroCount,
    /// Name length outside what the registry accepts.
    #[error("name length must be between 3 and 16, got {0}")]
    LengthOutOfRange(usize),
    /// Concurrency limit of zero.
    #[error("max concurrency must be at least 1")]
    ZeroConcurrency,
    /// Concurrency limit above [`MAX_CONCURRENCY`].
    #[error("max concurrency must be at most 512, got {0}")]
    ConcurrencyTooHigh(usize),
    /// More unique names requested than exist at this length.
    #[error("cannot generate {count} unique names of length {length} (only {space} exist)")]
    CountExceedsSpace {
        /// Requested count.
        count: usize,
        /// Requested length.
        length: usize,
        /// Number of distinct names of that length.
        space: u128,
    },
}

/// Validated parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    candidate_count: usize,
    id_length: usize,
    max_concurrency: NonZeroUsize,
    policy: BatchPolicy,
}

impl RunConfig {
    /// Validate and build a configuration with the default batch policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any value is out of range.
    ///
    /// ```
    /// use mc_avail::run::{ConfigError, RunConfig};
    ///
    /// assert!(RunConfig::new(100, 4, 50).is_ok());
    /// assert_eq!(RunConfig::new(100, 2, 50), Err(ConfigError::LengthOutOfRange(2)));
    /// ```
    pub fn new(
        candidate_count: usize,
        id_length: usize,
        max_concurrency: usize,
    ) -> Result<Self, ConfigError> {
        if candidate_count == 0 {
            return Err(ConfigError::ZeroCount);
        }
        check_length(id_length)?;
        let max_concurrency = check_concurrency(max_concurrency)?;
        let space = space_size(id_length, ALPHABET);
        if candidate_count as u128 > space {
            return Err(ConfigError::CountExceedsSpace {
                count: candidate_count,
                length: id_length,
                space,
            });
        }
        Ok(Self {
            candidate_count,
            id_length,
            max_concurrency,
            policy: BatchPolicy::default(),
        })
    }

    /// Use `policy` when a lookup fails.
    #[must_use]
    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// How many names to generate and check.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.candidate_count
    }

    /// Length of every generated name.
    #[must_use]
    pub fn id_length(&self) -> usize {
        self.id_length
    }

    /// Upper bound on lookups in flight.
    #[must_use]
    pub fn max_concurrency(&self) -> NonZeroUsize {
        self.max_concurrency
    }

    /// Behavior after a lookup error.
    #[must_use]
    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }
}

/// Reject name lengths the registry would never accept.
///
/// # Errors
///
/// Returns [`ConfigError::LengthOutOfRange`] outside `3..=16`.
pub fn check_length(length: usize) -> Result<(), ConfigError> {
    if (MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(ConfigError::LengthOutOfRange(length))
    }
}

/// Reject concurrency limits outside `1..=MAX_CONCURRENCY`.
///
/// # Errors
///
/// Returns [`ConfigError::ZeroConcurrency`] or [`ConfigError::ConcurrencyTooHigh`].
pub fn check_concurrency(max_concurrency: usize) -> Result<NonZeroUsize, ConfigError> {
    let limit = NonZeroUsize::new(max_concurrency).ok_or(ConfigError::ZeroConcurrency)?;
    if limit.get() > MAX_CONCURRENCY {
        return Err(ConfigError::ConcurrencyTooHigh(max_concurrency));
    }
    Ok(limit)
}

/// Counts describing a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Number of candidates in the run.
    pub total_checked: usize,
    /// Names the registry reported as free.
    pub available_count: usize,
    /// Names that already belong to a profile.
    pub taken_count: usize,
    /// Lookups answered with an unexpected status.
    pub failed_count: usize,
    /// Lookups that produced no answer at all.
    pub error_count: usize,
    /// Candidates never looked up because the batch was halted.
    pub skipped_count: usize,
}

/// A run that did not finish normally.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RunError {
    /// Writing results failed; the batch was halted.
    #[error("failed to write results: {source}")]
    Sink {
        /// The write that failed.
        #[source]
        source: SinkError,
        /// What had been collected when the run stopped.
        summary: Summary,
    },
    /// A lookup failed under [`BatchPolicy::AbortOnError`].
    #[error("run aborted with {} candidates skipped: {source}", .summary.skipped_count)]
    Aborted {
        /// The first lookup error seen.
        #[source]
        source: LookupError,
        /// What had been collected when the run stopped.
        summary: Summary,
    },
    /// Not a single lookup worker could be started.
    #[error("failed to start lookup workers: {source}")]
    Spawn {
        /// The OS error from the first failed thread spawn.
        #[source]
        source: io::Error,
        /// Every candidate counted as skipped.
        summary: Summary,
    },
}

impl RunError {
    /// What had been collected when the run stopped.
    #[must_use]
    pub fn summary(&self) -> &Summary {
        match self {
            Self::Sink { summary, .. }
            | Self::Aborted { summary, .. }
            | Self::Spawn { summary, .. } => summary,
        }
    }
}

/// Generate `config.candidate_count()` fresh names and check them.
///
/// # Errors
///
/// See [`run_candidates`].
pub fn run<L>(lookup: &L, config: &RunConfig, sink: &ResultSink) -> Result<Summary, RunError>
where
    L: Lookup + Sync + ?Sized,
{
    let candidates = generate_unique(
        &mut rand::rng(),
        config.candidate_count(),
        config.id_length(),
        ALPHABET,
    );
    info!(count = candidates.len(), length = config.id_length(), "generated candidates");
    run_candidates(lookup, candidates, config.max_concurrency(), config.policy(), sink)
}

/// Check an explicit candidate list, recording each result as it lands and the
/// available names once the whole batch has finished.
///
/// The available list collected so far is flushed even when the batch halts.
///
/// # Errors
///
/// Returns [`RunError::Sink`] if an output write fails,
/// [`RunError::Aborted`] if a lookup fails under [`BatchPolicy::AbortOnError`],
/// and [`RunError::Spawn`] if no worker thread could be started.
pub fn run_candidates<L>(
    lookup: &L,
    candidates: Vec<Candidate>,
    max_concurrency: NonZeroUsize,
    policy: BatchPolicy,
    sink: &ResultSink,
) -> Result<Summary, RunError>
where
    L: Lookup + Sync + ?Sized,
{
    let total_checked = candidates.len();
    let mut write_error = None;

    let mut batch = dispatch(lookup, candidates, max_concurrency, policy, |result| {
        let Ok(outcome) = result else {
            return ControlFlow::Continue(());
        };
        match sink.record(outcome) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                error!(error = %e, "failed to record result");
                write_error.get_or_insert(e);
                ControlFlow::Break(())
            }
        }
    });

    let mut summary = Summary {
        total_checked,
        skipped_count: batch.skipped.len(),
        ..Summary::default()
    };
    for result in &batch.results {
        match result {
            Ok(Outcome::Available(_)) => summary.available_count += 1,
            Ok(Outcome::Taken { .. }) => summary.taken_count += 1,
            Ok(Outcome::LookupFailed { .. }) => summary.failed_count += 1,
            Err(_) => summary.error_count += 1,
        }
    }

    if let Some(source) = write_error {
        return Err(RunError::Sink { source, summary });
    }
    if batch.workers == 0 {
        if let Some(source) = batch.spawn_error.take() {
            return Err(RunError::Spawn { source, summary });
        }
    }
    if let Err(source) = sink.flush_available(batch.available()) {
        return Err(RunError::Sink { source, summary });
    }
    info!(?summary, "run finished");

    if policy == BatchPolicy::AbortOnError && summary.error_count > 0 {
        if let Some(source) = batch.results.into_iter().find_map(Result::err) {
            return Err(RunError::Aborted { source, summary });
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_accepts_bounds() {
        assert!(RunConfig::new(1, 3, 1).is_ok());
        assert!(RunConfig::new(1, 16, 1).is_ok());
    }

    #[test]
    fn config_rejects_bad_length() {
        assert_eq!(RunConfig::new(1, 2, 1), Err(ConfigError::LengthOutOfRange(2)));
        assert_eq!(RunConfig::new(1, 17, 1), Err(ConfigError::LengthOutOfRange(17)));
    }

    #[test]
    fn config_rejects_zeroes() {
        assert_eq!(RunConfig::new(0, 4, 1), Err(ConfigError::ZeroCount));
        assert_eq!(RunConfig::new(1, 4, 0), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn config_caps_concurrency() {
        assert!(RunConfig::new(10, 4, MAX_CONCURRENCY).is_ok());
        assert_eq!(
            RunConfig::new(10, 4, MAX_CONCURRENCY + 1),
            Err(ConfigError::ConcurrencyTooHigh(MAX_CONCURRENCY + 1))
        );
        assert_eq!(
            ConfigError::ConcurrencyTooHigh(4000).to_string(),
            "max concurrency must be at most 512, got 4000"
        );
    }

    #[test]
    fn config_rejects_count_beyond_space() {
        assert_eq!(
            RunConfig::new(46_657, 3, 10),
            Err(ConfigError::CountExceedsSpace {
                count: 46_657,
                length: 3,
                space: 46_656,
            })
        );
        assert!(RunConfig::new(46_656, 3, 10).is_ok());
    }

    #[test]
    fn config_default_policy_continues() {
        let config = RunConfig::new(5, 4, 2).unwrap();
        assert_eq!(config.policy(), BatchPolicy::ContinueOnError);
        let config = config.with_policy(BatchPolicy::AbortOnError);
        assert_eq!(config.policy(), BatchPolicy::AbortOnError);
        assert_eq!(config.max_concurrency().get(), 2);
    }

    #[test]
    fn length_error_message_names_range() {
        let msg = ConfigError::LengthOutOfRange(20).to_string();
        assert_eq!(msg, "name length must be between 3 and 16, got 20");
    }

    #[test]
    fn summary_serializes_field_names() {
        let summary = Summary {
            total_checked: 3,
            available_count: 1,
            ..Summary::default()
        };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["total_checked"], 3);
        assert_eq!(json["available_count"], 1);
        assert_eq!(json["skipped_count"], 0);
    }

    #[test]
    fn run_error_is_send_sync() {
        fn assert_normal<T: Sized + Send + Sync>() {}
        assert_normal::<RunError>();
    }
}
