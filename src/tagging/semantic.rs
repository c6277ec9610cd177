//! Optional semantic-similarity signal
//!
//! The similarity service is an external collaborator reached through the
//! [`SimilarityClient`] trait. [`SemanticScorer`] wraps a client with a
//! timeout, a minimum delay between calls and an in-flight limit shared by
//! every paper using the scorer. Any failure is returned as an error, and
//! the tagger carries on without the signal.

use crate::config::SemanticConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    #[error("similarity service unavailable: {0}")]
    Unavailable(String),
    #[error("similarity request failed: {0}")]
    Failed(String),
    #[error("similarity request timed out after {0:?}")]
    Timeout(Duration),
    #[error("similarity response has wrong shape: expected {expected} rows, got {actual}")]
    Shape { expected: usize, actual: usize },
}

/// External text-similarity service.
#[async_trait]
pub trait SimilarityClient: Send + Sync {
    /// Similarity of every query against every candidate, in [0, 1].
    /// Row `i` holds the scores of `queries[i]`.
    async fn similarity(
        &self,
        queries: &[String],
        candidates: &[String],
    ) -> Result<Vec<Vec<f64>>, SemanticError>;
}

/// Mock client for testing. Scores by substring rules.
#[derive(Default)]
pub struct MockSimilarityClient {
    rules: Vec<(String, String, f64)>,
    default_score: f64,
    delay: Option<Duration>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockSimilarityClient {
    /// A client that scores everything 0.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Score `score` when the query contains `query_part` and the candidate
    /// contains `candidate_part`. The first matching rule wins.
    pub fn with_score(
        mut self,
        query_part: impl Into<String>,
        candidate_part: impl Into<String>,
        score: f64,
    ) -> Self {
        self.rules
            .push((query_part.into(), candidate_part.into(), score));
        self
    }

    pub fn with_default(mut self, score: f64) -> Self {
        self.default_score = score;
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every request.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn score_pair(&self, query: &str, candidate: &str) -> f64 {
        self.rules
            .iter()
            .find(|(q, c, _)| query.contains(q.as_str()) && candidate.contains(c.as_str()))
            .map(|(_, _, score)| *score)
            .unwrap_or(self.default_score)
    }
}

#[async_trait]
impl SimilarityClient for MockSimilarityClient {
    async fn similarity(
        &self,
        queries: &[String],
        candidates: &[String],
    ) -> Result<Vec<Vec<f64>>, SemanticError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(SemanticError::Failed(message.clone()));
        }
        Ok(queries
            .iter()
            .map(|q| candidates.iter().map(|c| self.score_pair(q, c)).collect())
            .collect())
    }
}

/// Rate-limited, time-bounded access to a [`SimilarityClient`].
pub struct SemanticScorer {
    client: Arc<dyn SimilarityClient>,
    config: SemanticConfig,
    in_flight: Semaphore,
    last_call: Mutex<Option<Instant>>,
}

impl SemanticScorer {
    pub fn new(client: Arc<dyn SimilarityClient>, config: SemanticConfig) -> Self {
        let permits = config.max_in_flight.max(1);
        Self {
            client,
            config,
            in_flight: Semaphore::new(permits),
            last_call: Mutex::new(None),
        }
    }

    /// One batched similarity request, scores clamped to [0, 1].
    pub async fn score(
        &self,
        queries: &[String],
        candidates: &[String],
    ) -> Result<Vec<Vec<f64>>, SemanticError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| SemanticError::Unavailable(format!("semaphore closed: {}", e)))?;
        self.throttle().await;

        let timeout = self.config.timeout();
        let matrix = match tokio::time::timeout(timeout, self.client.similarity(queries, candidates))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SemanticError::Timeout(timeout)),
        };

        if matrix.len() != queries.len() {
            return Err(SemanticError::Shape {
                expected: queries.len(),
                actual: matrix.len(),
            });
        }
        if let Some(row) = matrix.iter().find(|row| row.len() != candidates.len()) {
            return Err(SemanticError::Shape {
                expected: candidates.len(),
                actual: row.len(),
            });
        }

        Ok(matrix
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 })
                    .collect()
            })
            .collect())
    }

    /// Wait until the minimum interval since the previous call has passed.
    async fn throttle(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let wait = self.config.min_interval().saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "throttling similarity request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}
