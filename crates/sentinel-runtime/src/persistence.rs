//! Persistence bridge
//!
//! Pushes cumulative counters to the remote answer store:
//! - counter-only updates are debounced, and read the counters when the
//!   write fires rather than when it was scheduled
//! - every write carries the full row (latest answer plus counters), so a
//!   store may simply replace the stored row and last write wins
//! - failures are logged and swallowed; the next cycle carries newer values
//! - nothing is written while the session has no submission

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use sentinel_core::{QuestionId, SessionIntegrityState, SubmissionId};
use serde::{Deserialize, Serialize};

use crate::debounce::Debouncer;
use crate::error::PersistenceError;

/// One save call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub submission_id: SubmissionId,
    pub question_id: QuestionId,
    /// Latest answer saved for the question; empty until one is saved
    pub answer_text: String,
    pub score: Option<f64>,
    pub violation_count: Option<u32>,
    pub seconds_away: Option<u64>,
}

/// Store reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl SaveAck {
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Remote answer store
///
/// Each request is the complete row for its (submission, question) pair;
/// implementations may overwrite the stored row and must tolerate repeated
/// identical calls.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// # Errors
    /// Transport or store failure
    async fn save(&self, request: SaveRequest) -> Result<SaveAck, PersistenceError>;
}

/// Keeps the latest request per (submission, question)
#[derive(Debug, Default)]
pub struct InMemoryAnswerStore {
    rows: Mutex<Vec<SaveRequest>>,
    writes: Mutex<usize>,
}

impl InMemoryAnswerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored row for a question
    #[must_use]
    pub fn row(&self, submission: SubmissionId, question: QuestionId) -> Option<SaveRequest> {
        self.rows
            .lock()
            .iter()
            .find(|r| r.submission_id == submission && r.question_id == question)
            .cloned()
    }

    /// Total save calls received
    #[must_use]
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

#[async_trait]
impl AnswerStore for InMemoryAnswerStore {
    async fn save(&self, request: SaveRequest) -> Result<SaveAck, PersistenceError> {
        *self.writes.lock() += 1;
        let mut rows = self.rows.lock();
        match rows
            .iter_mut()
            .find(|r| r.submission_id == request.submission_id && r.question_id == request.question_id)
        {
            Some(row) => *row = request,
            None => rows.push(request),
        }
        Ok(SaveAck::ok())
    }
}

/// Result of a bridge write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// No submission attached yet, or the session was torn down
    Skipped,
    /// Logged and swallowed
    Failed(String),
}

struct BridgeInner {
    store: Arc<dyn AnswerStore>,
    session: Arc<Mutex<SessionIntegrityState>>,
    live: Arc<AtomicBool>,
    /// Last answer text and score handed to `save_answer`, per question
    answers: Mutex<HashMap<QuestionId, (String, Option<f64>)>>,
}

impl BridgeInner {
    async fn push(&self, question: QuestionId, answer: Option<(String, Option<f64>)>) -> SaveOutcome {
        if answer.is_none() && !self.live.load(Ordering::Acquire) {
            tracing::debug!(question_id = %question, "session torn down, counter write dropped");
            return SaveOutcome::Skipped;
        }
        let (answer_text, score) = match answer {
            Some(answer) => {
                self.answers.lock().insert(question, answer.clone());
                answer
            }
            None => self.answers.lock().get(&question).cloned().unwrap_or_default(),
        };
        let (submission, snapshot) = {
            let session = self.session.lock();
            (session.submission_id(), session.snapshot())
        };
        let Some(submission) = submission else {
            tracing::debug!(question_id = %question, "no submission yet, counters kept locally");
            return SaveOutcome::Skipped;
        };

        let request = SaveRequest {
            submission_id: submission,
            question_id: question,
            answer_text,
            score,
            violation_count: Some(snapshot.violation_count),
            seconds_away: Some(snapshot.seconds_away),
        };

        match self.store.save(request).await {
            Ok(ack) if ack.success => {
                if self.live.load(Ordering::Acquire) {
                    self.session.lock().mark_server_confirmed();
                }
                tracing::debug!(
                    submission_id = %submission,
                    question_id = %question,
                    violation_count = snapshot.violation_count,
                    seconds_away = snapshot.seconds_away,
                    "counters saved"
                );
                SaveOutcome::Saved
            }
            Ok(ack) => {
                let error = ack.error.unwrap_or_else(|| "unspecified".to_string());
                tracing::warn!(submission_id = %submission, question_id = %question, %error, "save rejected");
                SaveOutcome::Failed(error)
            }
            Err(error) => {
                tracing::warn!(
                    submission_id = %submission,
                    question_id = %question,
                    %error,
                    transient = error.is_transient(),
                    "save failed"
                );
                SaveOutcome::Failed(error.to_string())
            }
        }
    }
}

/// Debounced counter persistence for one session
pub struct PersistenceBridge {
    inner: Arc<BridgeInner>,
    debouncer: Debouncer<QuestionId>,
}

impl PersistenceBridge {
    /// Must be called from within a tokio runtime.
    pub fn new(
        store: Arc<dyn AnswerStore>,
        session: Arc<Mutex<SessionIntegrityState>>,
        live: Arc<AtomicBool>,
        quiet: Duration,
    ) -> Self {
        let inner = Arc::new(BridgeInner {
            store,
            session,
            live,
            answers: Mutex::new(HashMap::new()),
        });
        let worker = Arc::clone(&inner);
        let debouncer = Debouncer::new(quiet, move |question: QuestionId| {
            let worker = Arc::clone(&worker);
            Box::pin(async move {
                worker.push(question, None).await;
            }) as BoxFuture<'static, ()>
        });
        Self { inner, debouncer }
    }

    /// Schedule a counter-only write for `question`
    pub fn schedule_counters(&self, question: QuestionId) {
        self.debouncer.call(question);
    }

    /// Write now, with the answer text and the current counters
    pub async fn save_answer(
        &self,
        question: QuestionId,
        answer_text: impl Into<String>,
        score: Option<f64>,
    ) -> SaveOutcome {
        self.inner
            .push(question, Some((answer_text.into(), score)))
            .await
    }

    /// Write counters now, bypassing the quiet period
    pub async fn save_counters_now(&self, question: QuestionId) -> SaveOutcome {
        self.inner.push(question, None).await
    }

    /// Fire a pending debounced write immediately
    pub async fn flush(&self) {
        self.debouncer.flush().await;
    }

    /// Drop a pending debounced write
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}

impl std::fmt::Debug for PersistenceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceBridge")
            .field("debouncer", &self.debouncer)
            .finish_non_exhaustive()
    }
}
