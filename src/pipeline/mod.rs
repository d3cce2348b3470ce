//! Staged query path.
//!
//! ```text
//!   FeatureEvent ──► WordSearchStage ──► Outcome<WordEvent> ──► SignatureSearchStage ──► Outcome<SignatureEvent>
//!                    (WordResolver)                             (SignatureResolver)
//! ```
//!
//! Each stage is one tokio task with one bounded queue, so requests pipeline
//! across stages but run strictly one at a time inside a stage. A resolver is
//! either a local index or an RPC client; the stage contract is the same.
//!
//! Failures never stop a stage: a request that cannot be resolved becomes
//! `Outcome::Failed` and flows on to the end, where it reads as "no match".

pub mod messages;
pub mod resolver;
pub mod signature_stage;
pub mod word_stage;

pub use messages::{
    CameraModel, FailedRequest, FailureReason, FeatureEvent, KeyPoint, Outcome, PerfData,
    SensorData, Session, SignatureEvent, WordEvent,
};
pub use resolver::{SignatureResolver, VocabularyOp, WordResolver};
pub use signature_stage::{SignatureSearchStage, SignatureStageHandle};
pub use word_stage::{WordSearchStage, WordStageCommand, WordStageHandle};

use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::WordId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Both stages wired together, with a receiver for final outcomes.
pub struct Pipeline<W, S> {
    words: WordStageHandle,
    word_task: JoinHandle<W>,
    signature_task: JoinHandle<S>,
    results: mpsc::Receiver<Outcome<SignatureEvent>>,
}

/// What [`Pipeline::shutdown`] hands back.
pub struct Drained<W, S> {
    pub word_resolver: W,
    pub signature_resolver: S,
    /// Outcomes not yet taken with [`Pipeline::next_result`].
    pub pending: Vec<Outcome<SignatureEvent>>,
}

impl<W: WordResolver, S: SignatureResolver> Pipeline<W, S> {
    pub fn spawn(word_resolver: W, signature_resolver: S, config: &PipelineConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (results_tx, results) = mpsc::channel(capacity);

        let (signatures, signature_task) =
            SignatureSearchStage::new(signature_resolver, config.top_k, results_tx).spawn(capacity);
        let (words, word_task) = WordSearchStage::new(word_resolver, signatures.sender()).spawn(capacity);

        info!(capacity, top_k = config.top_k, "pipeline started");
        Self {
            words,
            word_task,
            signature_task,
            results,
        }
    }

    /// A handle for feeding the pipeline from elsewhere.
    pub fn handle(&self) -> WordStageHandle {
        self.words.clone()
    }

    pub async fn submit(&self, event: FeatureEvent) -> Result<(), StageError> {
        self.words.submit(event).await
    }

    pub async fn maintain(&self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        self.words.maintain(op).await
    }

    /// Next final outcome, in completion order.
    pub async fn next_result(&mut self) -> Option<Outcome<SignatureEvent>> {
        self.results.recv().await
    }

    /// Stop accepting work, drain both queues and return the resolvers.
    ///
    /// Handles obtained from [`handle`](Self::handle) must be dropped first,
    /// or the word stage keeps waiting for them.
    pub async fn shutdown(self) -> Result<Drained<W, S>, StageError> {
        let Pipeline {
            words,
            word_task,
            signature_task,
            mut results,
        } = self;
        drop(words);

        let mut pending = Vec::new();
        while let Some(outcome) = results.recv().await {
            pending.push(outcome);
        }
        let word_resolver = word_task.await?;
        let signature_resolver = signature_task.await?;
        info!(drained = pending.len(), "pipeline stopped");

        Ok(Drained {
            word_resolver,
            signature_resolver,
            pending,
        })
    }
}
