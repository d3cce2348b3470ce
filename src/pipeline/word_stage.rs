//! Descriptors -> word ids.

use super::messages::{FailedRequest, FailureReason, FeatureEvent, Outcome, WordEvent};
use super::resolver::{VocabularyOp, WordResolver};
use crate::error::StageError;
use crate::WordId;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Inbound message of the word stage.
#[derive(Debug)]
pub enum WordStageCommand {
    Search(FeatureEvent),
    /// Mutate the vocabulary, then refresh the index.
    Maintain {
        op: VocabularyOp,
        reply: oneshot::Sender<Result<Vec<WordId>, StageError>>,
    },
}

/// Sending side of the word stage. The stage stops once every handle is
/// dropped and its queue is drained.
#[derive(Debug, Clone)]
pub struct WordStageHandle {
    tx: mpsc::Sender<WordStageCommand>,
}

impl WordStageHandle {
    /// Queue a request. Waits while the queue is full.
    pub async fn submit(&self, event: FeatureEvent) -> Result<(), StageError> {
        self.tx
            .send(WordStageCommand::Search(event))
            .await
            .map_err(|_| StageError::ChannelClosed)
    }

    /// Apply a vocabulary mutation in queue order with searches.
    pub async fn maintain(&self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WordStageCommand::Maintain { op, reply })
            .await
            .map_err(|_| StageError::ChannelClosed)?;
        rx.await.map_err(|_| StageError::ChannelClosed)?
    }
}

/// Single-owner processor resolving feature requests into word requests.
pub struct WordSearchStage<R> {
    resolver: R,
    downstream: mpsc::Sender<Outcome<WordEvent>>,
}

impl<R: WordResolver> WordSearchStage<R> {
    pub fn new(resolver: R, downstream: mpsc::Sender<Outcome<WordEvent>>) -> Self {
        Self {
            resolver,
            downstream,
        }
    }

    /// Start the stage task. The join handle yields the resolver back.
    pub fn spawn(self, capacity: usize) -> (WordStageHandle, JoinHandle<R>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (WordStageHandle { tx }, task)
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<WordStageCommand>) -> R {
        while let Some(command) = inbox.recv().await {
            match command {
                WordStageCommand::Search(event) => {
                    let outcome = self.process(event).await;
                    if self.downstream.send(outcome).await.is_err() {
                        warn!("signature stage is gone, stopping word stage");
                        break;
                    }
                }
                WordStageCommand::Maintain { op, reply } => {
                    let result = self.maintain(op);
                    if reply.send(result).is_err() {
                        debug!("maintenance caller went away before the reply");
                    }
                }
            }
        }
        debug!("word stage stopped");
        self.resolver
    }

    fn maintain(&mut self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        let removed = self.resolver.apply(op)?;
        self.resolver.refresh()?;
        Ok(removed)
    }

    /// Resolve one request.
    pub async fn process(&mut self, event: FeatureEvent) -> Outcome<WordEvent> {
        let FeatureEvent {
            sensor,
            mut perf,
            session,
        } = event;

        if sensor.descriptors.is_empty() {
            return Outcome::Resolved(WordEvent {
                sensor,
                word_ids: Vec::new(),
                perf,
                session,
            });
        }

        let start = Instant::now();
        let result = self.resolver.resolve_words(&sensor, session).await;
        perf.word_search += start.elapsed();

        match result {
            Ok(word_ids) => Outcome::Resolved(WordEvent {
                sensor,
                word_ids,
                perf,
                session,
            }),
            Err(err) => {
                error!(error = %err, session = session.0, "word search failed");
                Outcome::Failed(FailedRequest {
                    reason: FailureReason::from(&err),
                    sensor,
                    perf,
                    session,
                })
            }
        }
    }
}
