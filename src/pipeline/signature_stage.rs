//! Word ids -> ranked signature candidates.

use super::messages::{FailedRequest, FailureReason, Outcome, SignatureEvent, WordEvent};
use super::resolver::SignatureResolver;
use crate::error::StageError;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Sending side of the signature stage.
#[derive(Debug, Clone)]
pub struct SignatureStageHandle {
    tx: mpsc::Sender<Outcome<WordEvent>>,
}

impl SignatureStageHandle {
    pub async fn submit(&self, event: Outcome<WordEvent>) -> Result<(), StageError> {
        self.tx.send(event).await.map_err(|_| StageError::ChannelClosed)
    }

    /// Raw sender, for wiring an upstream stage directly to this one.
    pub fn sender(&self) -> mpsc::Sender<Outcome<WordEvent>> {
        self.tx.clone()
    }
}

/// Single-owner processor ranking signatures for word-resolved requests.
pub struct SignatureSearchStage<R> {
    resolver: R,
    top_k: usize,
    downstream: mpsc::Sender<Outcome<SignatureEvent>>,
}

impl<R: SignatureResolver> SignatureSearchStage<R> {
    pub fn new(resolver: R, top_k: usize, downstream: mpsc::Sender<Outcome<SignatureEvent>>) -> Self {
        Self {
            resolver,
            top_k,
            downstream,
        }
    }

    pub fn spawn(self, capacity: usize) -> (SignatureStageHandle, JoinHandle<R>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (SignatureStageHandle { tx }, task)
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<Outcome<WordEvent>>) -> R {
        while let Some(event) = inbox.recv().await {
            let outcome = self.process(event).await;
            if self.downstream.send(outcome).await.is_err() {
                warn!("result receiver is gone, stopping signature stage");
                break;
            }
        }
        debug!("signature stage stopped");
        self.resolver
    }

    /// Rank one request. Failed requests pass through unchanged.
    pub async fn process(&mut self, event: Outcome<WordEvent>) -> Outcome<SignatureEvent> {
        let WordEvent {
            sensor,
            word_ids,
            mut perf,
            session,
        } = match event {
            Outcome::Resolved(event) => event,
            Outcome::Failed(failed) => return Outcome::Failed(failed),
        };

        if word_ids.is_empty() {
            return Outcome::Resolved(SignatureEvent {
                sensor,
                word_ids,
                candidates: Vec::new(),
                perf,
                session,
            });
        }

        let start = Instant::now();
        let result = self
            .resolver
            .resolve_signatures(&word_ids, &sensor, session, self.top_k)
            .await;
        perf.signature_search += start.elapsed();

        match result {
            Ok(mut candidates) => {
                candidates.truncate(self.top_k);
                Outcome::Resolved(SignatureEvent {
                    sensor,
                    word_ids,
                    candidates,
                    perf,
                    session,
                })
            }
            Err(err) => {
                error!(error = %err, session = session.0, "signature search failed");
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
