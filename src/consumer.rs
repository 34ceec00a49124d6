//! NATS request consumer for scoring requests

use crate::config::NatsConfig;
use crate::error::PredictError;
use crate::metrics::ScoringMetrics;
use crate::pipeline::{PipelineSummary, ScoringPipeline};
use crate::types::{BatchReply, ErrorReply, ScoreReply};
use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::stream::{self, SelectAll};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// What a request asks the service to do, by subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Score,
    Batch,
    Health,
}

/// Reply body for any request kind
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Score(ScoreReply),
    Batch(BatchReply),
    Health(PipelineSummary),
    Error(ErrorReply),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

/// Routes message subjects to request kinds
#[derive(Debug, Clone)]
pub struct RequestRouter {
    score_subject: String,
    batch_subject: String,
    health_subject: String,
}

impl RequestRouter {
    pub fn new(config: &NatsConfig) -> Self {
        Self {
            score_subject: config.score_subject.clone(),
            batch_subject: config.batch_subject.clone(),
            health_subject: config.health_subject.clone(),
        }
    }

    pub fn subjects(&self) -> [&str; 3] {
        [
            &self.score_subject,
            &self.batch_subject,
            &self.health_subject,
        ]
    }

    /// Map a message subject to the request it carries
    pub fn classify(&self, subject: &str) -> Option<RequestKind> {
        if subject == self.score_subject {
            Some(RequestKind::Score)
        } else if subject == self.batch_subject {
            Some(RequestKind::Batch)
        } else if subject == self.health_subject {
            Some(RequestKind::Health)
        } else {
            None
        }
    }
}

/// Consumer for receiving scoring requests from NATS
pub struct ScoreConsumer {
    client: Client,
    router: RequestRouter,
}

impl ScoreConsumer {
    /// Create a new consumer for the configured subjects
    pub fn new(client: Client, config: &NatsConfig) -> Self {
        Self {
            client,
            router: RequestRouter::new(config),
        }
    }

    /// Subscribe to every request subject and merge them into one stream
    pub async fn subscribe(&self) -> Result<SelectAll<Subscriber>> {
        let mut subscribers = Vec::with_capacity(3);
        for subject in self.router.subjects() {
            subscribers.push(self.client.subscribe(subject.to_string()).await?);
            info!(subject = %subject, "Subscribed to request subject");
        }
        Ok(stream::select_all(subscribers))
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }
}

/// Bounds concurrent request handling; `drain` waits for in-flight requests.
#[derive(Clone)]
pub struct WorkerLimit {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl WorkerLimit {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wait for a free worker slot; the slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Ok(self.semaphore.clone().acquire_owned().await?)
    }

    pub fn in_flight(&self) -> usize {
        self.workers - self.semaphore.available_permits()
    }

    /// Wait until every in-flight request has released its slot, then stop
    /// handing out new ones.
    pub async fn drain(&self) -> Result<()> {
        let all = self.semaphore.acquire_many(self.workers as u32).await?;
        all.forget();
        self.semaphore.close();
        Ok(())
    }
}

/// Handle one request payload and build its reply, recording metrics.
pub fn handle_request(
    pipeline: &ScoringPipeline,
    metrics: &ScoringMetrics,
    kind: RequestKind,
    request_id: String,
    payload: &[u8],
) -> Response {
    let start_time = Instant::now();
    match kind {
        RequestKind::Health => Response::Health(pipeline.summary()),
        RequestKind::Score => match parse_payload(payload) {
            Ok(value) => score_one(pipeline, metrics, request_id, &value, start_time),
            Err(e) => failed(metrics, request_id, e),
        },
        RequestKind::Batch => match parse_payload(payload) {
            Ok(value) => score_batch(pipeline, metrics, request_id, &value, start_time),
            Err(e) => failed(metrics, request_id, e),
        },
    }
}

fn score_one(
    pipeline: &ScoringPipeline,
    metrics: &ScoringMetrics,
    request_id: String,
    value: &Value,
    start_time: Instant,
) -> Response {
    match pipeline.predict(value) {
        Ok(decision) => {
            metrics.record_decision(start_time.elapsed(), decision.probability, decision.label);
            debug!(
                request_id = %request_id,
                probability = decision.probability,
                prediction = decision.label,
                "Record scored"
            );
            Response::Score(ScoreReply::new(request_id, &decision))
        }
        Err(e) => failed(metrics, request_id, e),
    }
}

fn score_batch(
    pipeline: &ScoringPipeline,
    metrics: &ScoringMetrics,
    request_id: String,
    value: &Value,
    start_time: Instant,
) -> Response {
    match pipeline.predict_batch(value) {
        Ok(results) => {
            let per_item = start_time.elapsed() / results.len().max(1) as u32;
            for result in &results {
                match result {
                    Ok(decision) => {
                        metrics.record_decision(per_item, decision.probability, decision.label)
                    }
                    Err(e) => metrics.record_error(e.kind()),
                }
            }
            debug!(request_id = %request_id, records = results.len(), "Batch scored");
            Response::Batch(BatchReply::new(request_id, pipeline.threshold(), &results))
        }
        Err(e) => failed(metrics, request_id, e),
    }
}

fn parse_payload(payload: &[u8]) -> Result<Value, PredictError> {
    serde_json::from_slice(payload)
        .map_err(|e| PredictError::InvalidInput(format!("request body is not valid JSON: {}", e)))
}

fn failed(metrics: &ScoringMetrics, request_id: String, error: PredictError) -> Response {
    metrics.record_error(error.kind());
    Response::Error(ErrorReply::new(request_id, &error))
}
