//! Fraud Scoring Service - Main Entry Point
//!
//! Loads model artifacts, then answers scoring requests over NATS request/reply.
//! Requests are handled in parallel up to the configured worker count.

use anyhow::{Context, Result};
use fraud_scoring::{
    artifacts::ArtifactLoader,
    config::AppConfig,
    consumer::{handle_request, Response, ScoreConsumer, WorkerLimit},
    metrics::{MetricsReporter, ScoringMetrics},
    pipeline::ScoringPipeline,
    producer::ReplyPublisher,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config)?;

    info!("Starting Fraud Scoring Service");
    info!(
        model_dir = %config.artifacts.model_dir,
        bundle = ?config.artifacts.bundle,
        encoding = ?config.artifacts.encoding,
        "Configuration loaded successfully"
    );

    // Missing or inconsistent artifacts are fatal
    let artifacts = ArtifactLoader::new(&config.artifacts)
        .load()
        .context("Failed to load model artifacts")?;
    let pipeline = ScoringPipeline::new(
        artifacts,
        config.detection.default_threshold,
        config.detection.threshold_override,
    )
    .context("Failed to assemble scoring pipeline")?;

    let summary = pipeline.summary();
    info!(
        classifier = %summary.classifier,
        raw_features = summary.raw_features,
        trained_columns = summary.trained_columns,
        usable_columns = summary.usable_columns,
        threshold = summary.threshold,
        threshold_source = %summary.threshold_source,
        "Model summary"
    );

    let pipeline = Arc::new(pipeline);
    let metrics = Arc::new(ScoringMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = ScoreConsumer::new(client.clone(), &config.nats);
    let publisher = ReplyPublisher::new(client);
    let mut requests = consumer.subscribe().await?;

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    // Limits concurrent scoring
    let workers = WorkerLimit::new(config.pipeline.workers);
    info!(
        "Starting request processing loop with {} parallel workers",
        workers.workers()
    );

    let processed_count = Arc::new(AtomicU64::new(0));

    loop {
        let message = tokio::select! {
            message = requests.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let Some(kind) = consumer.router().classify(message.subject.as_str()) else {
            warn!(subject = %message.subject, "Ignoring message on unknown subject");
            continue;
        };

        let permit = workers.acquire().await?;

        let pipeline = pipeline.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let request_id = Uuid::new_v4().to_string();
            let response = handle_request(
                &pipeline,
                &metrics,
                kind,
                request_id.clone(),
                &message.payload,
            );

            match &response {
                Response::Error(reply) => warn!(
                    request_id = %request_id,
                    kind = %reply.kind,
                    error = %reply.error,
                    "Request failed"
                ),
                Response::Score(reply) if reply.prediction == 1 => info!(
                    request_id = %request_id,
                    fraud_probability = reply.fraud_probability,
                    threshold = reply.threshold_used,
                    "Record flagged as fraud"
                ),
                _ => debug!(request_id = %request_id, request = ?kind, "Request handled"),
            }

            if let Err(e) = publisher.reply(&message, &response).await {
                error!(request_id = %request_id, error = %e, "Failed to publish reply");
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;

            // Log progress every 100 requests
            if count % 100 == 0 {
                let latency = metrics.get_latency_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} rec/s", metrics.get_throughput()),
                    avg_latency_us = latency.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!(in_flight = workers.in_flight(), "Service shutting down, waiting for in-flight requests...");
    workers.drain().await?;
    metrics.print_summary();

    Ok(())
}

/// Initialize tracing: `RUST_LOG` wins over `logging.level`.
fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("Invalid log level `{}`", config.logging.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}
