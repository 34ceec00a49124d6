//! Scoring Request Client
//!
//! Sends sample scoring requests to a running service and logs the replies.

use chrono::{Datelike, Timelike, Utc};
use rand::Rng;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Sample record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Every recognized field, numeric categorical codes
    fn full_numeric(&mut self) -> Value {
        let now = Utc::now();
        json!({
            "Transaction_Amount": self.rng.gen_range(10.0..500.0),
            "Transaction_Type": self.rng.gen_range(0..5),
            "Account_Balance": self.rng.gen_range(100.0..20000.0),
            "Device_Type": self.rng.gen_range(0..4),
            "Location": self.rng.gen_range(0..8),
            "Merchant_Category": self.rng.gen_range(0..6),
            "IP_Address_Flag": 0,
            "Previous_Fraudulent_Activity": 0,
            "Daily_Transaction_Count": self.rng.gen_range(0..10),
            "Avg_Transaction_Amount_7d": self.rng.gen_range(50.0..200.0),
            "Failed_Transaction_Count_7d": self.rng.gen_range(0..2),
            "Card_Type": self.rng.gen_range(0..4),
            "Card_Age": self.rng.gen_range(30..2000),
            "Transaction_Distance": self.rng.gen_range(0.0..100.0),
            "Authentication_Method": self.rng.gen_range(0..4),
            "Is_Weekend": u8::from(now.weekday().number_from_monday() >= 6),
            "Hour": now.hour(),
            "Month": now.month(),
            "Year": now.year(),
        })
    }

    /// Text categories, string booleans and a suspicious profile
    fn suspicious_text(&mut self) -> Value {
        json!({
            "Transaction_Amount": self.rng.gen_range(2000.0..10000.0),
            "Transaction_Type": self.random_choice(&["Bank Transfer", "ATM Withdrawal"]),
            "Account_Balance": self.rng.gen_range(0.0..500.0),
            "Device_Type": "Web",
            "Location": self.random_choice(&["Lagos", "Abuja"]),
            "Merchant_Category": "Electronics",
            "IP_Address_Flag": "true",
            "Previous_Fraudulent_Activity": true,
            "Daily_Transaction_Count": self.rng.gen_range(10..30),
            "Avg_Transaction_Amount_7d": self.rng.gen_range(50.0..150.0),
            "Failed_Transaction_Count_7d": self.rng.gen_range(3..8),
            "Card_Type": "Visa",
            "Card_Age": self.rng.gen_range(1..30),
            "Transaction_Distance": self.rng.gen_range(500.0..5000.0),
            "Authentication_Method": "Password",
            "Is_Weekend": false,
            "Hour": self.rng.gen_range(0..5),
            "Month": Utc::now().month(),
            "Year": Utc::now().year(),
        })
    }

    /// Only a few fields; the rest are neutral-filled by the service
    fn partial(&mut self) -> Value {
        json!({
            "Transaction_Amount": self.rng.gen_range(10.0..500.0),
            "Card_Type": "MasterCard",
            "Hour": Utc::now().hour(),
        })
    }

    /// A category value the model never saw
    fn unknown_location(&mut self) -> Value {
        let mut record = self.full_numeric();
        record["Location"] = json!("Atlantis");
        record
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

/// Named request: (subject kind, label, body)
fn sample_requests(generator: &mut RecordGenerator) -> Vec<(&'static str, &'static str, Value)> {
    vec![
        ("score", "full numeric record", generator.full_numeric()),
        ("score", "suspicious text record", generator.suspicious_text()),
        ("score", "partial record", generator.partial()),
        ("score", "unknown location", generator.unknown_location()),
        ("score", "list payload", json!([generator.full_numeric()])),
        (
            "batch",
            "batch of three",
            json!([
                generator.full_numeric(),
                generator.suspicious_text(),
                generator.partial()
            ]),
        ),
        ("health", "health check", json!({})),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("score_client=info".parse()?),
        )
        .init();

    info!("Starting Scoring Request Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let prefix = args.get(2).map(|s| s.as_str()).unwrap_or("fraud");
    let rounds: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        prefix = %prefix,
        rounds = rounds,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(rounds);
        }
    };

    let mut generator = RecordGenerator::new();

    for round in 0..rounds {
        for (kind, label, body) in sample_requests(&mut generator) {
            let subject = match kind {
                "score" => format!("{}.score", prefix),
                "batch" => format!("{}.score.batch", prefix),
                _ => format!("{}.health", prefix),
            };
            let payload = serde_json::to_vec(&body)?;

            match client.request(subject.clone(), payload.into()).await {
                Ok(reply) => {
                    let reply: Value = serde_json::from_slice(&reply.payload)?;
                    info!(round = round + 1, request = label, subject = %subject, "Reply: {}", reply);
                }
                Err(e) => warn!(request = label, subject = %subject, error = %e, "Request failed"),
            }

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    info!("Completed {} rounds", rounds);

    Ok(())
}

fn run_dry_mode(rounds: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    for _ in 0..rounds {
        for (kind, label, body) in sample_requests(&mut generator) {
            info!("Sample {} request ({}):\n{}", kind, label, serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
