//! NATS reply publisher for scoring results

use anyhow::{Context, Result};
use async_nats::{Client, Message};
use serde::Serialize;
use tracing::{debug, warn};

/// Publishes JSON replies to a request's reply subject
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Publish a reply to the inbox of `request`.
    ///
    /// Fire-and-forget messages carry no reply subject; their result is
    /// dropped and `false` is returned.
    pub async fn reply<T: Serialize>(&self, request: &Message, body: &T) -> Result<bool> {
        let Some(inbox) = request.reply.clone() else {
            warn!(subject = %request.subject, "Request has no reply subject, dropping result");
            return Ok(false);
        };

        let payload = encode(body)?;
        let size = payload.len();

        self.client
            .publish(inbox.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish reply to {}", inbox))?;

        debug!(inbox = %inbox, bytes = size, "Published reply");
        Ok(true)
    }
}

fn encode<T: Serialize>(body: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(body).context("Failed to serialize reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictError;
    use crate::types::{Decision, ErrorReply, ScoreReply};

    // Publishing itself requires a running NATS server

    #[test]
    fn test_encode_score_reply() {
        let decision = Decision {
            probability: 0.123456,
            label: 0,
            threshold: 0.5,
        };
        let payload = encode(&ScoreReply::new("r1".to_string(), &decision)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(body["prediction"], 0);
        assert_eq!(body["fraud_probability"], 0.1235);
        assert_eq!(body["threshold_used"], 0.5);
    }

    #[test]
    fn test_encode_error_reply() {
        let error = PredictError::Scoring("session closed".to_string());
        let payload = encode(&ErrorReply::new("r2".to_string(), &error)).unwrap();
        let body: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(body["kind"], "scoring_failed");
        assert!(body["error"].as_str().unwrap().contains("session closed"));
    }
}
