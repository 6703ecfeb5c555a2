//! Tax-authority reporting client
//!
//! Finalized sales documents are submitted to the national tax authority.
//! The outcome is stored on the document; a rejected or unreported document
//! blocks creation of the next one in the same series.

use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::config::ReportingConfig;

/// Tax-authority API client
#[derive(Clone)]
pub struct ReportingClient {
    client: Client,
    endpoint: String,
    api_key: String,
    enabled: bool,
}

/// What gets submitted for one document
#[derive(Debug, Serialize)]
pub struct ReportSubmission {
    pub store_id: Uuid,
    pub document_id: Uuid,
    pub serial: String,
    pub entry_date: NaiveDate,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
}

/// Authority verdict for a submission
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub passed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    passed: bool,
    error: Option<String>,
}

impl ReportingClient {
    pub fn new(config: &ReportingConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            enabled: config.enabled,
        }
    }

    /// Whether reporting is switched on for this deployment
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Submit one document. Transport failures come back as a failed
    /// outcome; the caller stores it and the series stays blocked until a
    /// retry passes.
    pub async fn report(&self, submission: &ReportSubmission) -> ReportOutcome {
        if !self.enabled {
            return ReportOutcome {
                passed: true,
                error: None,
            };
        }

        let response = self
            .client
            .post(format!("{}/v1/documents", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(submission)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<AuthorityResponse>().await {
                    Ok(body) => ReportOutcome {
                        passed: body.passed,
                        error: body.error,
                    },
                    Err(e) => ReportOutcome {
                        passed: false,
                        error: Some(format!("malformed authority response: {}", e)),
                    },
                }
            }
            Ok(response) => ReportOutcome {
                passed: false,
                error: Some(format!("authority returned {}", response.status())),
            },
            Err(e) => ReportOutcome {
                passed: false,
                error: Some(format!("authority unreachable: {}", e)),
            },
        }
    }
}
