//! Public certificate verification lookup.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::record::CertificateRecord;
use crate::{Error, Result};

/// Reason reported when the verification endpoint cannot be reached.
pub const NETWORK_ERROR: &str = "Network error";

/// Ledger block anchoring a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: String,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    pub timestamp: Timestamp,
}

/// Block timestamps arrive either as epoch milliseconds or as a date string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Millis(ms) => write!(f, "{} ms", ms),
            Timestamp::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid {
        record: CertificateRecord,
        block: BlockRecord,
    },
    Invalid {
        reason: String,
    },
}

impl VerificationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid { .. })
    }
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    #[serde(default)]
    valid: bool,
    data: Option<CertificateRecord>,
    block: Option<BlockRecord>,
    error: Option<String>,
}

/// Looks certificate hashes up on the backend.
#[derive(Debug, Clone)]
pub struct Verifier {
    client: ApiClient,
}

impl Verifier {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `GET {api}/verify/{hash}`, unauthenticated.
    pub async fn verify(&self, hash: &str) -> Result<VerificationOutcome> {
        let what = format!("verification of {}", hash);
        let url = self.client.api_url(&["verify", hash])?;
        let body = match self.client.send(url, false, &what).await {
            Ok(resp) => match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("{} failed: {}", what, e);
                    return Ok(invalid(NETWORK_ERROR));
                }
            },
            Err(e) => {
                warn!("{} failed: {}", what, e);
                return Ok(invalid(NETWORK_ERROR));
            }
        };
        let outcome = outcome_from_body(&body).map_err(|reason| Error::fetch(what, reason))?;
        debug!("hash {} verified: {}", hash, outcome.is_valid());
        Ok(outcome)
    }
}

fn invalid(reason: impl Into<String>) -> VerificationOutcome {
    VerificationOutcome::Invalid {
        reason: reason.into(),
    }
}

fn outcome_from_body(body: &[u8]) -> std::result::Result<VerificationOutcome, String> {
    let body: VerifyBody = serde_json::from_slice(body).map_err(|e| format!("malformed response: {}", e))?;
    if !body.valid {
        return Ok(invalid(
            body.error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Certificate not found".to_string()),
        ));
    }
    match (body.data, body.block) {
        (Some(record), Some(block)) => Ok(VerificationOutcome::Valid { record, block }),
        _ => Err("valid response without record or block".to_string()),
    }
}
