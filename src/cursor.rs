use anyhow::{anyhow, Result};
use base64::prelude::*;
use hmac::{Hmac, Mac};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::models::Link;

/// Position in the newest-first link listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorData {
    /// Unix milliseconds
    pub created_at: i64,
    pub id: i64,
}

impl From<&Link> for CursorData {
    fn from(link: &Link) -> Self {
        Self {
            created_at: link.created_at.timestamp_millis(),
            id: link.id,
        }
    }
}

/// Signs and verifies opaque `payload.signature` paging cursors
#[derive(Clone)]
pub struct CursorCodec {
    key: Vec<u8>,
}

impl CursorCodec {
    /// If secret is None, generates a random key (cursors won't survive restarts)
    pub fn new(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) => s.as_bytes().to_vec(),
            None => {
                let mut rng = rand::rng();
                (0..32).map(|_| rng.random::<u8>()).collect()
            }
        };
        Self { key }
    }

    fn mac(&self) -> Result<Hmac<Sha256>> {
        Hmac::<Sha256>::new_from_slice(&self.key).map_err(|e| anyhow!("Failed to create HMAC: {}", e))
    }

    pub fn encode(&self, data: &CursorData) -> Result<String> {
        let json = serde_json::to_string(data)?;
        let payload = BASE64_URL_SAFE_NO_PAD.encode(json.as_bytes());

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature_b64 = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature_b64))
    }

    pub fn decode(&self, cursor: &str) -> Result<CursorData> {
        let (payload, signature_b64) = cursor
            .split_once('.')
            .filter(|(_, sig)| !sig.contains('.'))
            .ok_or_else(|| anyhow!("Invalid cursor format"))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let expected = mac.finalize().into_bytes();

        let provided = BASE64_URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| anyhow!("Invalid cursor signature encoding"))?;

        if !bool::from(expected.ct_eq(&provided[..])) {
            return Err(anyhow!("Cursor signature verification failed"));
        }

        let json_bytes = BASE64_URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| anyhow!("Invalid cursor payload encoding"))?;
        serde_json::from_slice(&json_bytes).map_err(|_| anyhow!("Invalid cursor data"))
    }
}
