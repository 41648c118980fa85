//! HMAC-SHA256 integrity signatures for published states.
//!
//! The signature covers `agent_id|x|y|speed|direction|timestamp` with numbers
//! at 4 decimals and the timestamp in epoch milliseconds. It is carried
//! base64-encoded in `StateMessage::signature`.

use crate::message::StateMessage;
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The signed subset of a state message
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignedFields<'a> {
    pub agent_id: &'a str,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub direction: f64,
    pub timestamp_ms: i64,
}

impl<'a> SignedFields<'a> {
    pub fn of(message: &'a StateMessage) -> Self {
        Self {
            agent_id: &message.agent_id,
            x: message.x,
            y: message.y,
            speed: message.speed,
            direction: message.direction,
            timestamp_ms: message.timestamp.timestamp_millis(),
        }
    }

    fn canonical(&self) -> String {
        format!(
            "{}|{:.4}|{:.4}|{:.4}|{:.4}|{}",
            self.agent_id, self.x, self.y, self.speed, self.direction, self.timestamp_ms
        )
    }
}

/// Keyed signer shared by every publish on a channel
#[derive(Clone)]
pub struct MessageSigner {
    mac: HmacSha256,
}

impl MessageSigner {
    pub fn new(key: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
        Ok(Self { mac })
    }

    /// Compute the base64 signature of `fields`
    pub fn sign(&self, fields: &SignedFields<'_>) -> String {
        let mut mac = self.mac.clone();
        mac.update(fields.canonical().as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Recompute and compare in constant time
    pub fn verify(&self, fields: &SignedFields<'_>, signature: &str) -> bool {
        let Ok(expected) = BASE64.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(fields.canonical().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageSigner { .. }")
    }
}
