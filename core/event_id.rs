// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Compact, sortable, totally-parseable session identifiers.
//!
//! See spec.md §4.1. An `EventId` is the canonical string `version:timestamp:payload`,
//! where `timestamp` is a base-36 encoded millisecond Unix timestamp and `payload` is
//! 24 bytes of randomness, URL-safe base64 encoded without padding.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

/// The only version this implementation emits or accepts.
const VERSION: char = '0';

const PAYLOAD_LEN: usize = 24;

/// A versioned, timestamp-bearing, random-payload session identifier.
///
/// Equality and hashing are defined on the canonical string form (`value`),
/// so two `EventId`s with the same timestamp but independently generated
/// payloads are unequal, while parsing a value back out always recovers an
/// equal, equally-hashing `EventId`.
#[derive(Clone, Debug)]
pub struct EventId {
    version: char,
    timestamp: i64,
    payload: [u8; PAYLOAD_LEN],
    value: String,
}

impl EventId {
    /// Generates a fresh id for the current wall-clock time.
    pub fn generate() -> EventId {
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        EventId::generate_at(now_ms)
    }

    /// Generates a fresh id carrying the given timestamp.
    pub fn generate_at(timestamp: i64) -> EventId {
        let mut payload = [0u8; PAYLOAD_LEN];
        rand::thread_rng().fill_bytes(&mut payload);
        EventId::from_parts(VERSION, timestamp, payload)
    }

    fn from_parts(version: char, timestamp: i64, payload: [u8; PAYLOAD_LEN]) -> EventId {
        let value = format!(
            "{version}:{ts}:{payload}",
            ts = encode_base36(timestamp.max(0) as u64),
            payload = URL_SAFE_NO_PAD.encode(payload),
        );
        EventId {
            version,
            timestamp,
            payload,
            value,
        }
    }

    /// Parses a canonical string. Never raises: malformed or wrong-version
    /// input simply yields `None`.
    pub fn try_parse(s: &str) -> Option<EventId> {
        let mut parts = s.splitn(3, ':');
        let version = parts.next()?;
        let ts = parts.next()?;
        let payload = parts.next()?;
        if parts.next().is_some() {
            return None; // extra `:`-separated segment.
        }
        let mut chars = version.chars();
        let version = chars.next()?;
        if chars.next().is_some() || version != VERSION {
            return None;
        }
        let timestamp = decode_base36(ts)? as i64;
        let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let payload: [u8; PAYLOAD_LEN] = decoded.try_into().ok()?;
        Some(EventId::from_parts(version, timestamp, payload))
    }

    pub fn version(&self) -> char {
        self.version
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8; PAYLOAD_LEN] {
        &self.payload
    }

    /// The canonical string form.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl PartialEq for EventId {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for EventId {}

impl std::hash::Hash for EventId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn encode_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    // SAFETY: every byte came from BASE36_ALPHABET, which is ASCII.
    String::from_utf8(digits).unwrap()
}

fn decode_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for c in s.chars() {
        let digit = c.to_digit(36)?;
        n = n.checked_mul(36)?.checked_add(digit as u64)?;
    }
    Some(n)
}
