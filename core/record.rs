// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! The record carrier handed to the sink by upstream producers.
//!
//! Per spec.md §4.2, this is a pure, read-only carrier: constructing one
//! implies its bytes already encode a valid container row under whatever
//! schema the (out-of-scope) upstream record mapper uses. The sink never
//! inspects `bytes`, only `event_time` and `session_id`.

use crate::event_id::EventId;

#[derive(Debug)]
pub struct AppendRecord {
    event_time: i64,
    session_id: EventId,
    bytes: Vec<u8>,
}

impl AppendRecord {
    pub fn new(event_time: i64, session_id: EventId, bytes: Vec<u8>) -> Self {
        AppendRecord {
            event_time,
            session_id,
            bytes,
        }
    }

    pub fn event_time(&self) -> i64 {
        self.event_time
    }

    pub fn session_id(&self) -> &EventId {
        &self.session_id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
