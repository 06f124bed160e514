// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Session-binning file writer: buckets incoming events into time-windowed
//! output files keyed off session start time, and the driver contract that
//! feeds it.

pub mod dir;
pub mod event_id;
pub mod flusher;
pub mod record;
pub mod writer;

pub use crate::event_id::EventId;
pub use crate::flusher::{run_driver, DriverCommand, FlusherTarget};
pub use crate::record::AppendRecord;
pub use crate::writer::{Outcome, SessionBinningSink, SinkConfig};
