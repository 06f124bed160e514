// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! The flusher driver contract (spec.md §4.5): a single-threaded,
//! cooperative loop that feeds records and heartbeats into a sink.
//!
//! Grounded in the teacher's `db::writer::Syncer` command loop, which reads
//! one `SyncerCommand` at a time from an `mpsc::Receiver` and blocks with a
//! timeout so it can still make periodic progress (flushing the database)
//! when no command arrives. This module keeps that same shape -- blocking,
//! synchronous, one thread -- but drops the database/SQLite coupling
//! entirely, since the session-binning sink has no secondary index to
//! maintain.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::record::AppendRecord;
use crate::writer::Outcome;

/// Anything that can accept records and heartbeats the way
/// [`crate::writer::SessionBinningSink`] does. A trait rather than a
/// concrete type so the driver loop below can be exercised against a test
/// double that doesn't need a real `RemoteFs`.
pub trait FlusherTarget {
    fn setup(&mut self);
    fn append(&mut self, record: &AppendRecord) -> Result<Outcome, base::Error>;
    fn heartbeat(&mut self) -> Result<Outcome, base::Error>;
    fn cleanup(&mut self);
}

impl<D: crate::dir::RemoteFs> FlusherTarget for crate::writer::SessionBinningSink<D> {
    fn setup(&mut self) {
        crate::writer::SessionBinningSink::setup(self)
    }

    fn append(&mut self, record: &AppendRecord) -> Result<Outcome, base::Error> {
        crate::writer::SessionBinningSink::append(self, record)
    }

    fn heartbeat(&mut self) -> Result<Outcome, base::Error> {
        crate::writer::SessionBinningSink::heartbeat(self)
    }

    fn cleanup(&mut self) {
        crate::writer::SessionBinningSink::cleanup(self)
    }
}

/// Message accepted by [`run_driver`]: either a record to append, or a
/// request to shut the loop down cleanly once `cleanup` has run.
pub enum DriverCommand {
    Append(AppendRecord),
    Shutdown,
}

/// How long the driver blocks for the next command before treating the
/// silence itself as a heartbeat trigger (spec.md §4.5: "heartbeats occur
/// ... whenever the driver's queue is empty").
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Drives `target` from `commands` until a [`DriverCommand::Shutdown`] is
/// received or the channel disconnects. Blocking and single-threaded by
/// design (spec.md §5): the driver never spawns additional threads, and
/// never calls into `target` from more than one place at a time.
///
/// `target.setup()` is called once up front; `target.cleanup()` is always
/// called before returning, even if the loop exits because the channel
/// disconnected without an explicit `Shutdown`.
pub fn run_driver(target: &mut dyn FlusherTarget, commands: &Receiver<DriverCommand>) {
    target.setup();

    loop {
        match commands.recv_timeout(HEARTBEAT_INTERVAL) {
            Ok(DriverCommand::Append(record)) => {
                if let Err(e) = target.append(&record) {
                    tracing::error!(err = %e.chain(), "unexpected error from append");
                    break;
                }
            }
            Ok(DriverCommand::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Err(e) = target.heartbeat() {
                    tracing::error!(err = %e.chain(), "unexpected error from heartbeat");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    target.cleanup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::MockDir;
    use crate::event_id::EventId;
    use crate::writer::SinkConfig;
    use base::clock::FakeClock;
    use std::sync::mpsc;

    fn sink(clock: FakeClock) -> crate::writer::SessionBinningSink<MockDir> {
        crate::writer::SessionBinningSink::new(
            MockDir::new(),
            clock,
            SinkConfig {
                session_timeout_ms: 1000,
                sync_every_millis: 1_000_000,
                sync_every_records: 1_000_000,
                replication: 1,
            },
        )
    }

    #[test]
    fn driver_runs_setup_appends_and_cleanup_then_stops_on_shutdown() {
        let clock = FakeClock::new(0);
        let mut target = sink(clock);
        let (tx, rx) = mpsc::channel();

        tx.send(DriverCommand::Append(AppendRecord::new(
            0,
            EventId::generate_at(0),
            vec![9],
        )))
        .unwrap();
        tx.send(DriverCommand::Shutdown).unwrap();

        run_driver(&mut target, &rx);

        assert!(target.open_rounds().is_empty(), "cleanup should close all files");
    }

    #[test]
    fn driver_stops_cleanly_when_channel_is_dropped() {
        let clock = FakeClock::new(0);
        let mut target = sink(clock);
        let (tx, rx) = mpsc::channel();
        drop(tx);

        run_driver(&mut target, &rx);
    }
}
