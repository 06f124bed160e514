// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! The session-binning sink (spec.md §4.4): a stateful writer that bins
//! incoming events into round-files keyed off the session's start time,
//! using the stream of event timestamps as its own logical clock.
//!
//! Grounded in the teacher's `db::writer::Syncer`: a single struct owning a
//! set of open output files, driven by explicit commands from one thread,
//! that syncs on a threshold and rotates/reopens files over time. Unlike
//! the teacher, there is no SQLite index to keep in step -- this sink's
//! only bookkeeping is the open-file map itself -- and I/O is synchronous
//! rather than `tokio`-driven, per spec.md §5.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use base::bail;
use base::clock::Clock;
use base::ErrorKind;
use chrono::{Datelike, Local, TimeZone, Timelike};

use crate::dir::{local_hostname, ContainerWriter, RemoteFs, RemoteStream};
use crate::record::AppendRecord;

/// Number of round-widths a file is kept open beyond its own round: one for
/// the round itself, plus two of headroom for late-arriving events from
/// sessions that began near the end of the round (spec.md §4.4).
const TTL_ROUNDS: i64 = 3;

/// How long the sink waits after entering `Broken` before it will retry
/// opening the failed round (spec.md §4.4).
const RECONNECT_DELAY_MS: i64 = 15_000;

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Advisory telemetry for the driver; the sink itself manages alive/broken
/// state regardless of what it returns (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Tunable knobs from spec.md §6, minus the directory handle itself (which
/// is supplied separately as a [`RemoteFs`]).
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Session length and round width, in milliseconds.
    pub session_timeout_ms: i64,
    /// Sync-age threshold, in milliseconds.
    pub sync_every_millis: i64,
    /// Sync-count threshold.
    pub sync_every_records: u32,
    /// Replication factor passed through to [`RemoteFs::create`].
    pub replication: u32,
}

struct RoundFile<S: RemoteStream> {
    round: i64,
    path: String,
    writer: ContainerWriter<S>,
    last_sync_time_ms: i64,
    records_since_last_sync: u32,
}

/// The session-binning state machine itself. See spec.md §4.4 for the full
/// state table this implements.
pub struct SessionBinningSink<D: RemoteFs> {
    dir: D,
    clock: Box<dyn Clock>,
    config: SinkConfig,
    hostname: String,
    instance: u64,
    open_files: HashMap<i64, Rc<RefCell<RoundFile<D::Stream>>>>,
    alive: bool,
    failed_round: Option<i64>,
    last_fix_attempt_ms: i64,
    time_signal_ms: i64,
}

impl<D: RemoteFs> SessionBinningSink<D> {
    pub fn new(dir: D, clock: impl Clock, config: SinkConfig) -> Self {
        let now = clock.now_ms();
        SessionBinningSink {
            dir,
            clock: Box::new(clock),
            config,
            hostname: local_hostname(),
            instance: INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed),
            open_files: HashMap::new(),
            alive: true,
            failed_round: None,
            last_fix_attempt_ms: now,
            time_signal_ms: now,
        }
    }

    /// Must be called exactly once before any other call (spec.md §4.5).
    /// `open_files` is already empty at construction; this exists as an
    /// explicit lifecycle hook so the driver contract has something to call.
    pub fn setup(&mut self) {
        tracing::info!(hostname = %self.hostname, instance = self.instance, "session-binning sink starting");
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn failed_round(&self) -> Option<i64> {
        self.failed_round
    }

    pub fn time_signal_ms(&self) -> i64 {
        self.time_signal_ms
    }

    /// Rounds currently reachable from `open_files`, for tests. May contain
    /// duplicates when aliasing is in effect.
    pub fn open_rounds(&self) -> Vec<i64> {
        let mut rounds: Vec<i64> = self.open_files.keys().copied().collect();
        rounds.sort_unstable();
        rounds
    }

    fn round_for(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms / self.config.session_timeout_ms
    }

    fn oldest_allowed_round(&self) -> i64 {
        self.time_signal_ms / self.config.session_timeout_ms - (TTL_ROUNDS - 1)
    }

    /// Appends one record. Per spec.md §7, a remote I/O failure is always
    /// caught here (never raised): it is reported as `Ok(Outcome::Failure)`
    /// and drives the sink to `Broken`. Calling this while broken is a
    /// programmer error and is raised.
    pub fn append(&mut self, record: &AppendRecord) -> Result<Outcome, base::Error> {
        if !self.alive {
            bail!(InvalidState, "append() called while the sink is broken");
        }
        self.time_signal_ms = record.event_time();
        let requested = self.round_for(record.session_id().timestamp());

        if let Err(e) = self.resolve_or_create(requested) {
            self.handle_remote_failure(requested, e);
            return Ok(Outcome::Failure);
        }

        // Scoped so the borrowed file is dropped before `evaluate_sync_policy`
        // runs: that call may need to close this very file (see its doc
        // comment), and `Rc::try_unwrap` only succeeds with no other clone
        // of it still alive anywhere on the stack.
        let append_result = {
            let file_rc = self
                .open_files
                .get(&requested)
                .expect("resolve_or_create always populates this key")
                .clone();
            let result = file_rc.borrow_mut().writer.append_encoded(record.bytes());
            if result.is_ok() {
                file_rc.borrow_mut().records_since_last_sync += 1;
            }
            result
        };
        if let Err(e) = append_result {
            self.handle_remote_failure(requested, e);
            return Ok(Outcome::Failure);
        }

        if let Err(e) = self.evaluate_sync_policy(requested) {
            self.handle_remote_failure(requested, e);
            return Ok(Outcome::Failure);
        }

        Ok(Outcome::Success)
    }

    /// Advances the logical clock from wall time (when the driver's queue
    /// is empty) and evaluates the sync policy for every distinct open
    /// file, or -- while broken -- attempts reconnect once the reconnect
    /// delay has elapsed.
    pub fn heartbeat(&mut self) -> Result<Outcome, base::Error> {
        if !self.alive {
            return Ok(self.heartbeat_broken());
        }

        self.time_signal_ms = self.clock.now_ms();

        // One representative round key per distinct open file, not the
        // files themselves: holding a live clone here would block the
        // same `Rc::try_unwrap` that a stale file's close needs below.
        for round_key in self.distinct_round_keys() {
            if let Err(e) = self.evaluate_sync_policy(round_key) {
                // spec.md §4.4: on a heartbeat failure, failed_round is the
                // offending file's own round, not whichever alias key
                // distinct_round_keys() happened to return for it.
                let offending_round = self
                    .open_files
                    .get(&round_key)
                    .map(|rc| rc.borrow().round)
                    .unwrap_or(round_key);
                self.handle_remote_failure(offending_round, e);
                return Ok(Outcome::Failure);
            }
        }
        Ok(Outcome::Success)
    }

    fn heartbeat_broken(&mut self) -> Outcome {
        let wall_now = self.clock.now_ms();
        if wall_now - self.last_fix_attempt_ms < RECONNECT_DELAY_MS {
            return Outcome::Failure;
        }
        self.last_fix_attempt_ms = wall_now;
        let failed_round = self
            .failed_round
            .expect("Broken state always carries a failed_round");

        match self.create_round_file(failed_round) {
            Ok(rc) => {
                self.open_files.insert(failed_round, rc);
                self.failed_round = None;
                self.alive = true;
                tracing::info!(round = failed_round, "reconnected to remote file system");
                Outcome::Success
            }
            Err(e) => {
                tracing::warn!(err = %e.chain(), round = failed_round, "reconnect attempt failed");
                Outcome::Failure
            }
        }
    }

    /// Closes every distinct open file, logging (not propagating) any
    /// individual failure, and clears `open_files`. Called at shutdown
    /// regardless of `alive`/`Broken` state (spec.md §4.4).
    pub fn cleanup(&mut self) {
        let files = std::mem::take(&mut self.open_files);
        Self::close_all(files);
        tracing::info!("session-binning sink shut down");
    }

    fn handle_remote_failure(&mut self, round: i64, e: base::Error) {
        tracing::warn!(err = %e.chain(), round, "remote i/o failure; entering broken state");
        self.failed_round = Some(round);
        self.last_fix_attempt_ms = self.clock.now_ms();
        let files = std::mem::take(&mut self.open_files);
        Self::close_all(files);
        self.alive = false;
    }

    /// One representative round key per distinct open file. The Rc clones
    /// used to dedup by identity are all local to this function and dropped
    /// before it returns -- callers get plain keys, never a live handle that
    /// could block a later `Rc::try_unwrap`.
    fn distinct_round_keys(&self) -> Vec<i64> {
        let mut uniques: Vec<(i64, Rc<RefCell<RoundFile<D::Stream>>>)> = Vec::new();
        for (&round_key, rc) in self.open_files.iter() {
            if !uniques.iter().any(|(_, u)| Rc::ptr_eq(u, rc)) {
                uniques.push((round_key, rc.clone()));
            }
        }
        uniques.into_iter().map(|(round_key, _)| round_key).collect()
    }

    fn resolve_or_create(&mut self, requested: i64) -> Result<(), base::Error> {
        if self.open_files.contains_key(&requested) {
            return Ok(());
        }

        // Step 2 (spec.md §4.4): among all currently open files, pick the
        // one with the smallest *actual* round >= requested -- not just
        // whatever happens to be open under the key `requested` itself --
        // so a long-running session whose own round has already been
        // closed lands in the oldest still-open file rather than spawning
        // a new one.
        if let Some(rc) = self.smallest_open_round_at_least(requested) {
            self.open_files.insert(requested, rc);
            return Ok(());
        }

        // Step 3: clamp arbitrarily-old requests up to the oldest
        // still-permitted round. Several distinct stale sessions clamping
        // to the same floor value is exactly how one physical file ends up
        // reachable under more than one round key (spec.md §4.4).
        let effective_round = requested.max(self.oldest_allowed_round());
        let rc = self.create_round_file(effective_round)?;
        self.open_files.insert(effective_round, rc.clone());
        if effective_round != requested {
            self.open_files.insert(requested, rc);
        }
        Ok(())
    }

    /// The open file (if any) whose own `round` is the smallest value
    /// `>= requested`, scanning every currently open file regardless of
    /// which key(s) it's reachable under.
    fn smallest_open_round_at_least(
        &self,
        requested: i64,
    ) -> Option<Rc<RefCell<RoundFile<D::Stream>>>> {
        let mut best: Option<(i64, Rc<RefCell<RoundFile<D::Stream>>>)> = None;
        for rc in self.open_files.values() {
            let round = rc.borrow().round;
            if round < requested {
                continue;
            }
            let better = match &best {
                Some((best_round, _)) => round < *best_round,
                None => true,
            };
            if better {
                best = Some((round, rc.clone()));
            }
        }
        best.map(|(_, rc)| rc)
    }

    fn create_round_file(
        &mut self,
        round: i64,
    ) -> Result<Rc<RefCell<RoundFile<D::Stream>>>, base::Error> {
        let wall_now = self.clock.now_ms();
        let round_start_ms = round * self.config.session_timeout_ms;
        let path = self.filename(round_start_ms, wall_now);

        let stream = self.dir.create(&path, self.config.replication)?;
        let mut writer = ContainerWriter::new(stream);

        // Creation-time durability probe (spec.md §4.4): the remote file
        // system may accept `create` while no storage node can persist
        // data, so force a sync immediately and undo the create if that
        // fails.
        if let Err(e) = writer.hsync() {
            tracing::warn!(err = %e.chain(), path = %path, "initial hsync failed; deleting half-created file");
            if let Err(delete_err) = self.dir.delete(&path) {
                tracing::warn!(err = %delete_err.chain(), path = %path, "failed to delete half-created file");
            }
            return Err(e);
        }

        tracing::info!(path = %path, round, "opened round file");
        Ok(Rc::new(RefCell::new(RoundFile {
            round,
            path,
            writer,
            last_sync_time_ms: wall_now,
            records_since_last_sync: 0,
        })))
    }

    /// Evaluates the sync-count/sync-age thresholds for the file currently
    /// reachable under `round_key` and syncs it if either is met, then
    /// checks the TTL regardless of whether a sync happened: a file can go
    /// stale purely from the passage of time, with no new records arriving
    /// to trigger the sync branch.
    ///
    /// Looks the file up fresh rather than taking an `Rc` from the caller,
    /// and drops its own clone before attempting a TTL close: `close_round`
    /// needs `Rc::try_unwrap` to see exactly one remaining owner (the
    /// `open_files` map), so no clone of the same file may still be alive
    /// on the caller's stack when this returns.
    fn evaluate_sync_policy(&mut self, round_key: i64) -> Result<(), base::Error> {
        let file_rc = match self.open_files.get(&round_key) {
            Some(rc) => rc.clone(),
            None => return Ok(()),
        };

        let wall_now = self.clock.now_ms();
        let (records_since, last_sync) = {
            let f = file_rc.borrow();
            (f.records_since_last_sync, f.last_sync_time_ms)
        };

        let age_exceeded = records_since > 0
            && wall_now.saturating_sub(last_sync) >= self.config.sync_every_millis;
        if records_since >= self.config.sync_every_records || age_exceeded {
            let mut f = file_rc.borrow_mut();
            f.writer.sync()?;
            f.writer.hsync()?;
            f.records_since_last_sync = 0;
            f.last_sync_time_ms = wall_now;
            tracing::debug!(path = %f.path, "synced round file");
        } else if records_since == 0 {
            // Idle file: push last_sync_time_ms forward so a long idle gap
            // doesn't read as stale sync-age the moment the next record
            // arrives (spec.md §4.4 sync policy, "otherwise" branch).
            file_rc.borrow_mut().last_sync_time_ms = wall_now;
        }

        let round = file_rc.borrow().round;
        let is_stale = round < self.oldest_allowed_round();
        drop(file_rc);
        if is_stale {
            self.close_round(round_key);
        }
        Ok(())
    }

    /// Removes every key aliasing to the file reachable under `round_key`
    /// and closes it. Fetches its own clone from the map so the only other
    /// owner at close time is that fetch itself, once the map entries are
    /// gone -- satisfying `Rc::try_unwrap` in `close_one`.
    fn close_round(&mut self, round_key: i64) {
        let Some(file_rc) = self.open_files.get(&round_key).cloned() else {
            return;
        };
        let stale_keys: Vec<i64> = self
            .open_files
            .iter()
            .filter(|(_, v)| Rc::ptr_eq(v, &file_rc))
            .map(|(k, _)| *k)
            .collect();
        for k in stale_keys {
            self.open_files.remove(&k);
        }
        Self::close_one(file_rc);
    }

    fn close_one(file_rc: Rc<RefCell<RoundFile<D::Stream>>>) {
        match Rc::try_unwrap(file_rc) {
            Ok(cell) => {
                let mut file = cell.into_inner();
                let path = file.path.clone();
                let round = file.round;
                if file.records_since_last_sync > 0 {
                    if let Err(e) = file.writer.sync().and_then(|()| file.writer.hsync()) {
                        tracing::warn!(err = %e.chain(), path, round, "final sync before close failed");
                    }
                }
                if let Err(e) = file.writer.close() {
                    tracing::warn!(err = %e.chain(), path, round, "failed to close round file");
                } else {
                    tracing::info!(path, round, "closed round file");
                }
            }
            Err(_) => {
                tracing::warn!("round file still referenced elsewhere at close time");
            }
        }
    }

    fn close_all(files: HashMap<i64, Rc<RefCell<RoundFile<D::Stream>>>>) {
        let mut uniques: Vec<Rc<RefCell<RoundFile<D::Stream>>>> = Vec::new();
        for rc in files.into_values() {
            if !uniques.iter().any(|u| Rc::ptr_eq(u, &rc)) {
                uniques.push(rc);
            }
        }
        for rc in uniques {
            Self::close_one(rc);
        }
    }

    /// Builds the output filename per spec.md §4.4: host, a fixed literal,
    /// a round tag derived from the round's *start* instant, a wall-clock
    /// creation timestamp (disambiguates rapid reopenings after failure),
    /// and a per-process instance counter (disambiguates multiple sinks in
    /// one process).
    fn filename(&self, round_start_ms: i64, creation_now_ms: i64) -> String {
        format!(
            "{host}-divolte-tracking-{round_tag}-{creation_tag}-{instance}.avro",
            host = self.hostname,
            round_tag = round_tag(round_start_ms, self.config.session_timeout_ms),
            creation_tag = creation_tag(creation_now_ms),
            instance = self.instance,
        )
    }
}

/// `YYYYMMDD-RR`, where `RR` is the number of full session-length
/// intervals since local midnight of `instant_ms`. Deliberately computed by
/// plain integer division on local wall-clock time: on DST transition days
/// this isn't bijective with wall time, and that's accepted rather than
/// silently normalized away (spec.md §9, Open Question).
fn round_tag(instant_ms: i64, session_timeout_ms: i64) -> String {
    let dt = local_datetime(instant_ms);
    let ms_since_midnight =
        i64::from(dt.num_seconds_from_midnight()) * 1000 + i64::from(dt.timestamp_subsec_millis());
    let rr = ms_since_midnight / session_timeout_ms;
    format!("{:04}{:02}{:02}-{:02}", dt.year(), dt.month(), dt.day(), rr)
}

/// `HH.mm.ss.SSS` of `instant_ms` in local time.
fn creation_tag(instant_ms: i64) -> String {
    let dt = local_datetime(instant_ms);
    format!(
        "{:02}.{:02}.{:02}.{:03}",
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.timestamp_subsec_millis()
    )
}

fn local_datetime(instant_ms: i64) -> chrono::DateTime<Local> {
    Local
        .timestamp_millis_opt(instant_ms)
        .single()
        .unwrap_or_else(Local::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::{FailPoint, MockDir};
    use crate::event_id::EventId;
    use base::clock::FakeClock;

    fn make_sink(
        clock: FakeClock,
        session_timeout_ms: i64,
        sync_every_records: u32,
        sync_every_millis: i64,
    ) -> (SessionBinningSink<MockDir>, MockDir) {
        let dir = MockDir::new();
        let sink = SessionBinningSink::new(
            dir.clone(),
            clock,
            SinkConfig {
                session_timeout_ms,
                sync_every_millis,
                sync_every_records,
                replication: 1,
            },
        );
        (sink, dir)
    }

    fn record(event_time: i64, session_ts: i64) -> AppendRecord {
        AppendRecord::new(event_time, EventId::generate_at(session_ts), vec![1, 2, 3])
    }

    #[test]
    fn round_assignment_creates_one_file_per_round() {
        let clock = FakeClock::new(0);
        let (mut sink, _dir) = make_sink(clock, 1000, 2, 10_000);
        sink.setup();

        sink.append(&record(0, 0)).unwrap();
        sink.append(&record(500, 500)).unwrap();
        sink.append(&record(1200, 1200)).unwrap();

        let mut rounds = sink.open_rounds();
        rounds.dedup();
        assert_eq!(rounds, vec![0, 1]);
    }

    #[test]
    fn multiple_stale_sessions_alias_into_the_same_clamped_round_file() {
        let clock = FakeClock::new(5000);
        let (mut sink, dir) = make_sink(clock, 1000, 1_000_000, 1_000_000);
        sink.setup();
        sink.heartbeat().unwrap(); // time_signal_ms = 5000, oldest_allowed_round = 3

        sink.append(&record(5000, 100)).unwrap(); // round 0, clamped to 3
        sink.append(&record(5000, 700)).unwrap(); // round 0 again, clamped to 3
        sink.append(&record(5000, 1999)).unwrap(); // round 1, clamped to 3

        let mut rounds = sink.open_rounds();
        rounds.sort_unstable();
        assert_eq!(rounds, vec![0, 1, 3]);
        assert_eq!(dir.create_call_count(), 1);
    }

    #[test]
    fn arbitrarily_old_record_clamps_to_oldest_allowed_round() {
        let clock = FakeClock::new(5000);
        let (mut sink, _dir) = make_sink(clock, 1000, 100, 100_000);
        sink.setup();

        // time_signal starts at 0 until the first append sets it; use a
        // heartbeat first so oldest_allowed_round reflects wall time 5000.
        sink.heartbeat().unwrap();
        assert_eq!(sink.oldest_allowed_round(), 5 - 2);

        sink.append(&record(5000, 100)).unwrap(); // requested round 0, no file open
        let mut rounds = sink.open_rounds();
        rounds.sort_unstable();
        assert_eq!(rounds, vec![0, 3]);
    }

    #[test]
    fn sync_triggers_on_record_count_threshold() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock, 1000, 2, 1_000_000);
        sink.setup();

        sink.append(&record(100, 100)).unwrap();
        sink.append(&record(100, 100)).unwrap();
        // One create + two hsyncs: the creation-time probe, plus the
        // threshold-triggered sync.
        assert_eq!(dir.hsync_call_count(), 2);
    }

    #[test]
    fn sync_triggers_on_age_threshold() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock.clone(), 1000, 1_000_000, 50);
        sink.setup();

        sink.append(&record(100, 100)).unwrap();
        assert_eq!(dir.hsync_call_count(), 1); // just the creation probe

        clock.advance(std::time::Duration::from_millis(60));
        sink.heartbeat().unwrap();
        assert_eq!(dir.hsync_call_count(), 2);
    }

    #[test]
    fn idle_heartbeat_resets_sync_age_so_the_next_record_does_not_spuriously_sync() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock.clone(), 1000, 1_000_000, 50);
        sink.setup();

        sink.append(&record(0, 0)).unwrap();
        assert_eq!(dir.hsync_call_count(), 1); // just the creation probe

        // File sits idle (records_since_last_sync == 0) well past the
        // sync-age threshold; each heartbeat should just bump
        // last_sync_time_ms forward rather than trigger a sync (there's
        // nothing to sync).
        clock.advance(std::time::Duration::from_millis(1000));
        sink.heartbeat().unwrap();
        assert_eq!(dir.hsync_call_count(), 1);

        // A record arriving shortly after that idle gap must not be judged
        // against the stale last_sync_time_ms from before the gap.
        clock.advance(std::time::Duration::from_millis(10));
        sink.append(&record(1010, 0)).unwrap();
        assert_eq!(dir.hsync_call_count(), 1);
    }

    #[test]
    fn ttl_closes_stale_round_files() {
        let clock = FakeClock::new(0);
        let (mut sink, _dir) = make_sink(clock.clone(), 1000, 1_000_000, 1_000_000);
        sink.setup();

        sink.append(&record(0, 0)).unwrap();
        assert_eq!(sink.open_rounds(), vec![0]);

        clock.set(5000);
        sink.append(&record(5000, 100)).unwrap();
        assert!(!sink.open_rounds().contains(&0));
    }

    #[test]
    fn late_record_aliases_into_the_smallest_open_round_above_requested() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock.clone(), 1000, 1_000_000, 1_000_000);
        sink.setup();

        sink.append(&record(0, 0)).unwrap(); // opens round 0
        sink.append(&record(10_000, 10_000)).unwrap(); // opens round 10

        // Advance wall clock and time_signal so oldest_allowed_round == 8;
        // round 0 (< 8) is now stale, round 10 (>= 8) stays open.
        clock.set(10_000);
        sink.heartbeat().unwrap();
        assert_eq!(sink.open_rounds(), vec![10]);
        assert_eq!(dir.create_call_count(), 2);

        // A late record whose own round (5) has already been closed, with
        // round 10 the only one still open, must alias into round 10 rather
        // than opening a brand-new round-8 file (spec.md §4.4 step 2; §8's
        // "session_id.timestamp = 5500" testable property).
        sink.append(&record(10_500, 5_000)).unwrap();

        let mut rounds = sink.open_rounds();
        rounds.sort_unstable();
        assert_eq!(rounds, vec![5, 10]);
        assert_eq!(dir.create_call_count(), 2, "no new file should be created");
    }

    #[test]
    fn create_failure_enters_broken_state_and_reconnects_after_delay() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock.clone(), 1000, 100, 100_000);
        sink.setup();

        dir.fail_once(FailPoint::Create);
        let outcome = sink.append(&record(0, 0)).unwrap();
        assert_eq!(outcome, Outcome::Failure);
        assert!(!sink.is_alive());
        assert_eq!(sink.failed_round(), Some(0));
        assert!(sink.open_rounds().is_empty());

        clock.advance(std::time::Duration::from_millis(5_000));
        assert_eq!(sink.heartbeat().unwrap(), Outcome::Failure);
        assert!(!sink.is_alive());

        clock.advance(std::time::Duration::from_millis(10_001));
        assert_eq!(sink.heartbeat().unwrap(), Outcome::Success);
        assert!(sink.is_alive());
        assert_eq!(sink.open_rounds(), vec![0]);
    }

    #[test]
    fn append_while_broken_is_a_programmer_error() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock, 1000, 100, 100_000);
        sink.setup();
        dir.fail_once(FailPoint::Create);
        sink.append(&record(0, 0)).unwrap();
        assert!(!sink.is_alive());

        let err = sink.append(&record(0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn durability_probe_failure_deletes_half_created_file() {
        let clock = FakeClock::new(0);
        let (mut sink, dir) = make_sink(clock, 1000, 100, 100_000);
        sink.setup();

        dir.fail_once(FailPoint::Hsync);
        let outcome = sink.append(&record(0, 0)).unwrap();
        assert_eq!(outcome, Outcome::Failure);
        assert_eq!(dir.create_call_count(), 1);
        assert_eq!(dir.deleted_count(), 1);
        assert!(!sink.is_alive());
    }

    #[test]
    fn cleanup_closes_every_distinct_file() {
        let clock = FakeClock::new(0);
        let (mut sink, _dir) = make_sink(clock, 1000, 1_000_000, 1_000_000);
        sink.setup();
        sink.append(&record(0, 0)).unwrap();
        sink.append(&record(1200, 1200)).unwrap();
        assert_eq!(sink.open_rounds(), vec![0, 1]);
        sink.cleanup();
        assert!(sink.open_rounds().is_empty());
    }
}
