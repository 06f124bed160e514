// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Logic for setting up a `tracing` subscriber according to our
//! preferences. A simplified version of the teacher's `tracing_setup`:
//! this crate has no systemd integration to format for, so it installs a
//! plain, human-readable formatter with a local-time timestamp.

use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

struct ChronoTimer;

impl FormatTime for ChronoTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
        write!(w, "{}", chrono::Local::now().format(TIME_FORMAT))
    }
}

/// Installs a process-wide `tracing` subscriber. Respects `RUST_LOG`,
/// defaulting to `info` when unset.
pub fn install() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoTimer)
        .init();
}
