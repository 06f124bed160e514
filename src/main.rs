// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use base::clock::RealClock;
use bpaf::Bpaf;
use divolte_core::dir::LocalDir;
use divolte_core::{run_driver, AppendRecord, DriverCommand, EventId, SessionBinningSink, SinkConfig};
use tracing::info;

mod config;
mod logging;

use config::ConfigFile;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Divolte Collector: clickstream event collection server.
#[derive(Bpaf, Debug)]
#[bpaf(options, version(VERSION))]
struct Args {
    /// Path to the configuration file.
    #[bpaf(long, short, argument("PATH"), fallback("/etc/divolte-collector.toml".into()))]
    config: PathBuf,
}

fn main() {
    logging::install();

    let args = args().run();
    let cfg = match ConfigFile::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", args.config.display(), e.chain());
            std::process::exit(1);
        }
    };

    let dir = LocalDir::new(cfg.session_binning_dir.clone());
    let mut sink = SessionBinningSink::new(
        dir,
        RealClock,
        SinkConfig {
            session_timeout_ms: cfg.session_timeout_ms,
            sync_every_millis: cfg.sync_file_after_duration_ms,
            sync_every_records: cfg.sync_file_after_records,
            replication: cfg.replication,
        },
    );

    // HTTP ingestion, schema mapping, and the Kafka sink are out of scope
    // here: this channel is a stand-in demonstrating that the driver loop
    // and the sink wire together end to end.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for i in 0..10u8 {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64;
            let record = AppendRecord::new(now, EventId::generate_at(now), vec![i]);
            if tx.send(DriverCommand::Append(record)).is_err() {
                return;
            }
        }
        let _ = tx.send(DriverCommand::Shutdown);
    });

    info!(config = %args.config.display(), "starting session-binning sink");
    run_driver(&mut sink, &rx);
}
