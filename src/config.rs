// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration file.

use std::path::PathBuf;

use serde::Deserialize;

fn default_session_timeout_ms() -> i64 {
    1_800_000
}

fn default_sync_file_after_duration_ms() -> i64 {
    30_000
}

fn default_sync_file_after_records() -> u32 {
    1_000
}

fn default_replication() -> u32 {
    1
}

/// Top-level configuration file object (spec.md §6).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Directory the session-binning sink writes round files into.
    pub session_binning_dir: PathBuf,

    /// Session length and round width, in milliseconds.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: i64,

    /// Sync-age threshold, in milliseconds.
    #[serde(default = "default_sync_file_after_duration_ms")]
    pub sync_file_after_duration_ms: i64,

    /// Sync-count threshold.
    #[serde(default = "default_sync_file_after_records")]
    pub sync_file_after_records: u32,

    /// Replication factor passed through to the remote file system on create.
    #[serde(default = "default_replication")]
    pub replication: u32,
}

impl ConfigFile {
    pub fn load(path: &std::path::Path) -> Result<ConfigFile, base::Error> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            base::Error::with_source(base::ErrorKind::Config, format!("reading {path:?}"), e)
        })?;
        toml::from_str(&text)
            .map_err(|e| base::Error::with_source(base::ErrorKind::Config, format!("parsing {path:?}"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_fields() {
        let cfg: ConfigFile = toml::from_str(r#"sessionBinningDir = "/tmp/divolte""#).unwrap();
        assert_eq!(cfg.session_timeout_ms, 1_800_000);
        assert_eq!(cfg.sync_file_after_records, 1_000);
        assert_eq!(cfg.replication, 1);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg: ConfigFile = toml::from_str(
            r#"
            sessionBinningDir = "/tmp/divolte"
            sessionTimeoutMs = 60000
            syncFileAfterDurationMs = 5000
            syncFileAfterRecords = 10
            replication = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session_timeout_ms, 60_000);
        assert_eq!(cfg.sync_file_after_duration_ms, 5_000);
        assert_eq!(cfg.sync_file_after_records, 10);
        assert_eq!(cfg.replication, 3);
    }
}
