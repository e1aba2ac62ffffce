/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Append-only RTT sample sink.
//!
//! One sample in milliseconds per line, so the file can be fed straight to
//! a plotting script.  Write failures are logged and otherwise ignored: a
//! full disk must never stall the exchange loop.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

#[derive(Debug, Default)]
pub struct RttSink {
    file: Option<File>,
}

impl RttSink {
    /// A sink that drops every sample.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Cannot open RTT log: {}", path.display()))?;
        Ok(Self { file: Some(file) })
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn record(&mut self, rtt_ms: u64) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{rtt_ms}") {
            warn!(error = %e, "Failed to write RTT sample, disabling sink");
            self.file = None;
        }
    }
}
