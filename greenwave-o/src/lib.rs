/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Greenwave-O – traffic-light grid orchestrator.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── proto/         – generated exchange.v1 gRPC types & stubs
//! ├── config/        – YAML topology loading and validation
//! ├── light          – light states, phase durations, orchestrator belief
//! ├── protocol/      – naming, status codec, typed commands
//! ├── transport/     – pull-based named exchange (in-memory, gRPC)
//! ├── rtt            – round-trip estimator
//! ├── metrics        – RTT sample sink
//! ├── arbiter/       – sync, priority, intersection and green-wave arbitration
//! ├── orchestrator   – runtime: cycle task, status polls, command handler
//! └── logging        – tracing subscriber set-up
//! ```
//!
//! The node side lives in the `greenwave-n` crate and reuses `config`,
//! `light`, `protocol`, `transport`, `rtt` and `metrics` from here.

pub mod arbiter;
pub mod config;
pub mod light;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod proto;
pub mod protocol;
pub mod rtt;
pub mod transport;
