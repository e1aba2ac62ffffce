/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Grid topology loading and validation.
//!
//! One YAML file describes the whole deployment and is read by both the
//! orchestrator and every node:
//! ```yaml
//! orchestrator:
//!   prefix: /central
//!   address: 127.0.0.1:7000
//! timing:
//!   poll_interval_ms: 1000
//! traffic-lights:
//!   - name: /tl/1
//!     state: GREEN
//!     cycle_time: 30
//!     columns: 2
//!     lines: 5
//!     intensity: MEDIUM
//!     address: 127.0.0.1:7001
//! intersections:
//!   - name: main-cross
//!     traffic-lights: [/tl/1, /tl/2]
//! green_waves:
//!   - name: avenue
//!     traffic_lights: [/tl/3, /tl/4, /tl/5]
//!     travel_time_ms: 5000
//! sync_groups:
//!   - name: twins
//!     traffic_lights: [/tl/6, /tl/7]
//! ```
//!
//! The loaded [`TopologyConfig`] is an immutable snapshot; nothing reloads it
//! during a run.

mod error;

pub use error::ConfigError;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::light::{LightState, PhaseDurations};
use crate::protocol::normalize_name;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Maps directly onto the YAML file layout.  Callers only ever see
/// [`TopologyConfig`].
#[derive(Debug, Deserialize)]
struct TopologyFile {
    #[serde(default)]
    orchestrator: OrchestratorEntry,
    #[serde(default)]
    timing: TimingConfig,
    #[serde(rename = "traffic-lights", default)]
    traffic_lights: Vec<LightEntry>,
    #[serde(default)]
    intersections: Vec<IntersectionEntry>,
    #[serde(default)]
    green_waves: Vec<GreenWaveEntry>,
    #[serde(default)]
    sync_groups: Vec<SyncGroupEntry>,
}

#[derive(Debug, Deserialize)]
struct OrchestratorEntry {
    #[serde(default = "default_prefix")]
    prefix: String,
    #[serde(default = "default_orchestrator_address")]
    address: String,
}

impl Default for OrchestratorEntry {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            address: default_orchestrator_address(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LightEntry {
    name: String,
    state: String,
    cycle_time: u32,
    #[serde(default)]
    columns: u32,
    #[serde(default)]
    lines: u32,
    intensity: Option<String>,
    #[serde(default)]
    green_bonus: f64,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntersectionEntry {
    name: String,
    #[serde(rename = "traffic-lights", default)]
    traffic_lights: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GreenWaveEntry {
    name: String,
    #[serde(default)]
    traffic_lights: Vec<String>,
    travel_time_ms: u64,
}

#[derive(Debug, Deserialize)]
struct SyncGroupEntry {
    name: String,
    #[serde(default)]
    traffic_lights: Vec<String>,
}

fn default_prefix() -> String {
    String::from("/central")
}

fn default_orchestrator_address() -> String {
    String::from("127.0.0.1:7000")
}

// ── Timing ────────────────────────────────────────────────────────────────────

/// Cadences and fault thresholds.  Every field is optional in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimingConfig {
    /// Status-poll and command-poll cadence; also the arbitration tick.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub status_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub command_timeout_ms: u64,
    /// UNKNOWN lights are polled only on every n-th cycle.
    #[serde(default = "default_unknown_probe_every")]
    pub unknown_probe_every: u64,
    #[serde(default = "default_timeouts_to_unknown")]
    pub timeouts_to_unknown: u32,
    #[serde(default = "default_peer_alert_after_timeouts")]
    pub peer_alert_after_timeouts: u32,
    /// Consecutive all-RED ticks an intersection tolerates.
    #[serde(default = "default_watchdog_cycles")]
    pub watchdog_cycles: u32,
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_timeout_ms() -> u64 {
    2_000
}
fn default_unknown_probe_every() -> u64 {
    5
}
fn default_timeouts_to_unknown() -> u32 {
    2
}
fn default_peer_alert_after_timeouts() -> u32 {
    3
}
fn default_watchdog_cycles() -> u32 {
    5
}
fn default_dedup_window_ms() -> u64 {
    4_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_timeout_ms: default_timeout_ms(),
            command_timeout_ms: default_timeout_ms(),
            unknown_probe_every: default_unknown_probe_every(),
            timeouts_to_unknown: default_timeouts_to_unknown(),
            peer_alert_after_timeouts: default_peer_alert_after_timeouts(),
            watchdog_cycles: default_watchdog_cycles(),
            dedup_window_ms: default_dedup_window_ms(),
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    /// Every field except `dedup_window_ms` must be non-zero; a zero
    /// window simply disables de-duplication.
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("status_timeout_ms", self.status_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("unknown_probe_every", self.unknown_probe_every),
            ("timeouts_to_unknown", u64::from(self.timeouts_to_unknown)),
            ("peer_alert_after_timeouts", u64::from(self.peer_alert_after_timeouts)),
            ("watchdog_cycles", u64::from(self.watchdog_cycles)),
        ];
        match fields.iter().find(|&&(_, v)| v == 0) {
            Some(&(field, _)) => Err(ConfigError::ZeroTiming { field }),
            None => Ok(()),
        }
    }
}

// ── Public data structures ────────────────────────────────────────────────────

/// Synthetic traffic intensity class of a light's approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intensity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Intensity {
    /// Arrival weight: a vehicle arrives when a draw in `1..=10` is below it.
    pub fn weight(self) -> u32 {
        match self {
            Intensity::None => 1,
            Intensity::Low => 2,
            Intensity::Medium => 5,
            Intensity::High => 8,
        }
    }

    /// Unrecognised spellings fall back to `None` (lightest load).
    fn parse_lenient(light: &str, s: &str) -> Self {
        match s.trim() {
            "NONE" => Intensity::None,
            "LOW" => Intensity::Low,
            "MEDIUM" => Intensity::Medium,
            "HIGH" => Intensity::High,
            other => {
                warn!(light, intensity = other, "Unknown intensity, using NONE");
                Intensity::None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Name prefix the orchestrator registers `<prefix>/command` under.
    pub prefix: String,
    /// Socket address the gRPC transport listens on.
    pub address: String,
}

/// One physical signal as declared in YAML.
#[derive(Debug, Clone)]
pub struct LightConfig {
    pub name: String,
    pub initial_state: LightState,
    pub cycle_time_s: u32,
    pub durations: PhaseDurations,
    pub columns: u32,
    pub lines: u32,
    pub intensity: Intensity,
    /// Extra priority reported while GREEN.
    pub green_bonus: f64,
    /// Socket address the node answers status polls on (gRPC only).
    pub address: Option<String>,
}

impl LightConfig {
    /// Queue capacity: one slot per lane per line.
    pub fn capacity(&self) -> u32 {
        self.columns.saturating_mul(self.lines)
    }
}

#[derive(Debug, Clone)]
pub struct IntersectionConfig {
    pub name: String,
    pub members: [String; 2],
}

#[derive(Debug, Clone)]
pub struct GreenWaveConfig {
    pub name: String,
    /// Ordered; the first member leads.
    pub members: Vec<String>,
    pub travel_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SyncGroupConfig {
    pub name: String,
    /// Ordered; the first member leads.
    pub members: Vec<String>,
}

// ── TopologyConfig ────────────────────────────────────────────────────────────

/// Validated, immutable view of the grid.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    pub orchestrator: OrchestratorConfig,
    pub timing: TimingConfig,
    pub lights: Vec<LightConfig>,
    pub intersections: Vec<IntersectionConfig>,
    pub green_waves: Vec<GreenWaveConfig>,
    pub sync_groups: Vec<SyncGroupConfig>,
}

impl TopologyConfig {
    /// Reads, parses and validates the topology at `path`.
    ///
    /// # Errors
    /// I/O and YAML syntax errors carry the file path as context; semantic
    /// problems surface as a [`ConfigError`] inside the returned error.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading topology from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open topology file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid topology file: {}", path.display()))
    }

    /// Parses and validates a topology from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: TopologyFile =
            serde_yaml::from_str(content).context("Failed to parse topology YAML")?;
        let topology = Self::build(file)?;

        info!(
            lights = topology.lights.len(),
            intersections = topology.intersections.len(),
            green_waves = topology.green_waves.len(),
            sync_groups = topology.sync_groups.len(),
            "Topology loaded"
        );
        Ok(topology)
    }

    fn build(file: TopologyFile) -> Result<Self, ConfigError> {
        file.timing.validate()?;
        if file.traffic_lights.is_empty() {
            return Err(ConfigError::NoLights);
        }

        let mut lights = Vec::with_capacity(file.traffic_lights.len());
        let mut seen = HashSet::new();
        for entry in file.traffic_lights {
            let name = normalize_name(&entry.name);
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateLight { light: name });
            }

            let initial_state = match entry.state.parse::<LightState>() {
                Ok(LightState::Unknown) | Err(_) => {
                    return Err(ConfigError::UnknownState {
                        light: name,
                        state: entry.state,
                    })
                }
                Ok(state) => state,
            };

            let durations = PhaseDurations::from_cycle_secs(entry.cycle_time).ok_or(
                ConfigError::CycleTooShort {
                    light: name.clone(),
                    cycle_time: entry.cycle_time,
                },
            )?;

            let intensity = entry
                .intensity
                .as_deref()
                .map(|s| Intensity::parse_lenient(&name, s))
                .unwrap_or_default();

            debug!(
                "  Light: {} | state: {} | cycle: {}s | grid: {}x{} | intensity: {:?}",
                name, initial_state, entry.cycle_time, entry.columns, entry.lines, intensity
            );

            lights.push(LightConfig {
                name,
                initial_state,
                cycle_time_s: entry.cycle_time,
                durations,
                columns: entry.columns,
                lines: entry.lines,
                intensity,
                green_bonus: entry.green_bonus,
                address: entry.address,
            });
        }

        // Intersections: exactly two members, each light in at most one.
        let mut owner: HashMap<String, String> = HashMap::new();
        let mut intersections = Vec::with_capacity(file.intersections.len());
        for entry in file.intersections {
            let members = resolve_members("intersection", &entry.name, &entry.traffic_lights, &seen)?;
            let [a, b]: [String; 2] =
                members
                    .try_into()
                    .map_err(|m: Vec<String>| ConfigError::IntersectionArity {
                        intersection: entry.name.clone(),
                        count: m.len(),
                    })?;
            for light in [&a, &b] {
                if let Some(first) = owner.insert(light.clone(), entry.name.clone()) {
                    return Err(ConfigError::SharedIntersectionMember {
                        light: light.clone(),
                        first,
                        second: entry.name,
                    });
                }
            }
            intersections.push(IntersectionConfig {
                name: entry.name,
                members: [a, b],
            });
        }

        let mut green_waves = Vec::with_capacity(file.green_waves.len());
        for entry in file.green_waves {
            let members = resolve_members("green wave", &entry.name, &entry.traffic_lights, &seen)?;
            check_group_size("green wave", &entry.name, &members)?;
            green_waves.push(GreenWaveConfig {
                name: entry.name,
                members,
                travel_time_ms: entry.travel_time_ms,
            });
        }

        let mut sync_groups = Vec::with_capacity(file.sync_groups.len());
        for entry in file.sync_groups {
            let members = resolve_members("sync group", &entry.name, &entry.traffic_lights, &seen)?;
            check_group_size("sync group", &entry.name, &members)?;
            sync_groups.push(SyncGroupConfig {
                name: entry.name,
                members,
            });
        }

        Ok(Self {
            orchestrator: OrchestratorConfig {
                prefix: normalize_name(&file.orchestrator.prefix),
                address: file.orchestrator.address,
            },
            timing: file.timing,
            lights,
            intersections,
            green_waves,
            sync_groups,
        })
    }

    /// Looks up a light by name (leading `/` optional).
    pub fn light(&self, name: &str) -> Option<&LightConfig> {
        let name = normalize_name(name);
        self.lights.iter().find(|l| l.name == name)
    }

    /// Looks up a light by its position in the file.
    pub fn light_by_index(&self, index: usize) -> Option<&LightConfig> {
        self.lights.get(index)
    }
}

fn resolve_members(
    kind: &'static str,
    group: &str,
    names: &[String],
    declared: &HashSet<String>,
) -> Result<Vec<String>, ConfigError> {
    names
        .iter()
        .map(|raw| {
            let light = normalize_name(raw);
            if declared.contains(&light) {
                Ok(light)
            } else {
                Err(ConfigError::UnknownMember {
                    kind,
                    group: group.to_string(),
                    light,
                })
            }
        })
        .collect()
}

fn check_group_size(kind: &'static str, group: &str, members: &[String]) -> Result<(), ConfigError> {
    if members.len() < 2 {
        return Err(ConfigError::GroupTooSmall {
            kind,
            group: group.to_string(),
            count: members.len(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn config_error(yaml: &str) -> ConfigError {
        let err = TopologyConfig::from_yaml_str(yaml).unwrap_err();
        err.downcast_ref::<ConfigError>()
            .cloned()
            .unwrap_or_else(|| panic!("expected ConfigError, got {err:#}"))
    }

    const GRID: &str = r#"
orchestrator:
  prefix: /central
  address: 127.0.0.1:7100
timing:
  poll_interval_ms: 500
traffic-lights:
  - name: /tl/1
    state: GREEN
    cycle_time: 30
    columns: 2
    lines: 5
    intensity: MEDIUM
    address: 127.0.0.1:7101
  - name: tl/2
    state: RED
    cycle_time: 30
  - name: /tl/3
    state: RED
    cycle_time: 40
    intensity: HIGH
  - name: /tl/4
    state: YELLOW
    cycle_time: 40
intersections:
  - name: main-cross
    traffic-lights: [/tl/1, /tl/2]
green_waves:
  - name: avenue
    traffic_lights: [/tl/3, /tl/4]
    travel_time_ms: 5000
sync_groups:
  - name: twins
    traffic_lights: [/tl/3, /tl/4]
"#;

    // ── load_from_file ────────────────────────────────────────────────────────

    #[test]
    fn load_example_yaml() {
        let f = yaml_tempfile(GRID);
        let topo = TopologyConfig::load_from_file(f.path()).unwrap();

        assert_eq!(topo.orchestrator.prefix, "/central");
        assert_eq!(topo.orchestrator.address, "127.0.0.1:7100");
        assert_eq!(topo.lights.len(), 4);

        let l1 = topo.light("/tl/1").unwrap();
        assert_eq!(l1.initial_state, LightState::Green);
        assert_eq!(l1.durations.green_ms, 12_000);
        assert_eq!(l1.capacity(), 10);
        assert_eq!(l1.intensity, Intensity::Medium);
        assert_eq!(l1.address.as_deref(), Some("127.0.0.1:7101"));

        assert_eq!(topo.intersections[0].members, ["/tl/1".to_string(), "/tl/2".to_string()]);
        assert_eq!(topo.green_waves[0].travel_time_ms, 5_000);
        assert_eq!(topo.sync_groups[0].members.len(), 2);
    }

    #[test]
    fn names_get_leading_slash() {
        let topo = TopologyConfig::from_yaml_str(GRID).unwrap();
        assert!(topo.light("/tl/2").is_some());
        assert!(topo.light("tl/2").is_some());
    }

    #[test]
    fn timing_defaults_fill_missing_fields() {
        let topo = TopologyConfig::from_yaml_str(GRID).unwrap();
        assert_eq!(topo.timing.poll_interval_ms, 500);
        assert_eq!(topo.timing.status_timeout_ms, 2_000);
        assert_eq!(topo.timing.unknown_probe_every, 5);
        assert_eq!(topo.timing.timeouts_to_unknown, 2);
        assert_eq!(topo.timing.watchdog_cycles, 5);
    }

    #[test]
    fn orchestrator_section_is_optional() {
        let topo = TopologyConfig::from_yaml_str(
            "traffic-lights:\n  - name: /a\n    state: RED\n    cycle_time: 20\n",
        )
        .unwrap();
        assert_eq!(topo.orchestrator.prefix, "/central");
        assert_eq!(topo.timing, TimingConfig::default());
    }

    #[test]
    fn unknown_intensity_falls_back_to_none() {
        let topo = TopologyConfig::from_yaml_str(
            "traffic-lights:\n  - name: /a\n    state: RED\n    cycle_time: 20\n    intensity: RUSH\n",
        )
        .unwrap();
        assert_eq!(topo.lights[0].intensity, Intensity::None);
    }

    #[test]
    fn light_by_index_follows_file_order() {
        let topo = TopologyConfig::from_yaml_str(GRID).unwrap();
        assert_eq!(topo.light_by_index(2).unwrap().name, "/tl/3");
        assert!(topo.light_by_index(9).is_none());
    }

    #[test]
    fn missing_file_returns_error() {
        let result = TopologyConfig::load_from_file(Path::new("/nonexistent/topology.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("traffic-lights: [[[broken");
        assert!(TopologyConfig::load_from_file(f.path()).is_err());
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn empty_topology_rejected() {
        assert_eq!(config_error("traffic-lights: []\n"), ConfigError::NoLights);
    }

    #[test]
    fn zero_timing_values_rejected() {
        for field in [
            "poll_interval_ms",
            "status_timeout_ms",
            "command_timeout_ms",
            "unknown_probe_every",
            "timeouts_to_unknown",
            "peer_alert_after_timeouts",
            "watchdog_cycles",
        ] {
            let yaml = format!(
                "timing:\n  {field}: 0\ntraffic-lights:\n  - {{ name: /a, state: RED, cycle_time: 20 }}\n"
            );
            assert_eq!(config_error(&yaml), ConfigError::ZeroTiming { field });
        }
    }

    #[test]
    fn zero_dedup_window_is_allowed() {
        let yaml = "timing:\n  dedup_window_ms: 0\ntraffic-lights:\n  - { name: /a, state: RED, cycle_time: 20 }\n";
        assert!(TopologyConfig::from_yaml_str(yaml).is_ok());
    }

    #[test]
    fn duplicate_light_rejected() {
        let yaml = r#"
traffic-lights:
  - { name: /a, state: RED, cycle_time: 20 }
  - { name: a, state: GREEN, cycle_time: 20 }
"#;
        assert_eq!(
            config_error(yaml),
            ConfigError::DuplicateLight { light: "/a".into() }
        );
    }

    #[test]
    fn bad_state_rejected() {
        let yaml = "traffic-lights:\n  - { name: /a, state: BLUE, cycle_time: 20 }\n";
        assert!(matches!(config_error(yaml), ConfigError::UnknownState { .. }));
        let yaml = "traffic-lights:\n  - { name: /a, state: UNKNOWN, cycle_time: 20 }\n";
        assert!(matches!(config_error(yaml), ConfigError::UnknownState { .. }));
    }

    #[test]
    fn short_cycle_rejected() {
        let yaml = "traffic-lights:\n  - { name: /a, state: RED, cycle_time: 6 }\n";
        assert_eq!(
            config_error(yaml),
            ConfigError::CycleTooShort { light: "/a".into(), cycle_time: 6 }
        );
    }

    #[test]
    fn intersection_needs_exactly_two() {
        let yaml = r#"
traffic-lights:
  - { name: /a, state: RED, cycle_time: 20 }
  - { name: /b, state: RED, cycle_time: 20 }
  - { name: /c, state: RED, cycle_time: 20 }
intersections:
  - name: x
    traffic-lights: [/a, /b, /c]
"#;
        assert_eq!(
            config_error(yaml),
            ConfigError::IntersectionArity { intersection: "x".into(), count: 3 }
        );
    }

    #[test]
    fn light_in_two_intersections_rejected() {
        let yaml = r#"
traffic-lights:
  - { name: /a, state: RED, cycle_time: 20 }
  - { name: /b, state: RED, cycle_time: 20 }
  - { name: /c, state: RED, cycle_time: 20 }
intersections:
  - name: x
    traffic-lights: [/a, /b]
  - name: y
    traffic-lights: [/b, /c]
"#;
        assert_eq!(
            config_error(yaml),
            ConfigError::SharedIntersectionMember {
                light: "/b".into(),
                first: "x".into(),
                second: "y".into(),
            }
        );
    }

    #[test]
    fn single_member_wave_rejected() {
        let yaml = r#"
traffic-lights:
  - { name: /a, state: RED, cycle_time: 20 }
green_waves:
  - name: w
    traffic_lights: [/a]
    travel_time_ms: 1000
"#;
        assert!(matches!(
            config_error(yaml),
            ConfigError::GroupTooSmall { kind: "green wave", count: 1, .. }
        ));
    }

    #[test]
    fn undeclared_sync_member_rejected() {
        let yaml = r#"
traffic-lights:
  - { name: /a, state: RED, cycle_time: 20 }
sync_groups:
  - name: s
    traffic_lights: [/a, /ghost]
"#;
        assert_eq!(
            config_error(yaml),
            ConfigError::UnknownMember {
                kind: "sync group",
                group: "s".into(),
                light: "/ghost".into(),
            }
        );
    }
}
