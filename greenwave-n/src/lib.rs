/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Greenwave-N – one traffic-light node.
//!
//! ```text
//! lib.rs
//! ├── peer/      – phase cycle, synthetic load, command interpreter
//! └── node       – runtime: phase task, command polls, status handler
//! ```

pub mod node;
pub mod peer;

use thiserror::Error;

use greenwave_o::config::{LightConfig, TopologyConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("either a light name or an index is required")]
    Missing,

    #[error("no traffic light named '{0}' in the topology")]
    UnknownName(String),

    #[error("light index {index} out of range, topology has {count} lights")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Picks the light this node runs, by name or by position in the file.
/// A name takes precedence over an index.
pub fn select_light<'a>(
    topology: &'a TopologyConfig,
    name: Option<&str>,
    index: Option<usize>,
) -> Result<&'a LightConfig, SelectionError> {
    match (name, index) {
        (Some(name), _) => topology
            .light(name)
            .ok_or_else(|| SelectionError::UnknownName(name.to_string())),
        (None, Some(index)) => {
            topology
                .light_by_index(index)
                .ok_or(SelectionError::IndexOutOfRange {
                    index,
                    count: topology.lights.len(),
                })
        }
        (None, None) => Err(SelectionError::Missing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &str = r#"
traffic-lights:
  - { name: /tl/1, state: RED, cycle_time: 30 }
  - { name: /tl/2, state: GREEN, cycle_time: 30 }
"#;

    #[test]
    fn selects_by_name_or_index() {
        let topo = TopologyConfig::from_yaml_str(TWO).unwrap();
        assert_eq!(select_light(&topo, Some("tl/2"), None).unwrap().name, "/tl/2");
        assert_eq!(select_light(&topo, None, Some(0)).unwrap().name, "/tl/1");
    }

    #[test]
    fn selection_errors() {
        let topo = TopologyConfig::from_yaml_str(TWO).unwrap();
        assert_eq!(
            select_light(&topo, Some("/tl/9"), None).unwrap_err(),
            SelectionError::UnknownName("/tl/9".into())
        );
        assert_eq!(
            select_light(&topo, None, Some(2)).unwrap_err(),
            SelectionError::IndexOutOfRange { index: 2, count: 2 }
        );
        assert_eq!(select_light(&topo, None, None).unwrap_err(), SelectionError::Missing);
    }
}
