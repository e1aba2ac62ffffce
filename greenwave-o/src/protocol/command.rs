/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Typed command tokens.
//!
//! Commands stay typed from the arbiter to the node's interpreter; the
//! `type:value` text form exists only on the wire.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::ProtocolError;
use crate::light::LightState;

/// Value of a `set_time` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeValue {
    Millis(u64),
    /// Restore the configured default for the current phase.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetState(LightState),
    SetTime(TimeValue),
    SetCurrentTime(u64),
    SetGreenDuration(u64),
    SetRedDuration(u64),
    IncreaseTime(u64),
    DecreaseTime(u64),
    IncreaseGreenDuration(u64),
    DecreaseGreenDuration(u64),
    IncreaseRedDuration(u64),
    DecreaseRedDuration(u64),
    SetDefaultDuration,
    /// Gate: the rest of the message applies only in this state.
    IfState(LightState),
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::SetState(_) => "set_state",
            Command::SetTime(_) => "set_time",
            Command::SetCurrentTime(_) => "set_current_time",
            Command::SetGreenDuration(_) => "set_green_duration",
            Command::SetRedDuration(_) => "set_red_duration",
            Command::IncreaseTime(_) => "increase_time",
            Command::DecreaseTime(_) => "decrease_time",
            Command::IncreaseGreenDuration(_) => "increase_green_duration",
            Command::DecreaseGreenDuration(_) => "decrease_green_duration",
            Command::IncreaseRedDuration(_) => "increase_red_duration",
            Command::DecreaseRedDuration(_) => "decrease_red_duration",
            Command::SetDefaultDuration => "set_default_duration",
            Command::IfState(_) => "if_state",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Command::SetState(s) | Command::IfState(s) => write!(f, "{kind}:{s}"),
            Command::SetTime(TimeValue::Millis(ms)) => write!(f, "{kind}:{ms}"),
            Command::SetTime(TimeValue::Default) => write!(f, "{kind}:DEFAULT"),
            Command::SetDefaultDuration => f.write_str(kind),
            Command::SetCurrentTime(ms)
            | Command::SetGreenDuration(ms)
            | Command::SetRedDuration(ms)
            | Command::IncreaseTime(ms)
            | Command::DecreaseTime(ms)
            | Command::IncreaseGreenDuration(ms)
            | Command::DecreaseGreenDuration(ms)
            | Command::IncreaseRedDuration(ms)
            | Command::DecreaseRedDuration(ms) => write!(f, "{kind}:{ms}"),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let (kind, value) = match token.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (token, ""),
        };

        let malformed = || ProtocolError::MalformedToken {
            token: token.to_string(),
        };
        let millis = || value.parse::<u64>().map_err(|_| malformed());
        let state = || {
            value
                .parse::<LightState>()
                .ok()
                .filter(|s| *s != LightState::Unknown)
                .ok_or_else(malformed)
        };

        Ok(match kind {
            "set_state" => Command::SetState(state()?),
            "if_state" => Command::IfState(state()?),
            "set_time" if value == "DEFAULT" => Command::SetTime(TimeValue::Default),
            "set_time" => Command::SetTime(TimeValue::Millis(millis()?)),
            "set_current_time" => Command::SetCurrentTime(millis()?),
            "set_green_duration" => Command::SetGreenDuration(millis()?),
            "set_red_duration" => Command::SetRedDuration(millis()?),
            "increase_time" => Command::IncreaseTime(millis()?),
            "decrease_time" => Command::DecreaseTime(millis()?),
            "increase_green_duration" => Command::IncreaseGreenDuration(millis()?),
            "decrease_green_duration" => Command::DecreaseGreenDuration(millis()?),
            "increase_red_duration" => Command::IncreaseRedDuration(millis()?),
            "decrease_red_duration" => Command::DecreaseRedDuration(millis()?),
            "set_default_duration" => Command::SetDefaultDuration,
            other => {
                return Err(ProtocolError::UnknownCommand {
                    kind: other.to_string(),
                })
            }
        })
    }
}

/// Parses a `;`-joined command payload.  Empty segments (including a
/// leading `;`) are ignored; malformed or unknown tokens are skipped.
pub fn parse(payload: &str) -> Vec<Command> {
    payload
        .split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter_map(|t| match t.parse::<Command>() {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                debug!(token = t, error = %e, "Skipping command token");
                None
            }
        })
        .collect()
}

/// Serialises a batch as `;tok;tok...`, or `""` for an empty batch.
pub fn encode(commands: &[Command]) -> String {
    commands.iter().map(|c| format!(";{c}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_applies_order_and_ignores_leading_separator() {
        let cmds = parse(";set_state:RED;set_current_time:9900");
        assert_eq!(
            cmds,
            vec![
                Command::SetState(LightState::Red),
                Command::SetCurrentTime(9_900)
            ]
        );
    }

    #[test]
    fn parse_skips_unknown_and_malformed_tokens() {
        let cmds = parse("blink:3;set_time:abc;set_state:BLUE;increase_time:500");
        assert_eq!(cmds, vec![Command::IncreaseTime(500)]);
    }

    #[test]
    fn parse_accepts_valueless_default_duration() {
        let cmds = parse("set_default_duration;set_state:RED;set_current_time:15000");
        assert_eq!(cmds[0], Command::SetDefaultDuration);
        assert_eq!(parse("set_default_duration:")[0], Command::SetDefaultDuration);
    }

    #[test]
    fn parse_set_time_default() {
        assert_eq!(
            parse("set_time:DEFAULT"),
            vec![Command::SetTime(TimeValue::Default)]
        );
    }

    #[test]
    fn unknown_state_is_not_commandable() {
        assert!(parse("set_state:UNKNOWN").is_empty());
    }

    #[test]
    fn empty_payload_parses_to_nothing() {
        assert!(parse("").is_empty());
        assert!(parse(" ; ;").is_empty());
    }

    #[test]
    fn encode_matches_wire_form() {
        let batch = [
            Command::IfState(LightState::Red),
            Command::SetState(LightState::Green),
            Command::SetCurrentTime(12_000),
            Command::SetDefaultDuration,
        ];
        let wire = encode(&batch);
        assert_eq!(
            wire,
            ";if_state:RED;set_state:GREEN;set_current_time:12000;set_default_duration"
        );
        assert_eq!(parse(&wire), batch.to_vec());
        assert_eq!(encode(&[]), "");
    }
}
