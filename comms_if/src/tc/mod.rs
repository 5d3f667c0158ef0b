//! # Telecommand module
//!
//! Operator commands for a collection run. The same `Tc` is produced by three sources: single
//! key presses (`Tc::from_key`), full command lines typed into the console (`Tc::from_line`),
//! and timed JSON entries in a collection script (`Tc::from_json`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use structopt::StructOpt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command issued by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(rename_all = "snake_case")]
#[structopt(name = "lc", about = "Lane-change collection commands")]
pub enum Tc {
    /// Hand the vehicle over to manual driving [m]
    #[structopt(name = "autopilot-off")]
    AutopilotOff,

    /// Hand the vehicle back to the autopilot, ending any lane change [o]
    #[structopt(name = "autopilot-on")]
    AutopilotOn,

    /// Mark the start of a left lane change in the image metadata [l]
    #[structopt(name = "lc-left")]
    LaneChangeLeft,

    /// Mark the start of a right lane change in the image metadata [r]
    #[structopt(name = "lc-right")]
    LaneChangeRight,

    /// Mark the second half of the current lane change [s]
    #[structopt(name = "second-half")]
    SecondHalf,

    /// Clear all lane change markers [q]
    #[structopt(name = "lc-over")]
    LaneChangeOver,

    /// Start recording camera frames [c]
    #[structopt(name = "collect-start")]
    CollectStart,

    /// Pause recording camera frames [p]
    #[structopt(name = "collect-pause")]
    CollectPause,

    /// Plan a left lane change and steer it with the polyline controller [a]
    #[structopt(name = "force-left")]
    ForceLeft,

    /// Plan a right lane change and steer it with the polyline controller [d]
    #[structopt(name = "force-right")]
    ForceRight,

    /// Spawn a static obstacle 30 m ahead of the vehicle [t]
    #[structopt(name = "spawn-obstacle")]
    SpawnObstacle,

    /// Destroy the static obstacle [u]
    #[structopt(name = "destroy-obstacle")]
    DestroyObstacle,

    /// Move the vehicle to the waypoint 10 m ahead [g]
    #[structopt(name = "teleport")]
    Teleport,

    /// Log the location 1 m ahead of the vehicle [b]
    #[structopt(name = "print-next")]
    PrintNext,

    /// Set the held manual driving keys, used while the autopilot is off
    #[structopt(name = "drive")]
    Drive(DriveKeys),

    /// End the collection run [Esc]
    #[structopt(name = "quit")]
    Quit,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("'{0}' is not a recognised command key")]
    UnknownKey(char),

    #[error("The command line is empty")]
    Empty
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The manual driving keys which are currently held down.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize, StructOpt)]
#[serde(default)]
pub struct DriveKeys {
    /// Accelerate (up arrow)
    #[structopt(long)]
    pub throttle: bool,

    /// Brake (down arrow)
    #[structopt(long)]
    pub brake: bool,

    /// Steer left (left arrow)
    #[structopt(long)]
    pub left: bool,

    /// Steer right (right arrow)
    #[structopt(long)]
    pub right: bool,

    /// Apply the hand brake (space)
    #[structopt(long)]
    pub hand_brake: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {

    /// Parse a new TC from a JSON packet, for example `"force_left"` or
    /// `{"drive": {"throttle": true}}`.
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)
    }

    /// Map a single key press onto its command.
    pub fn from_key(key: char) -> Result<Self, TcParseError> {
        match key {
            'm' => Ok(Tc::AutopilotOff),
            'o' => Ok(Tc::AutopilotOn),
            'l' => Ok(Tc::LaneChangeLeft),
            'r' => Ok(Tc::LaneChangeRight),
            's' => Ok(Tc::SecondHalf),
            'q' => Ok(Tc::LaneChangeOver),
            'c' => Ok(Tc::CollectStart),
            'p' => Ok(Tc::CollectPause),
            'a' => Ok(Tc::ForceLeft),
            'd' => Ok(Tc::ForceRight),
            't' => Ok(Tc::SpawnObstacle),
            'u' => Ok(Tc::DestroyObstacle),
            'g' => Ok(Tc::Teleport),
            'b' => Ok(Tc::PrintNext),
            '\u{1b}' => Ok(Tc::Quit),
            k => Err(TcParseError::UnknownKey(k))
        }
    }

    /// Parse a console line. A single character is treated as a key press, anything else as a
    /// full command such as `drive --throttle --left`.
    pub fn from_line(line: &str) -> Result<Self, TcParseError> {
        let line = line.trim();

        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Err(TcParseError::Empty),
            (Some(k), None) => Self::from_key(k),
            _ => Tc::from_iter_safe(
                std::iter::once("lc").chain(line.split_whitespace())
            ).map_err(|e| TcParseError::InvalidCommand(e.message))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_key() {
        assert_eq!(Tc::from_key('a').unwrap(), Tc::ForceLeft);
        assert_eq!(Tc::from_key('d').unwrap(), Tc::ForceRight);
        assert_eq!(Tc::from_key('q').unwrap(), Tc::LaneChangeOver);
        assert!(matches!(Tc::from_key('z'), Err(TcParseError::UnknownKey('z'))));
    }

    #[test]
    fn test_from_line() {
        assert_eq!(Tc::from_line(" c \n").unwrap(), Tc::CollectStart);
        assert_eq!(Tc::from_line("force-right").unwrap(), Tc::ForceRight);
        assert_eq!(
            Tc::from_line("drive --throttle --left").unwrap(),
            Tc::Drive(DriveKeys { throttle: true, left: true, ..Default::default() })
        );
        assert!(matches!(Tc::from_line("   "), Err(TcParseError::Empty)));
        assert!(matches!(
            Tc::from_line("fly-away"),
            Err(TcParseError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Tc::from_json("\"spawn_obstacle\"").unwrap(), Tc::SpawnObstacle);
        assert_eq!(
            Tc::from_json(r#"{"drive": {"brake": true}}"#).unwrap(),
            Tc::Drive(DriveKeys { brake: true, ..Default::default() })
        );
        assert!(matches!(Tc::from_json("\"warp\""), Err(TcParseError::InvalidJson(_))));
    }
}
