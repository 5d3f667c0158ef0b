//! # Collection script interpreter module
//!
//! This module provides an interpreter for collection scripts, allowing a run to be driven
//! without an operator. A script is a list of `time: tc;` entries where `time` is the simulated
//! time in seconds at which the command is due and `tc` is the command in JSON, for example:
//!
//! ```text
//! # Start recording once the vehicle is moving
//! 2.0: "collect_start";
//! 10.5: "force_left";
//! 30.0: "quit";
//! ```
//!
//! Lines starting with `#` are comments.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::RegexBuilder;
use thiserror::Error;

// Internal
use comms_if::tc::{Tc, TcParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
#[derive(Debug)]
pub struct Command {
    /// The simulated time the command is supposed to execute at
    exec_time_s: f64,

    /// The Telecommand to run
    tc: Tc
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending_tcs` to
/// acquire a list of telecommands that need executing.
#[derive(Debug)]
pub struct ScriptInterpreter {
    script_path: PathBuf,
    cmds: VecDeque<Command>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid TC at {0} s: {1}")]
    InvalidTc(f64, TcParseError),

    #[error("Script entries must be in time order, {0} s comes after {1} s")]
    OutOfOrder(f64, f64)
}

#[derive(Debug, PartialEq)]
pub enum PendingTcs {
    None,
    Some(Vec<Tc>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());

        // Check that the script file exists.
        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        // Load the script into a string
        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        let cmds = Self::parse(&script)?;

        Ok(ScriptInterpreter {
            script_path: path,
            cmds
        })
    }

    /// Create a new interpreter from script text.
    pub fn from_str(script: &str) -> Result<Self, ScriptError> {
        Ok(ScriptInterpreter {
            script_path: PathBuf::new(),
            cmds: Self::parse(script)?
        })
    }

    fn parse(script: &str) -> Result<VecDeque<Command>, ScriptError> {
        // Empty queue of commands
        let mut tc_queue: VecDeque<Command> = VecDeque::new();

        // Strip comments before matching so a commented-out entry is never run
        let script: String = script
            .lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .collect::<Vec<_>>()
            .join("\n");

        // Go through the script executing __the magic regex__.
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

        for cap in re.captures_iter(&script) {
            // Groups 1 and 3 are not optional in the pattern, so they are present in every
            // capture
            let time_str = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            let tc_str = cap.get(3).map(|m| m.as_str()).unwrap_or_default();

            // Parse the exec time
            let exec_time_s: f64 = time_str.parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if let Some(prev) = tc_queue.back() {
                if exec_time_s < prev.exec_time_s {
                    return Err(ScriptError::OutOfOrder(exec_time_s, prev.exec_time_s))
                }
            }

            // Parse the TC from the payload. The scripts contain JSON only.
            let tc = Tc::from_json(tc_str.trim())
                .map_err(|e| ScriptError::InvalidTc(exec_time_s, e))?;

            // Build command from the match
            tc_queue.push_back(Command {
                exec_time_s,
                tc
            });
        }

        if tc_queue.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(tc_queue)
    }

    /// Return the TCs which are due at the given simulated time.
    ///
    /// A TC is due once `current_time_s` reaches its execution time.
    pub fn get_pending_tcs(&mut self, current_time_s: f64) -> PendingTcs {

        // If the queue is empty the script is over and we return the end of
        // script variant
        if self.cmds.is_empty() {
            return PendingTcs::EndOfScript
        }

        let mut tc_vec: Vec<Tc> = vec![];

        // Pop items from the queue while the head's exec time has been reached
        while let Some(cmd) = self.cmds.front() {
            if cmd.exec_time_s > current_time_s {
                break
            }

            if let Some(cmd) = self.cmds.pop_front() {
                tc_vec.push(cmd.tc);
            }
        }

        if tc_vec.is_empty() {
            PendingTcs::None
        }
        else {
            PendingTcs::Some(tc_vec)
        }
    }

    /// Get the number of TCs left in the script
    pub fn get_num_tcs(&self) -> usize {
        self.cmds.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        match self.cmds.back() {
            Some(c) => c.exec_time_s,
            None => 0f64
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SCRIPT: &str = "\
        # warm up first\n\
        2.0: \"collect_start\";\n\
        # 3.0: \"quit\";\n\
        10.5 : \"force_left\";\n\
        10.5: {\"drive\": {\"throttle\": true}};\n\
        30: \"quit\";\n";

    #[test]
    fn test_parse() {
        let si = ScriptInterpreter::from_str(SCRIPT).unwrap();

        assert_eq!(si.get_num_tcs(), 4);
        assert_eq!(si.get_duration(), 30.0);
    }

    #[test]
    fn test_pending() {
        let mut si = ScriptInterpreter::from_str(SCRIPT).unwrap();

        assert_eq!(si.get_pending_tcs(1.0), PendingTcs::None);
        assert_eq!(si.get_pending_tcs(2.0), PendingTcs::Some(vec![Tc::CollectStart]));
        assert_eq!(si.get_pending_tcs(2.5), PendingTcs::None);

        match si.get_pending_tcs(11.0) {
            PendingTcs::Some(tcs) => {
                assert_eq!(tcs.len(), 2);
                assert_eq!(tcs[0], Tc::ForceLeft);
            },
            other => panic!("Expected two TCs, got {:?}", other)
        }

        assert_eq!(si.get_pending_tcs(100.0), PendingTcs::Some(vec![Tc::Quit]));
        assert_eq!(si.get_pending_tcs(101.0), PendingTcs::EndOfScript);
    }

    #[test]
    fn test_bundled_script() {
        let si = ScriptInterpreter::new(
            concat!(env!("CARGO_MANIFEST_DIR"), "/../scripts/lane_changes.lcs")
        ).unwrap();

        assert_eq!(si.get_num_tcs(), 13);
        assert_eq!(si.get_duration(), 36.0);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            ScriptInterpreter::from_str("# nothing here\n"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_str("1.0: \"warp\";"),
            Err(ScriptError::InvalidTc(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::from_str("5.0: \"quit\";\n1.0: \"quit\";"),
            Err(ScriptError::OutOfOrder(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::new("/no/such/script.lcs"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
