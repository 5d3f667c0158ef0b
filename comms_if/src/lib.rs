//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the harness: the commands that drive a
//! collection run, the simulator bridge protocol, and the networking layer they travel over.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator commands (keyboard, console, and script)
pub mod tc;

/// Sensor payload definitions (camera frames)
pub mod eqpt;

/// Simulator bridge request/response protocol
pub mod sim;

/// Network module
pub mod net;
