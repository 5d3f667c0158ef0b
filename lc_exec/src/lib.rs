//! # Lane change harness library.
//!
//! This library allows the harness executable, its tests and benchmarks to access items defined
//! inside the harness crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actor registry - destroys every spawned actor on exit
pub mod actors;

/// Operator console - reads commands from the terminal on a background thread
pub mod console;

/// Global data store for the executable
pub mod data_store;

/// Harness run - setup, main loop and shutdown of a collection run
pub mod harness;

/// Heads-up display - frame rates and speed, logged periodically
pub mod hud;

/// Buffered image saver - writes collected frames and their labels in the background
pub mod image_saver;

/// Keyboard control - operator flags, one-shot requests and manual driving
pub mod keyboard;

/// Lane change planner - builds the lane change polyline from the road network
pub mod lane_change;

/// Lateral control module - steers the vehicle along a lane change polyline
pub mod lat_ctrl;

/// Executable parameters
pub mod params;

/// Scenario actions - traffic lights, rerouting, obstacles and debugging aids
pub mod scenario;

/// Simulation client - drives the simulator through the bridge
pub mod sim_client;
