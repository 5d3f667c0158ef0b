//! # Lateral control module
//!
//! Lateral control steers the vehicle through a lane change planned by `lane_change`. The
//! throttle and brake remain with the navigation agent, only the steering demand is replaced.
//!
//! The lane change path is a polyline made of the vehicle's starting waypoint, the waypoint ahead
//! of it in the same lane, the merge waypoint in the adjacent lane, and the waypoints which
//! follow the merge point. It is followed in a local frame where +x points down the road, see
//! the `follower` module for the control law.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod follower;
pub mod frame;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use follower::*;
pub use params::{CrossingRule, Params};
pub use state::*;

use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during LatCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum LatCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Could not write the lateral control archive: {0}")]
    ArchiveError(ArchiveError),

    #[error("A polyline needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    #[error("The look-ahead distance must be positive, got {0} m")]
    InvalidLookahead(f64),

    #[error("Expected the 8 bounding box vertices of the vehicle, got only {0}")]
    BadFootprint(usize)
}
