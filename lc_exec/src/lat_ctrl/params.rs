//! Lateral control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for lateral control
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Params {

    /// Proportional gain from the lateral offset to the target point to the steering demand.
    pub steer_gain: f64,

    /// Distance along the polyline to the target point.
    pub lookahead_m: f64,

    /// Limit on the magnitude of the steering demand.
    pub max_steer: f64,

    /// How the controller decides the vehicle has passed a polyline point.
    #[serde(default)]
    pub crossing_rule: CrossingRule
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Rule deciding when the tracked point has passed the end of the current polyline segment.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrossingRule {
    /// Passed once the local x coordinate reaches the segment end's. Only valid while the
    /// polyline keeps heading along +x in the local frame.
    LocalX,

    /// Passed once the projection onto the segment direction reaches the segment's length.
    /// Valid on polylines which curve away from the local x axis.
    SegmentProjection
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for CrossingRule {
    fn default() -> Self {
        CrossingRule::LocalX
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            steer_gain: 0.02,
            lookahead_m: 1.0,
            max_steer: 1.0,
            crossing_rule: CrossingRule::LocalX
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_params_from_toml() {
        let p: Params = util::params::from_str(
            "steer_gain = 0.02\nlookahead_m = 1.0\nmax_steer = 1.0\n"
        ).unwrap();
        assert_eq!(p, Params::default());

        let p: Params = util::params::from_str(
            "steer_gain = 0.05\nlookahead_m = 2.0\nmax_steer = 0.5\n\
            crossing_rule = \"segment_projection\"\n"
        ).unwrap();
        assert_eq!(p.crossing_rule, CrossingRule::SegmentProjection);
    }
}
