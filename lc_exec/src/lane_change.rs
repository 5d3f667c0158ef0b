//! # Lane change planner
//!
//! Plans a forced lane change from the vehicle's current position using the road network:
//!
//! - `ego`: the waypoint nearest the vehicle,
//! - `ego_next`: the waypoint a short distance ahead of `ego` in the same lane,
//! - the waypoint beside `ego_next` in the adjacent lane,
//! - `merge`: the waypoint further ahead of that one, where the vehicle should be fully in the
//!   new lane,
//! - `tail`: waypoints at a fixed step after `merge`, so the controller settles in the new lane.
//!
//! The polyline followed by lateral control is the vehicle location, `ego_next`, `merge`, then
//! the tail.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use serde::{Deserialize, Serialize};

use comms_if::sim::{ActorId, Location, Waypoint};
use crate::sim_client::{SimClient, SimClientError, SimLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Lane change planning parameters
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Distance from the ego waypoint to the point the lane change starts
    pub ahead_distance_m: f64,

    /// Distance along the new lane over which the lane change happens
    pub merge_distance_m: f64,

    /// Number of waypoints after the merge point
    pub num_tail_waypoints: usize,

    /// Distance between tail waypoints
    pub tail_step_m: f64,

    pub arrow_size: f64,

    pub arrow_life_time_s: f64,

    /// Height above the waypoints at which arrows are drawn
    pub arrow_z_m: f64
}

/// A planned lane change.
#[derive(Debug, Clone, Serialize)]
pub struct LaneChangePlan {
    pub direction: Direction,

    /// Vehicle location when the lane change was planned
    pub start: Location,

    pub ego: Waypoint,
    pub ego_next: Waypoint,
    pub merge: Waypoint,
    pub tail: Vec<Waypoint>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right
}

#[derive(Debug, thiserror::Error)]
pub enum LaneChangeError {
    #[error("Simulator error while planning the lane change: {0}")]
    SimError(SimClientError),

    #[error("There is no lane to the {0:?} of the vehicle")]
    NoAdjacentLane(Direction)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            ahead_distance_m: 10.0,
            merge_distance_m: 15.0,
            num_tail_waypoints: 30,
            tail_step_m: 1.0,
            arrow_size: 0.3,
            arrow_life_time_s: 10.0,
            arrow_z_m: 0.0
        }
    }
}

impl LaneChangeError {
    /// True if the harness can't continue after this error.
    ///
    /// A missing adjacent lane only means the request can't be carried out here.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LaneChangeError::NoAdjacentLane(_))
    }
}

impl From<SimClientError> for LaneChangeError {
    fn from(e: SimClientError) -> Self {
        LaneChangeError::SimError(e)
    }
}

impl LaneChangePlan {
    /// The three reference locations which start the polyline.
    pub fn reference_locations(&self) -> [Location; 3] {
        [
            self.start,
            self.ego_next.transform.location,
            self.merge.transform.location
        ]
    }

    pub fn tail_locations(&self) -> Vec<Location> {
        self.tail.iter().map(|w| w.transform.location).collect()
    }

    /// The waypoints marking the lane change: ego, ego_next, merge, and the end of the tail.
    pub fn key_waypoints(&self) -> Vec<&Waypoint> {
        let mut wps = vec![&self.ego, &self.ego_next, &self.merge];
        if let Some(last) = self.tail.last() {
            wps.push(last);
        }
        wps
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Plan a lane change for the vehicle in the given direction.
pub fn plan<L: SimLink>(
    client: &mut SimClient<L>,
    vehicle: ActorId,
    direction: Direction,
    params: &Params
) -> Result<LaneChangePlan, LaneChangeError> {
    let start = client.get_location(vehicle)?;
    let ego = client.get_waypoint(start)?;
    let ego_next = client.waypoint_next_first(&ego, params.ahead_distance_m)?;

    let adjacent = match direction {
        Direction::Left => client.left_lane(&ego_next)?,
        Direction::Right => client.right_lane(&ego_next)?
    }.ok_or(LaneChangeError::NoAdjacentLane(direction))?;

    let merge = client.waypoint_next_first(&adjacent, params.merge_distance_m)?;

    // The tail is cut short if the lane ends
    let mut tail: Vec<Waypoint> = Vec::with_capacity(params.num_tail_waypoints);
    let mut current = merge;
    while tail.len() < params.num_tail_waypoints {
        current = match client.waypoint_next_first(&current, params.tail_step_m) {
            Ok(w) => w,
            Err(SimClientError::NoWaypoint(_)) => {
                debug!("Lane ends after {} tail waypoints", tail.len());
                break
            },
            Err(e) => return Err(e.into())
        };
        tail.push(current);
    }

    info!(
        "{:?} lane change planned from ({:.2}, {:.2}) via lane {} with {} tail waypoints",
        direction,
        start.x,
        start.y,
        merge.id.lane_id,
        tail.len()
    );

    Ok(LaneChangePlan {
        direction,
        start,
        ego,
        ego_next,
        merge,
        tail
    })
}

/// Draw the plan's key waypoints as arrows in the simulator, pointing along each waypoint's
/// heading.
pub fn draw<L: SimLink>(
    client: &mut SimClient<L>,
    plan: &LaneChangePlan,
    params: &Params
) -> Result<(), SimClientError> {
    for wp in plan.key_waypoints() {
        let begin = wp.transform.location + Location::new(0.0, 0.0, params.arrow_z_m);
        let end = begin + wp.transform.forward_2d();

        client.draw_arrow(begin, end, params.arrow_size, params.arrow_life_time_s)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use comms_if::sim::{SimRequest, SimResponse};

    fn road_client(num_lanes: i32) -> SimClient<fake::FakeLink> {
        fake::client(move |req| {
            if let Some(resp) = fake::straight_road(req, num_lanes) {
                return resp
            }
            match req {
                SimRequest::GetLocation(_) => SimResponse::Location(Location::new(3.0, 0.2, 0.0)),
                _ => SimResponse::Ok
            }
        })
    }

    #[test]
    fn test_right_lane_change() {
        let mut client = road_client(2);
        let params = Params::default();

        let plan = plan(&mut client, ActorId(1), Direction::Right, &params).unwrap();

        assert_eq!(plan.ego.id.lane_id, 1);
        assert_eq!(plan.ego_next.id.lane_id, 1);
        assert_eq!(plan.ego_next.id.s, 13.0);
        assert_eq!(plan.merge.id.lane_id, 2);
        assert_eq!(plan.merge.id.s, 28.0);
        assert_eq!(plan.tail.len(), 30);
        assert_eq!(plan.tail[0].id.s, 29.0);
        assert_eq!(plan.tail[29].id.s, 58.0);

        let refs = plan.reference_locations();
        assert_eq!(refs[0], Location::new(3.0, 0.2, 0.0));
        assert_eq!(refs[1], Location::new(13.0, 0.0, 0.0));
        assert_eq!(refs[2], Location::new(28.0, 3.5, 0.0));

        assert_eq!(plan.tail_locations().len(), 30);
        assert_eq!(plan.key_waypoints().len(), 4);
    }

    #[test]
    fn test_no_adjacent_lane() {
        let mut client = road_client(2);

        match plan(&mut client, ActorId(1), Direction::Left, &Params::default()) {
            Err(e @ LaneChangeError::NoAdjacentLane(Direction::Left)) => assert!(!e.is_fatal()),
            other => panic!("Expected NoAdjacentLane, got {:?}", other)
        }
    }

    #[test]
    fn test_lane_end_truncates_tail() {
        let mut client = fake::client(|req| match req {
            SimRequest::WaypointNext { from, .. } if from.s >= 33.0 => SimResponse::Waypoints(vec![]),
            _ => fake::straight_road(req, 2)
                .unwrap_or(SimResponse::Location(Location::new(3.0, 0.0, 0.0)))
        });

        let plan = plan(&mut client, ActorId(1), Direction::Right, &Params::default()).unwrap();

        assert_eq!(plan.tail.len(), 5);
        assert_eq!(plan.key_waypoints()[3].id.s, 33.0);
    }

    #[test]
    fn test_draw_arrows() {
        let mut client = road_client(2);
        let params = Params::default();

        let plan = plan(&mut client, ActorId(1), Direction::Right, &params).unwrap();
        client.link_mut().requests.clear();

        draw(&mut client, &plan, &params).unwrap();

        let arrows: Vec<_> = client.link().requests.iter().filter_map(|r| match r {
            SimRequest::DrawArrow { begin, end, arrow_size, life_time } =>
                Some((*begin, *end, *arrow_size, *life_time)),
            _ => None
        }).collect();

        assert_eq!(arrows.len(), 4);
        assert_eq!(arrows[0].0, Location::new(3.0, 0.0, 0.0));
        assert!((arrows[0].1.x - 4.0).abs() < 1e-12);
        assert_eq!(arrows[3].0.x, 58.0);
        assert!(arrows.iter().all(|a| a.2 == 0.3 && a.3 == 10.0));
    }
}
