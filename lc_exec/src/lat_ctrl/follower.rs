//! # Polyline follower
//!
//! Follows a lane change polyline with a pure look-ahead law. Each step:
//!
//!  1. The tracked point (midway between the front bottom corners of the vehicle's bounding box)
//!     is brought into the local frame.
//!  2. The crossed pointer, the index of the last polyline point the vehicle has passed, is
//!     advanced if the tracked point has passed the next point.
//!  3. The next pointer is walked along the polyline until the arc length from the tracked point
//!     to it exceeds the look-ahead distance.
//!  4. The target is placed `lookahead` metres along the polyline from the tracked point, and the
//!     steering demand is proportional to the lateral offset between the vehicle and the target.
//!
//! The cross-track error is measured against the line through the two polyline points either
//! side of the vehicle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use comms_if::sim::Location;
use util::maths::clamp;
use super::{
    LatCtrlError,
    frame::{LocalFrame, distance_2d, point_toward, y_on_line},
    params::{CrossingRule, Params}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Index of the front bottom left bounding box vertex.
const FRONT_LEFT_VERTEX: usize = 4;

/// Index of the front bottom right bounding box vertex.
const FRONT_RIGHT_VERTEX: usize = 6;

/// Minimum number of points in a polyline.
pub const MIN_POLYLINE_POINTS: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The two world-space points whose midpoint is tracked along the polyline.
#[derive(Debug, Clone, Copy)]
pub struct Footprint {
    pub front_left: Location,
    pub front_right: Location
}

/// Follows a polyline built from the three lane change reference points and the waypoints
/// after them.
#[derive(Debug, Clone)]
pub struct PolylineFollower {
    frame: LocalFrame,

    /// Polyline points in the local frame
    points: Vec<Vector2<f64>>,

    /// Arc length from the first point to each point
    arc_lengths: Vec<f64>,

    crossed_pointer: usize,
    nxt_pointer: usize,

    params: Params,

    finished: bool
}

/// The result of one follower step, all positions in the local frame.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FollowerStep {
    pub crossed_pointer: usize,
    pub nxt_pointer: usize,

    /// The tracked point
    pub cu_loc: Vector2<f64>,

    /// The point at the tracked x on the line through the crossed point and the point after it,
    /// `None` if that line is vertical in the local frame
    pub gt: Option<Vector2<f64>>,

    pub target: Vector2<f64>,

    /// Lateral offset from the target to the tracked point
    pub dy: f64,

    pub steering: f64,

    /// Lateral offset from the line to the tracked point, `None` if `gt` is
    pub cross_track_error: Option<f64>,

    /// Arc length along the polyline of the tracked point's projection
    pub arc_length_m: f64,

    /// True if the target has reached the last polyline point
    pub finished: bool
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Footprint {
    /// Build the footprint from the world-space bounding box vertices of the vehicle.
    pub fn from_vertices(vertices: &[Location]) -> Result<Self, LatCtrlError> {
        match (vertices.get(FRONT_LEFT_VERTEX), vertices.get(FRONT_RIGHT_VERTEX)) {
            (Some(l), Some(r)) => Ok(Self {
                front_left: *l,
                front_right: *r
            }),
            _ => Err(LatCtrlError::BadFootprint(vertices.len()))
        }
    }
}

impl PolylineFollower {
    /// Create a new follower.
    ///
    /// The local frame is placed at `loc1` with x pointing to `loc2`, and the polyline is
    /// `loc1, loc2, loc3, waypoints...`.
    pub fn new(
        loc1: &Location,
        loc2: &Location,
        loc3: &Location,
        waypoints: &[Location],
        params: Params
    ) -> Result<Self, LatCtrlError> {
        let frame = LocalFrame::new(loc1, loc2);

        let points: Vec<Vector2<f64>> = [loc1, loc2, loc3]
            .iter()
            .copied()
            .chain(waypoints.iter())
            .map(|l| frame.to_local_2d(l))
            .collect();

        Self::from_local_points(frame, points, params)
    }

    /// Create a follower from a polyline already in the local frame.
    pub fn from_local_points(
        frame: LocalFrame,
        points: Vec<Vector2<f64>>,
        params: Params
    ) -> Result<Self, LatCtrlError> {
        if points.len() < MIN_POLYLINE_POINTS {
            return Err(LatCtrlError::TooFewPoints(points.len()))
        }

        if params.lookahead_m <= 0.0 {
            return Err(LatCtrlError::InvalidLookahead(params.lookahead_m))
        }

        let mut arc_lengths = Vec::with_capacity(points.len());
        arc_lengths.push(0.0);
        for i in 1..points.len() {
            arc_lengths.push(arc_lengths[i - 1] + distance_2d(&points[i - 1], &points[i]));
        }

        Ok(Self {
            frame,
            points,
            arc_lengths,
            crossed_pointer: 0,
            nxt_pointer: 1,
            params,
            finished: false
        })
    }

    /// Run one step of the follower for the vehicle's current footprint.
    pub fn step(&mut self, footprint: &Footprint) -> FollowerStep {
        let fl = self.frame.to_local_2d(&footprint.front_left);
        let fr = self.frame.to_local_2d(&footprint.front_right);
        let loc = (fl + fr) * 0.5;

        self.step_local(loc)
    }

    /// Run one step of the follower for a tracked point already in the local frame.
    pub fn step_local(&mut self, loc: Vector2<f64>) -> FollowerStep {
        let last = self.points.len() - 1;

        // ---- CROSSING ----

        // At most one point per step, and the crossed point always starts a segment
        if self.crossed_pointer + 1 < last && self.has_crossed(&loc) {
            self.crossed_pointer += 1;
        }

        if self.nxt_pointer < self.crossed_pointer + 1 {
            self.nxt_pointer = self.crossed_pointer + 1;
        }

        // ---- LOOK-AHEAD WALK ----

        let mut d1 = 0.0;
        loop {
            let pd = self.polyline_distance(&loc, self.crossed_pointer, self.nxt_pointer);
            if pd > self.params.lookahead_m {
                break
            }

            d1 = pd;

            if self.nxt_pointer == last {
                self.finished = true;
                break
            }

            self.nxt_pointer += 1;
        }

        // ---- TARGET ----

        let cr = self.crossed_pointer;
        let nxt = self.nxt_pointer;

        let gt = y_on_line(&self.points[cr], &self.points[cr + 1], loc.x);

        let target = if d1 == 0.0 {
            point_toward(&loc, &self.points[nxt], self.params.lookahead_m)
        }
        else {
            point_toward(
                &self.points[nxt - 1],
                &self.points[nxt],
                self.params.lookahead_m - d1
            )
        }.unwrap_or(self.points[nxt]);

        // ---- STEERING ----

        let dy = loc.y - target.y;
        let steering = clamp(
            -dy * self.params.steer_gain,
            -self.params.max_steer,
            self.params.max_steer
        );

        FollowerStep {
            crossed_pointer: cr,
            nxt_pointer: nxt,
            cu_loc: loc,
            gt,
            target,
            dy,
            steering,
            cross_track_error: gt.map(|g| loc.y - g.y),
            arc_length_m: self.projected_arc_length(&loc),
            finished: self.finished
        }
    }

    /// Distance from `loc` along the polyline to the point `nxt`, passing through every point
    /// after `cr`.
    pub fn polyline_distance(&self, loc: &Vector2<f64>, cr: usize, nxt: usize) -> f64 {
        if cr + 1 >= nxt {
            distance_2d(loc, &self.points[nxt])
        }
        else {
            distance_2d(loc, &self.points[cr + 1])
                + self.arc_lengths[nxt] - self.arc_lengths[cr + 1]
        }
    }

    /// Cumulative polyline length from the first point up to point `index`.
    pub fn arc_length_to(&self, index: usize) -> Option<f64> {
        self.arc_lengths.get(index).copied()
    }

    /// Total polyline length.
    pub fn length(&self) -> f64 {
        self.arc_lengths.last().copied().unwrap_or(0.0)
    }

    pub fn points(&self) -> &[Vector2<f64>] {
        &self.points
    }

    pub fn frame(&self) -> &LocalFrame {
        &self.frame
    }

    pub fn crossed_pointer(&self) -> usize {
        self.crossed_pointer
    }

    pub fn nxt_pointer(&self) -> usize {
        self.nxt_pointer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// True if the tracked point has passed the end of the current segment.
    fn has_crossed(&self, loc: &Vector2<f64>) -> bool {
        let start = &self.points[self.crossed_pointer];
        let end = &self.points[self.crossed_pointer + 1];

        match self.params.crossing_rule {
            CrossingRule::LocalX => loc.x >= end.x,
            CrossingRule::SegmentProjection => {
                let seg = end - start;
                let len = seg.norm();

                len == 0.0 || (loc - start).dot(&seg) / len >= len
            }
        }
    }

    /// Arc length of the tracked point projected onto the current segment.
    fn projected_arc_length(&self, loc: &Vector2<f64>) -> f64 {
        let cr = self.crossed_pointer;
        let start = &self.points[cr];
        let seg = self.points[cr + 1] - start;
        let len = seg.norm();

        let along = if len == 0.0 {
            0.0
        }
        else {
            clamp((loc - start).dot(&seg) / len, 0.0, len)
        };

        self.arc_lengths[cr] + along
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EPS: f64 = 1e-9;

    /// A left lane change: straight for 10 m, across 3.5 m over the next 15 m, then straight.
    fn lane_change_follower(params: Params) -> PolylineFollower {
        let wps: Vec<Location> = (1..=30)
            .map(|i| Location::new(25.0 + i as f64, -3.5, 0.0))
            .collect();

        PolylineFollower::new(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(25.0, -3.5, 0.0),
            &wps,
            params
        ).unwrap()
    }

    fn footprint_at(x: f64, y: f64) -> Footprint {
        Footprint {
            front_left: Location::new(x, y - 0.9, 0.3),
            front_right: Location::new(x, y + 0.9, 0.3)
        }
    }

    #[test]
    fn test_right_angle_reference() {
        let mut f = PolylineFollower::new(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(10.0, 10.0, 0.0),
            &[],
            Params::default()
        ).unwrap();

        let step = f.step(&footprint_at(5.0, 0.0));

        assert!(step.cu_loc.y.abs() < EPS);
        assert!(step.cross_track_error.unwrap().abs() < EPS);
        assert_eq!(step.crossed_pointer, 0);
        assert_eq!(step.nxt_pointer, 1);
        assert!((step.target.x - 6.0).abs() < EPS);
        assert!(step.steering.abs() < EPS);
        assert!(!step.finished);
    }

    #[test]
    fn test_on_segment_cross_track_error() {
        let mut f = lane_change_follower(Params::default());

        // Drive along the first two segments exactly
        for i in 0..40 {
            let x = i as f64 * 0.5;
            let y = if x <= 10.0 { 0.0 } else { -3.5 * (x - 10.0) / 15.0 };

            let step = f.step_local(Vector2::new(x, y));

            if let Some(e) = step.cross_track_error {
                assert!(e.abs() < 1e-6, "Error {} at x = {}", e, x);
            }
        }
    }

    #[test]
    fn test_arc_length_monotonic() {
        let mut f = lane_change_follower(Params::default());

        for i in 1..f.points().len() {
            assert!(f.arc_length_to(i).unwrap() >= f.arc_length_to(i - 1).unwrap());
        }
        assert!(f.arc_length_to(f.points().len()).is_none());
        assert!((f.length() - (10.0 + (15f64.powi(2) + 3.5f64.powi(2)).sqrt() + 30.0)).abs() < EPS);

        let mut prev_arc = 0.0;
        let mut prev_cr = 0;
        let mut prev_nxt = 1;
        for i in 0..120 {
            let x = i as f64 * 0.5;
            let step = f.step(&footprint_at(x, if x < 10.0 { 0.0 } else { -1.0 }));

            assert!(step.arc_length_m >= prev_arc - EPS);
            assert!(step.crossed_pointer >= prev_cr);
            assert!(step.nxt_pointer >= prev_nxt);
            assert!(step.nxt_pointer > step.crossed_pointer);

            prev_arc = step.arc_length_m;
            prev_cr = step.crossed_pointer;
            prev_nxt = step.nxt_pointer;
        }
    }

    #[test]
    fn test_steering_direction_and_limit() {
        let mut f = lane_change_follower(Params::default());

        // Vehicle on the lane change segment but still in the original lane, the target is to
        // the left (-y) so the steer is to the left
        let step = f.step_local(Vector2::new(15.0, 0.0));
        assert!(step.dy > 0.0);
        assert!(step.steering < 0.0);
        assert!((step.steering + step.dy * 0.02).abs() < EPS);

        // The target is at most one look-ahead away, so only a high gain saturates
        let mut f = lane_change_follower(Params { steer_gain: 50.0, ..Default::default() });
        let step = f.step_local(Vector2::new(0.0, -500.0));
        assert!(step.dy < -0.9);
        assert_eq!(step.steering, 1.0);
    }

    #[test]
    fn test_finishes_at_end() {
        let mut f = lane_change_follower(Params::default());

        let mut finished = false;
        for i in 0..=112 {
            let x = i as f64 * 0.5;
            let y = if x <= 10.0 {
                0.0
            } else if x <= 25.0 {
                -3.5 * (x - 10.0) / 15.0
            } else {
                -3.5
            };

            let step = f.step_local(Vector2::new(x, y));
            finished |= step.finished;
        }

        assert!(finished);
        assert!(f.is_finished());
        assert_eq!(f.nxt_pointer(), f.points().len() - 1);
        assert!(f.crossed_pointer() <= f.points().len() - 2);
    }

    #[test]
    fn test_vertical_segment_has_no_ground_truth() {
        let mut f = PolylineFollower::new(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(10.0, 10.0, 0.0),
            &[],
            Params::default()
        ).unwrap();

        // Passed x = 10 so the crossed segment is the vertical one
        let step = f.step_local(Vector2::new(10.5, 5.0));
        assert_eq!(step.crossed_pointer, 1);
        assert!(step.gt.is_none());
        assert!(step.cross_track_error.is_none());

        // Never crosses past the last segment
        let step = f.step_local(Vector2::new(11.0, 6.0));
        assert_eq!(step.crossed_pointer, 1);
    }

    #[test]
    fn test_segment_projection_rule() {
        let params = Params {
            crossing_rule: CrossingRule::SegmentProjection,
            ..Default::default()
        };

        let mut f = PolylineFollower::new(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(10.0, 10.0, 0.0),
            &[Location::new(10.0, 20.0, 0.0)],
            params
        ).unwrap();

        // Reach the corner and cross onto the vertical segment
        assert_eq!(f.step_local(Vector2::new(10.0, 0.0)).crossed_pointer, 1);

        // Half way up the vertical segment x has not changed but the point is not passed
        let step = f.step_local(Vector2::new(10.0, 5.0));
        assert_eq!(step.crossed_pointer, 1);

        let step = f.step_local(Vector2::new(10.0, 10.0));
        assert_eq!(step.crossed_pointer, 2);
    }

    #[test]
    fn test_too_few_points() {
        let frame = LocalFrame::new(&Location::default(), &Location::new(1.0, 0.0, 0.0));

        assert!(matches!(
            PolylineFollower::from_local_points(
                frame,
                vec![Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0)],
                Params::default()
            ),
            Err(LatCtrlError::TooFewPoints(2))
        ));
    }

    #[test]
    fn test_footprint_from_vertices() {
        let vertices: Vec<Location> = (0..8).map(|i| Location::new(i as f64, 0.0, 0.0)).collect();
        let fp = Footprint::from_vertices(&vertices).unwrap();

        assert_eq!(fp.front_left.x, 4.0);
        assert_eq!(fp.front_right.x, 6.0);

        assert!(matches!(
            Footprint::from_vertices(&vertices[..5]),
            Err(LatCtrlError::BadFootprint(5))
        ));
    }
}
