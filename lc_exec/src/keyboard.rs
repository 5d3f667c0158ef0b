//! # Keyboard control
//!
//! Holds the operator's state for a collection run: whether the autopilot drives, the lane change
//! labels recorded with each image, whether frames are being collected, and the one-shot requests
//! the main loop consumes. While the autopilot is off the held drive keys are turned into manual
//! vehicle control.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;

// Internal
use comms_if::{
    sim::{ActorId, VehicleControl},
    tc::{DriveKeys, Tc}
};
use util::maths::{clamp, round_dp};
use crate::image_saver::ImageMeta;
use crate::sim_client::{SimClient, SimClientError, SimLink};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Steering added to the manual steer cache per millisecond a steer key is held.
const STEER_RATE_PER_MS: f64 = 5e-4;

/// Magnitude limit of the manual steering demand.
const MAX_MANUAL_STEER: f64 = 0.7;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Operator state driven by commands.
#[derive(Debug, Clone)]
pub struct KeyboardControl {
    vehicle: ActorId,

    pub autopilot_enabled: bool,

    pub left_lane_change_activated: u8,
    pub right_lane_change_activated: u8,

    /// -1 while in the first half of a labelled lane change, 1 in the second half, 0 otherwise
    pub lane_change_second_half: i8,

    pub start_data_collection: bool,

    /// Always 0, carried into the image labels
    pub junk: u8,

    requests: Requests,

    drive_keys: DriveKeys,
    steer_cache: f64,
    control: VehicleControl
}

/// One-shot requests raised by commands and consumed once by the main loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requests {
    pub force_left_lane_change: bool,
    pub force_right_lane_change: bool,
    pub spawn_obstacle: bool,
    pub destroy_obstacle: bool,
    pub teleport: bool,
    pub print_next_location: bool
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// What the main loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl KeyboardControl {
    pub fn new(vehicle: ActorId) -> Self {
        Self {
            vehicle,
            autopilot_enabled: true,
            left_lane_change_activated: 0,
            right_lane_change_activated: 0,
            lane_change_second_half: 0,
            start_data_collection: false,
            junk: 0,
            requests: Requests::default(),
            drive_keys: DriveKeys::default(),
            steer_cache: 0.0,
            control: VehicleControl::default()
        }
    }

    /// Apply a command.
    ///
    /// Autopilot changes are forwarded to the simulator immediately, everything else only
    /// changes this state.
    pub fn apply<L: SimLink>(
        &mut self,
        tc: &Tc,
        client: &mut SimClient<L>
    ) -> Result<Flow, SimClientError> {
        match tc {
            Tc::AutopilotOff => {
                self.autopilot_enabled = false;
                client.set_autopilot(self.vehicle, false)?;
                info!("Autopilot off");
            },
            Tc::AutopilotOn => {
                self.autopilot_enabled = true;
                client.set_autopilot(self.vehicle, true)?;
                info!("Autopilot on, lane change deactivated");
            },
            Tc::LaneChangeLeft => {
                self.left_lane_change_activated = 1;
                self.lane_change_second_half = -1;
                info!("Left lane change activated");
            },
            Tc::LaneChangeRight => {
                self.right_lane_change_activated = 1;
                self.lane_change_second_half = -1;
                info!("Right lane change activated");
            },
            Tc::SecondHalf => {
                self.lane_change_second_half = 1;
                info!("Second half of lane change");
            },
            Tc::LaneChangeOver => {
                self.left_lane_change_activated = 0;
                self.right_lane_change_activated = 0;
                self.lane_change_second_half = 0;
                info!("Lane change over");
            },
            Tc::CollectStart => {
                self.start_data_collection = true;
                info!("Starting data collection");
            },
            Tc::CollectPause => {
                self.start_data_collection = false;
                info!("Pausing data collection");
            },
            Tc::ForceLeft => {
                self.requests.force_left_lane_change = true;
                info!("Forcing left lane change");
            },
            Tc::ForceRight => {
                self.requests.force_right_lane_change = true;
                info!("Forcing right lane change");
            },
            Tc::SpawnObstacle => {
                self.requests.spawn_obstacle = true;
                info!("Spawning static obstacle");
            },
            Tc::DestroyObstacle => {
                self.requests.destroy_obstacle = true;
                info!("Destroying static obstacle");
            },
            Tc::Teleport => {
                self.requests.teleport = true;
                info!("Teleporting to the next waypoint");
            },
            Tc::PrintNext => {
                self.requests.print_next_location = true;
                info!("Printing the location 1 m ahead");
            },
            Tc::Drive(keys) => self.drive_keys = *keys,
            Tc::Quit => return Ok(Flow::Quit)
        }

        Ok(Flow::Continue)
    }

    /// Take the pending one-shot requests, clearing them.
    pub fn take_requests(&mut self) -> Requests {
        std::mem::take(&mut self.requests)
    }

    /// Compute the manual control from the held drive keys, given the milliseconds since the
    /// previous frame.
    ///
    /// Holding a steer key ramps the steering, reversing direction or releasing the keys resets
    /// it to zero.
    pub fn manual_control(&mut self, dt_ms: f64) -> VehicleControl {
        let keys = self.drive_keys;
        let increment = STEER_RATE_PER_MS * dt_ms;

        self.control.throttle = if keys.throttle { 1.0 } else { 0.0 };

        if keys.left {
            if self.steer_cache > 0.0 {
                self.steer_cache = 0.0;
            }
            else {
                self.steer_cache -= increment;
            }
        }
        else if keys.right {
            if self.steer_cache < 0.0 {
                self.steer_cache = 0.0;
            }
            else {
                self.steer_cache += increment;
            }
        }
        else {
            self.steer_cache = 0.0;
        }

        self.steer_cache = clamp(self.steer_cache, -MAX_MANUAL_STEER, MAX_MANUAL_STEER);
        self.control.steer = round_dp(self.steer_cache, 1);
        self.control.brake = if keys.brake { 1.0 } else { 0.0 };
        self.control.hand_brake = keys.hand_brake;
        self.control.reverse = self.control.gear < 0;

        self.control
    }

    /// Labels for an image taken now.
    pub fn image_meta(&self, steer: f64, obstacle_distance: f64) -> ImageMeta {
        ImageMeta {
            steer,
            left_lane_change: self.left_lane_change_activated,
            right_lane_change: self.right_lane_change_activated,
            lane_change_second_half: self.lane_change_second_half,
            junk: self.junk,
            obstacle_distance
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use comms_if::sim::{SimRequest, SimResponse};

    fn client() -> SimClient<fake::FakeLink> {
        fake::client(|_| SimResponse::Ok)
    }

    #[test]
    fn test_label_flags() {
        let mut c = client();
        let mut kb = KeyboardControl::new(ActorId(1));

        kb.apply(&Tc::LaneChangeLeft, &mut c).unwrap();
        assert_eq!(kb.left_lane_change_activated, 1);
        assert_eq!(kb.lane_change_second_half, -1);

        kb.apply(&Tc::SecondHalf, &mut c).unwrap();
        assert_eq!(kb.lane_change_second_half, 1);

        kb.apply(&Tc::LaneChangeRight, &mut c).unwrap();
        let meta = kb.image_meta(0.2, 1000.0);
        assert_eq!(meta.left_lane_change, 1);
        assert_eq!(meta.right_lane_change, 1);
        assert_eq!(meta.lane_change_second_half, -1);
        assert_eq!(meta.junk, 0);

        kb.apply(&Tc::LaneChangeOver, &mut c).unwrap();
        assert_eq!(kb.left_lane_change_activated, 0);
        assert_eq!(kb.right_lane_change_activated, 0);
        assert_eq!(kb.lane_change_second_half, 0);

        // None of these reach the simulator
        assert!(c.link().requests.is_empty());
    }

    #[test]
    fn test_autopilot_forwarded() {
        let mut c = client();
        let mut kb = KeyboardControl::new(ActorId(4));
        assert!(kb.autopilot_enabled);

        kb.apply(&Tc::AutopilotOff, &mut c).unwrap();
        assert!(!kb.autopilot_enabled);
        assert!(matches!(
            c.link().requests[0],
            SimRequest::SetAutopilot { actor: ActorId(4), enabled: false }
        ));
    }

    #[test]
    fn test_requests_are_one_shot() {
        let mut c = client();
        let mut kb = KeyboardControl::new(ActorId(1));

        kb.apply(&Tc::ForceRight, &mut c).unwrap();
        kb.apply(&Tc::Teleport, &mut c).unwrap();

        let r = kb.take_requests();
        assert!(r.force_right_lane_change);
        assert!(r.teleport);
        assert!(!r.force_left_lane_change);

        assert_eq!(kb.take_requests(), Requests::default());
    }

    #[test]
    fn test_quit() {
        let mut kb = KeyboardControl::new(ActorId(1));
        assert_eq!(kb.apply(&Tc::Quit, &mut client()).unwrap(), Flow::Quit);
        assert_eq!(kb.apply(&Tc::CollectStart, &mut client()).unwrap(), Flow::Continue);
        assert!(kb.start_data_collection);
    }

    #[test]
    fn test_manual_steering() {
        let mut c = client();
        let mut kb = KeyboardControl::new(ActorId(1));

        let left = DriveKeys { left: true, throttle: true, ..Default::default() };
        kb.apply(&Tc::Drive(left), &mut c).unwrap();

        // 33 ms frames add 0.0165 each
        let ctrl = kb.manual_control(33.0);
        assert_eq!(ctrl.throttle, 1.0);
        assert_eq!(ctrl.steer, 0.0);
        for _ in 0..10 {
            kb.manual_control(33.0);
        }
        let ctrl = kb.manual_control(33.0);
        assert!((ctrl.steer + 0.2).abs() < 1e-12);

        // Saturates at the manual limit
        for _ in 0..100 {
            kb.manual_control(33.0);
        }
        assert!((kb.manual_control(33.0).steer + 0.7).abs() < 1e-12);

        // Reversing direction resets the cache
        let right = DriveKeys { right: true, ..Default::default() };
        kb.apply(&Tc::Drive(right), &mut c).unwrap();
        let ctrl = kb.manual_control(33.0);
        assert_eq!(ctrl.steer, 0.0);
        assert_eq!(ctrl.throttle, 0.0);

        // Releasing resets too
        kb.manual_control(500.0);
        kb.apply(&Tc::Drive(DriveKeys { brake: true, ..Default::default() }), &mut c).unwrap();
        let ctrl = kb.manual_control(33.0);
        assert_eq!(ctrl.steer, 0.0);
        assert_eq!(ctrl.brake, 1.0);
        assert!(!ctrl.reverse);
    }
}
