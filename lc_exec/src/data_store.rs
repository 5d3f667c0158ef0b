//! # Data Store

use comms_if::{
    eqpt::cam::{CamId, CamImage},
    sim::{ActorId, VehicleControl, WorldSnapshot},
};

use crate::{
    hud::HudInfo,
    keyboard::KeyboardControl,
    lane_change::LaneChangePlan,
    lat_ctrl,
    scenario::Obstacle,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
pub struct DataStore {
    // Frame management
    /// Number of frames already executed
    pub num_frames: u64,

    /// Simulated time of the first frame
    pub sim_start_s: Option<f64>,

    /// Simulated seconds since the first frame
    pub sim_time_s: f64,

    /// World state of the current frame
    pub snapshot: Option<WorldSnapshot>,

    // Actors
    pub vehicle: ActorId,
    pub obstacle: Option<Obstacle>,

    /// Distance from the vehicle to the obstacle, or the no-obstacle value
    pub obstacle_distance_m: f64,

    // Operator state
    pub keyboard: KeyboardControl,

    // Camera images
    pub front_image: Option<CamImage>,
    pub top_view_image: Option<CamImage>,

    // LatCtrl
    pub lat_ctrl: lat_ctrl::LatCtrl,
    pub lat_ctrl_input: Option<lat_ctrl::InputData>,
    pub lat_ctrl_output: Option<f64>,
    pub lat_ctrl_status_rpt: lat_ctrl::StatusReport,

    /// The last lane change planned
    pub lane_change_plan: Option<LaneChangePlan>,

    /// Control applied to the vehicle this frame
    pub control: VehicleControl,

    pub hud_info: HudInfo,

    // Monitoring counters
    /// Number of times the agent was sent to a new destination
    pub num_reroutes: u64,

    /// Number of red lights turned green
    pub num_lights_released: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    pub fn new(vehicle: ActorId, no_obstacle_distance_m: f64) -> Self {
        Self {
            num_frames: 0,
            sim_start_s: None,
            sim_time_s: 0.0,
            snapshot: None,
            vehicle,
            obstacle: None,
            obstacle_distance_m: no_obstacle_distance_m,
            keyboard: KeyboardControl::new(vehicle),
            front_image: None,
            top_view_image: None,
            lat_ctrl: lat_ctrl::LatCtrl::default(),
            lat_ctrl_input: None,
            lat_ctrl_output: None,
            lat_ctrl_status_rpt: lat_ctrl::StatusReport::default(),
            lane_change_plan: None,
            control: VehicleControl::default(),
            hud_info: HudInfo::default(),
            num_reroutes: 0,
            num_lights_released: 0,
        }
    }

    /// Perform actions required at the start of a frame.
    ///
    /// Clears those items that need clearing each frame and updates the simulated time.
    pub fn frame_start(&mut self, snapshot: WorldSnapshot) {
        let start = *self.sim_start_s.get_or_insert(snapshot.elapsed_seconds);
        self.sim_time_s = snapshot.elapsed_seconds - start;
        self.snapshot = Some(snapshot);

        self.front_image = None;
        self.top_view_image = None;
        self.lat_ctrl_input = None;
        self.lat_ctrl_output = None;
        self.lat_ctrl_status_rpt = lat_ctrl::StatusReport::default();
    }

    /// Store this frame's image from the given camera.
    pub fn set_image(&mut self, cam: CamId, image: Option<CamImage>) {
        match cam {
            CamId::FrontRgb => self.front_image = image,
            CamId::TopView => self.top_view_image = image
        }
    }

    /// Perform actions required at the end of a frame.
    pub fn frame_end(&mut self) {
        self.num_frames += 1;
    }
}
