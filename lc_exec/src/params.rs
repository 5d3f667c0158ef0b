//! # Harness Executable Parameters
//!
//! This module provides parameters for the harness executable, loaded from `lc_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

use comms_if::{
    eqpt::cam::CamId,
    sim::{AgentBehavior, Location, Rotation, Transform}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LcExecParams {

    /// Index into the map's spawn points at which the ego vehicle starts
    pub spawn_point_index: usize,

    /// Blueprint filter for the ego vehicle and the static obstacle
    pub vehicle_blueprint: String,

    /// Driving style of the navigation agent
    pub agent_behavior: AgentBehavior,

    /// Simulation frame rate in synchronous mode
    pub fps: f64,

    /// Maximum time to wait for a frame's data after a tick
    pub tick_timeout_s: f64,

    /// Camera whose images are collected
    pub front_camera: CameraParams,

    /// Chase camera used for the HUD preview
    pub top_view_camera: CameraParams,

    /// Number of channels in saved images
    pub image_channels: u8,

    /// Number of images buffered before being written
    pub buffer_size: usize,

    /// Directory images are collected into. Relative paths are relative to the harness root.
    pub collection_root: String,

    /// Name of the collected sensor, used as the image directory name
    pub sensor_name: String,

    /// Number identifying this collection run
    pub lane_change_number: u32,

    /// Period between HUD reports
    pub hud_period_s: f64,

    /// If true the top view is written to `preview.png` in the session at each HUD report
    pub hud_preview: bool,

    /// The agent is rerouted when fewer waypoints than this remain in its route
    pub min_route_waypoints: usize,

    /// Green time given to a red light the vehicle is stopped at
    pub green_time_s: f64,

    /// Distance ahead of the vehicle at which the static obstacle is placed
    pub obstacle_ahead_m: f64,

    /// Obstacle distances inside this open interval are logged
    pub obstacle_log_band_m: (f64, f64),

    /// Obstacle distance recorded when there is no obstacle
    pub no_obstacle_distance_m: f64,

    /// Distance ahead the vehicle jumps when teleported
    pub teleport_distance_m: f64,

    /// Distance ahead of the vehicle's waypoint used by print-next
    pub print_next_distance_m: f64,

    /// Period in images between logs of the image index
    pub index_log_period: u64,

    /// Seed for choosing the initial destination, random if not given
    #[serde(default)]
    pub random_seed: Option<u64>
}

/// Placement and resolution of a camera attached to the ego vehicle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    /// Position relative to the vehicle in metres, `[x, y, z]`
    pub position_m: [f64; 3],

    /// Orientation relative to the vehicle in degrees, `[pitch, yaw, roll]`
    pub rotation_deg: [f64; 3],

    pub width: u32,
    pub height: u32
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LcExecParams {
    /// Placement and resolution of the given camera.
    pub fn camera(&self, cam: CamId) -> &CameraParams {
        match cam {
            CamId::FrontRgb => &self.front_camera,
            CamId::TopView => &self.top_view_camera
        }
    }
}

impl CameraParams {
    /// Transform of the camera relative to its parent.
    pub fn transform(&self) -> Transform {
        Transform::new(
            Location::new(self.position_m[0], self.position_m[1], self.position_m[2]),
            Rotation {
                pitch: self.rotation_deg[0],
                yaw: self.rotation_deg[1],
                roll: self.rotation_deg[2]
            }
        )
    }

    /// Blueprint attributes setting the camera's resolution.
    pub fn attributes(&self) -> [(String, String); 2] {
        [
            ("image_size_x".to_string(), self.width.to_string()),
            ("image_size_y".to_string(), self.height.to_string())
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_camera_params() {
        let cam = CameraParams {
            position_m: [-5.5, 0.0, 2.8],
            rotation_deg: [-15.0, 0.0, 0.0],
            width: 800,
            height: 600
        };

        let t = cam.transform();
        assert_eq!(t.location, Location::new(-5.5, 0.0, 2.8));
        assert_eq!(t.rotation.pitch, -15.0);
        assert_eq!(cam.attributes()[0], ("image_size_x".to_string(), "800".to_string()));
    }

    #[test]
    fn test_harness_params_file() {
        let p: LcExecParams = util::params::load_from_path(
            concat!(env!("CARGO_MANIFEST_DIR"), "/../params/lc_exec.toml")
        ).unwrap();

        assert_eq!(p.spawn_point_index, 64);
        assert_eq!(p.fps, 30.0);
        assert_eq!(p.agent_behavior, AgentBehavior::Cautious);
        assert_eq!(p.obstacle_log_band_m, (27.0, 28.0));
        assert!(p.random_seed.is_none());
        assert_eq!(p.camera(CamId::TopView).rotation_deg[0], -15.0);
        assert_eq!(p.camera(CamId::FrontRgb), &p.front_camera);
    }
}
