//! # Simulator bridge protocol
//!
//! The simulator is driven through a bridge process which owns the simulator's client API. The
//! harness sends one `SimRequest` and receives one `SimResponse` per exchange, both serialised
//! as JSON. All world-space quantities follow the simulator's conventions: metres, a left-handed
//! frame with z up, and rotations in degrees.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::ops::{Add, Sub};
use serde::{Serialize, Deserialize};

use crate::eqpt::cam::CamFrame;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Identifier of an actor in the simulated world.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
pub struct ActorId(pub u32);

/// A point in the world frame.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64
}

/// An orientation in the world frame, in degrees.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct Transform {
    pub location: Location,
    pub rotation: Rotation
}

/// A free vector, used for velocities.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct Vector3D {
    pub x: f64,
    pub y: f64,
    pub z: f64
}

/// Control demands applied to a vehicle.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct VehicleControl {
    /// Throttle in [0, 1]
    pub throttle: f64,

    /// Steering in [-1, 1], positive to the right
    pub steer: f64,

    /// Brake in [0, 1]
    pub brake: f64,

    pub hand_brake: bool,

    pub reverse: bool,

    pub manual_gear_shift: bool,

    pub gear: i32
}

/// Settings of the simulated world.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct WorldSettings {
    /// If true the world only advances when the client ticks it
    pub synchronous_mode: bool,

    pub no_rendering_mode: bool,

    /// Fixed simulation step, `None` for variable steps
    pub fixed_delta_seconds: Option<f64>
}

/// Stateless reference to a waypoint in the road network, in OpenDRIVE terms.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct WaypointRef {
    pub road_id: i32,
    pub section_id: i32,
    pub lane_id: i32,

    /// Distance along the road in metres
    pub s: f64
}

/// A waypoint of the road network.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Waypoint {
    pub id: WaypointRef,
    pub transform: Transform,
    pub lane_width: f64
}

/// The state of the world after a tick.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct WorldSnapshot {
    /// Simulator frame counter
    pub frame: u64,

    /// Simulated seconds since the episode started
    pub elapsed_seconds: f64,

    /// Simulated seconds since the previous frame
    pub delta_seconds: f64
}

/// A datum produced by a sensor for a given frame.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SensorData {
    pub frame: u64,

    /// Simulated time at which the datum was produced
    pub timestamp: f64,

    pub sensor: ActorId,

    pub payload: CamFrame
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
pub enum TrafficLightState {
    Red,
    Yellow,
    Green,
    Off,
    Unknown
}

/// Driving style of the bridge's navigation agent.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AgentBehavior {
    Cautious,
    Normal,
    Aggressive
}

/// A request sent to the bridge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum SimRequest {
    GetSettings,
    ApplySettings(WorldSettings),

    /// Advance a synchronous world by one step
    Tick,

    /// Pop the oldest queued world snapshot
    PollWorld,

    /// Pop the oldest queued datum of a listening sensor
    PollSensor(ActorId),

    SpawnPoints,

    /// Spawn an actor. The blueprint is a filter pattern, if several blueprints match one is
    /// chosen at random by the bridge.
    SpawnActor {
        blueprint: String,
        transform: Transform,
        attach_to: Option<ActorId>,
        attributes: Vec<(String, String)>
    },

    /// Start queueing a sensor's data
    Listen(ActorId),

    DestroyActor(ActorId),

    SetAutopilot {
        actor: ActorId,
        enabled: bool
    },

    TmSetSynchronous(bool),

    TmIgnoreLights {
        actor: ActorId,
        percentage: f64
    },

    TmAutoLaneChange {
        actor: ActorId,
        enabled: bool
    },

    ApplyControl {
        actor: ActorId,
        control: VehicleControl
    },

    GetControl(ActorId),
    GetTransform(ActorId),
    GetLocation(ActorId),
    GetVelocity(ActorId),

    /// World-space vertices of the actor's bounding box, in the simulator's vertex order
    BoundingBoxVertices(ActorId),

    SetLocation {
        actor: ActorId,
        location: Location
    },

    SetSimulatePhysics {
        actor: ActorId,
        enabled: bool
    },

    /// Waypoint at the centre of the driving lane nearest to the location
    GetWaypoint(Location),

    /// Waypoints approximately `distance` metres ahead
    WaypointNext {
        from: WaypointRef,
        distance: f64
    },

    LeftLane(WaypointRef),
    RightLane(WaypointRef),

    /// State of the traffic light the vehicle is currently stopped at, if any
    TrafficLightAt(ActorId),

    SetTrafficLight {
        vehicle: ActorId,
        state: TrafficLightState,
        green_time: f64
    },

    DrawArrow {
        begin: Location,
        end: Location,
        arrow_size: f64,
        life_time: f64
    },

    AgentCreate {
        vehicle: ActorId,
        behavior: AgentBehavior,
        ignore_traffic_light: bool
    },

    AgentSetDestination {
        start: Location,
        end: Location
    },

    AgentUpdate,

    AgentRunStep,

    /// Number of waypoints left in the agent's local planner queue
    AgentQueueLen,

    /// Send the agent towards a new random destination from the spawn points
    AgentReroute
}

/// A response from the bridge.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum SimResponse {
    Ok,

    /// Frame number after a settings change or tick
    Frame(u64),

    Settings(WorldSettings),

    /// A queued snapshot, `None` if the queue is empty
    Snapshot(Option<WorldSnapshot>),

    /// A queued sensor datum, `None` if the queue is empty
    Sensor(Option<SensorData>),

    Transforms(Vec<Transform>),
    Actor(ActorId),
    Control(VehicleControl),
    Transform(Transform),
    Location(Location),
    Vector(Vector3D),
    Locations(Vec<Location>),
    Waypoint(Option<Waypoint>),
    Waypoints(Vec<Waypoint>),
    TrafficLight(Option<TrafficLightState>),
    Count(usize),

    /// The bridge could not complete the request
    Error(String)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance in the horizontal plane.
    pub fn distance_2d(&self, other: &Location) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn distance(&self, other: &Location) -> f64 {
        (
            (self.x - other.x).powi(2)
            + (self.y - other.y).powi(2)
            + (self.z - other.z).powi(2)
        ).sqrt()
    }
}

impl Add for Location {
    type Output = Location;

    fn add(self, rhs: Location) -> Location {
        Location::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Location {
    type Output = Location;

    fn sub(self, rhs: Location) -> Location {
        Location::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Vector3D {
    pub fn length(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2) + self.z.powi(2)).sqrt()
    }
}

impl Transform {
    pub fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    /// Unit vector pointing along the transform's yaw, in the horizontal plane.
    pub fn forward_2d(&self) -> Location {
        let yaw_rad = self.rotation.yaw.to_radians();
        Location::new(yaw_rad.cos(), yaw_rad.sin(), 0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_location_maths() {
        let a = Location::new(1.0, 2.0, 3.0);
        let b = Location::new(4.0, 6.0, 3.0);

        assert_eq!(b - a, Location::new(3.0, 4.0, 0.0));
        assert_eq!(a + b, Location::new(5.0, 8.0, 6.0));
        assert_eq!(a.distance_2d(&b), 5.0);
        assert_eq!(a.distance(&Location::new(1.0, 2.0, 5.0)), 2.0);
    }

    #[test]
    fn test_forward_2d() {
        let t = Transform::new(Location::default(), Rotation { yaw: 90.0, ..Default::default() });
        let f = t.forward_2d();

        assert!(f.x.abs() < 1e-12);
        assert!((f.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_request_json() {
        let req = SimRequest::SetAutopilot { actor: ActorId(7), enabled: true };
        let json = serde_json::to_string(&req).unwrap();

        assert_eq!(json, r#"{"SetAutopilot":{"actor":7,"enabled":true}}"#);
    }
}
