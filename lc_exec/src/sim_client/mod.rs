//! # Simulation Client
//!
//! The SimClient gives the harness access to the driving simulator. The simulator's client API
//! is owned by a bridge process, and every call made here is a single request/response exchange
//! with that bridge over a ZMQ REQ socket. The exchange itself is abstracted behind the `SimLink`
//! trait so that the logic built on top of the client can be exercised without a simulator.
//!
//! Any failure of an exchange, including the bridge reporting that the simulator rejected the
//! call, is returned as a `SimClientError`. The harness treats all of these as fatal.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod sync_mode;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    sim::*
};

pub use sync_mode::{SyncMode, SyncFrame};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of characters of a request or response included in an error message.
const MAX_ERROR_CONTEXT_LEN: usize = 120;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Match a response against the expected variant, returning an `UnexpectedResponse` error for
/// any other variant.
macro_rules! expect_response {
    ($req:expr, $resp:expr, $pat:pat => $out:expr) => {
        match $resp {
            $pat => Ok($out),
            other => Err(SimClientError::UnexpectedResponse(
                error_context(&$req),
                error_context(&other)
            ))
        }
    };
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A link to the simulator bridge, able to make a single request/response exchange.
pub trait SimLink {
    fn request(&mut self, req: &SimRequest) -> Result<SimResponse, SimClientError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Link to the bridge over a monitored ZMQ REQ socket.
pub struct ZmqLink {
    socket: MonitoredSocket
}

/// Typed access to the simulator through a link to the bridge.
pub struct SimClient<L: SimLink = ZmqLink> {
    link: L
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SimClientError {

    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The client is not connected to the bridge")]
    NotConnected,

    #[error("Could not send the request to the bridge: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a response from the bridge: {0}")]
    RecvError(zmq::Error),

    #[error("The bridge sent a response which is not valid UTF-8")]
    NonUtf8Response,

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the bridge: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The simulator rejected the request: {0}")]
    BridgeError(String),

    #[error("Unexpected response to {0}: {1}")]
    UnexpectedResponse(String, String),

    #[error("No data from {sensor} for frame {frame} within {timeout_s} s")]
    SensorTimeout {
        sensor: String,
        frame: u64,
        timeout_s: f64
    },

    #[error("No waypoint on the road network near {0:?}")]
    NoWaypoint(Location)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqLink {
    /// Connect to the bridge at the endpoint given in the network parameters.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, SimClientError> {
        let socket = MonitoredSocket::new(
            ctx,
            zmq::REQ,
            SocketOptions::bridge_client(params),
            &params.sim_endpoint
        ).map_err(SimClientError::SocketError)?;

        Ok(Self { socket })
    }
}

impl SimLink for ZmqLink {
    fn request(&mut self, req: &SimRequest) -> Result<SimResponse, SimClientError> {
        // If not connected return now
        if !self.socket.connected() {
            return Err(SimClientError::NotConnected)
        }

        // Serialize the request
        let req_str = serde_json::to_string(req)
            .map_err(SimClientError::SerializationError)?;

        // Send the request to the bridge
        self.socket.send(&req_str, 0)
            .map_err(SimClientError::SendError)?;

        // Recieve response back from the bridge
        let msg = self.socket.recv_msg(0)
            .map_err(SimClientError::RecvError)?;

        let msg_str = msg.as_str().ok_or(SimClientError::NonUtf8Response)?;

        serde_json::from_str(msg_str)
            .map_err(SimClientError::DeserializeError)
    }
}

impl SimClient<ZmqLink> {
    /// Connect a new client to the bridge.
    pub fn connect(ctx: &zmq::Context, params: &NetParams) -> Result<Self, SimClientError> {
        Ok(Self::new(ZmqLink::new(ctx, params)?))
    }
}

impl<L: SimLink> SimClient<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Make a request, converting a bridge error response into a `SimClientError`.
    fn call(&mut self, req: SimRequest) -> Result<(SimRequest, SimResponse), SimClientError> {
        trace!("SimClient request: {}", error_context(&req));

        match self.link.request(&req)? {
            SimResponse::Error(e) => Err(SimClientError::BridgeError(e)),
            resp => Ok((req, resp))
        }
    }

    /// Make a request which only expects an acknowledgement.
    fn call_ok(&mut self, req: SimRequest) -> Result<(), SimClientError> {
        let (req, resp) = self.call(req)?;
        expect_response!(req, resp, SimResponse::Ok => ())
    }

    // ---- WORLD ----

    pub fn get_settings(&mut self) -> Result<WorldSettings, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetSettings)?;
        expect_response!(req, resp, SimResponse::Settings(s) => s)
    }

    /// Apply the settings, returning the frame at which they took effect.
    pub fn apply_settings(&mut self, settings: WorldSettings) -> Result<u64, SimClientError> {
        let (req, resp) = self.call(SimRequest::ApplySettings(settings))?;
        expect_response!(req, resp, SimResponse::Frame(f) => f)
    }

    /// Advance a synchronous world, returning the new frame number.
    pub fn tick(&mut self) -> Result<u64, SimClientError> {
        let (req, resp) = self.call(SimRequest::Tick)?;
        expect_response!(req, resp, SimResponse::Frame(f) => f)
    }

    pub fn poll_world(&mut self) -> Result<Option<WorldSnapshot>, SimClientError> {
        let (req, resp) = self.call(SimRequest::PollWorld)?;
        expect_response!(req, resp, SimResponse::Snapshot(s) => s)
    }

    pub fn poll_sensor(&mut self, sensor: ActorId) -> Result<Option<SensorData>, SimClientError> {
        let (req, resp) = self.call(SimRequest::PollSensor(sensor))?;
        expect_response!(req, resp, SimResponse::Sensor(s) => s)
    }

    pub fn spawn_points(&mut self) -> Result<Vec<Transform>, SimClientError> {
        let (req, resp) = self.call(SimRequest::SpawnPoints)?;
        expect_response!(req, resp, SimResponse::Transforms(t) => t)
    }

    pub fn draw_arrow(
        &mut self,
        begin: Location,
        end: Location,
        arrow_size: f64,
        life_time: f64
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::DrawArrow { begin, end, arrow_size, life_time })
    }

    // ---- ACTORS ----

    /// Spawn an actor from the first blueprint matching the filter.
    pub fn spawn_actor(
        &mut self,
        blueprint: &str,
        transform: Transform,
        attach_to: Option<ActorId>,
        attributes: &[(&str, &str)]
    ) -> Result<ActorId, SimClientError> {
        let (req, resp) = self.call(SimRequest::SpawnActor {
            blueprint: blueprint.to_string(),
            transform,
            attach_to,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })?;
        expect_response!(req, resp, SimResponse::Actor(a) => a)
    }

    /// Start queueing the data produced by a sensor.
    pub fn listen(&mut self, sensor: ActorId) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::Listen(sensor))
    }

    pub fn destroy_actor(&mut self, actor: ActorId) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::DestroyActor(actor))
    }

    pub fn set_autopilot(&mut self, actor: ActorId, enabled: bool) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::SetAutopilot { actor, enabled })
    }

    pub fn tm_set_synchronous(&mut self, enabled: bool) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::TmSetSynchronous(enabled))
    }

    pub fn tm_ignore_lights(
        &mut self,
        actor: ActorId,
        percentage: f64
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::TmIgnoreLights { actor, percentage })
    }

    pub fn tm_auto_lane_change(
        &mut self,
        actor: ActorId,
        enabled: bool
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::TmAutoLaneChange { actor, enabled })
    }

    pub fn apply_control(
        &mut self,
        actor: ActorId,
        control: VehicleControl
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::ApplyControl { actor, control })
    }

    pub fn get_control(&mut self, actor: ActorId) -> Result<VehicleControl, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetControl(actor))?;
        expect_response!(req, resp, SimResponse::Control(c) => c)
    }

    pub fn get_transform(&mut self, actor: ActorId) -> Result<Transform, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetTransform(actor))?;
        expect_response!(req, resp, SimResponse::Transform(t) => t)
    }

    pub fn get_location(&mut self, actor: ActorId) -> Result<Location, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetLocation(actor))?;
        expect_response!(req, resp, SimResponse::Location(l) => l)
    }

    pub fn get_velocity(&mut self, actor: ActorId) -> Result<Vector3D, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetVelocity(actor))?;
        expect_response!(req, resp, SimResponse::Vector(v) => v)
    }

    /// World-space vertices of the actor's bounding box.
    pub fn bounding_box_vertices(
        &mut self,
        actor: ActorId
    ) -> Result<Vec<Location>, SimClientError> {
        let (req, resp) = self.call(SimRequest::BoundingBoxVertices(actor))?;
        expect_response!(req, resp, SimResponse::Locations(l) => l)
    }

    pub fn set_location(
        &mut self,
        actor: ActorId,
        location: Location
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::SetLocation { actor, location })
    }

    pub fn set_simulate_physics(
        &mut self,
        actor: ActorId,
        enabled: bool
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::SetSimulatePhysics { actor, enabled })
    }

    // ---- MAP ----

    /// Get the waypoint at the centre of the driving lane nearest the location.
    pub fn get_waypoint(&mut self, location: Location) -> Result<Waypoint, SimClientError> {
        let (req, resp) = self.call(SimRequest::GetWaypoint(location))?;
        expect_response!(req, resp, SimResponse::Waypoint(w) => w)?
            .ok_or(SimClientError::NoWaypoint(location))
    }

    pub fn waypoint_next(
        &mut self,
        from: &Waypoint,
        distance: f64
    ) -> Result<Vec<Waypoint>, SimClientError> {
        let (req, resp) = self.call(SimRequest::WaypointNext { from: from.id, distance })?;
        expect_response!(req, resp, SimResponse::Waypoints(w) => w)
    }

    /// Get the first waypoint `distance` metres ahead, if the lane continues that far.
    pub fn waypoint_next_first(
        &mut self,
        from: &Waypoint,
        distance: f64
    ) -> Result<Waypoint, SimClientError> {
        self.waypoint_next(from, distance)?
            .into_iter()
            .next()
            .ok_or(SimClientError::NoWaypoint(from.transform.location))
    }

    pub fn left_lane(&mut self, wp: &Waypoint) -> Result<Option<Waypoint>, SimClientError> {
        let (req, resp) = self.call(SimRequest::LeftLane(wp.id))?;
        expect_response!(req, resp, SimResponse::Waypoint(w) => w)
    }

    pub fn right_lane(&mut self, wp: &Waypoint) -> Result<Option<Waypoint>, SimClientError> {
        let (req, resp) = self.call(SimRequest::RightLane(wp.id))?;
        expect_response!(req, resp, SimResponse::Waypoint(w) => w)
    }

    // ---- TRAFFIC LIGHTS ----

    /// State of the traffic light affecting the vehicle, if it is at one.
    pub fn traffic_light_at(
        &mut self,
        vehicle: ActorId
    ) -> Result<Option<TrafficLightState>, SimClientError> {
        let (req, resp) = self.call(SimRequest::TrafficLightAt(vehicle))?;
        expect_response!(req, resp, SimResponse::TrafficLight(t) => t)
    }

    pub fn set_traffic_light(
        &mut self,
        vehicle: ActorId,
        state: TrafficLightState,
        green_time: f64
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::SetTrafficLight { vehicle, state, green_time })
    }

    // ---- NAVIGATION AGENT ----

    pub fn agent_create(
        &mut self,
        vehicle: ActorId,
        behavior: AgentBehavior,
        ignore_traffic_light: bool
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::AgentCreate { vehicle, behavior, ignore_traffic_light })
    }

    pub fn agent_set_destination(
        &mut self,
        start: Location,
        end: Location
    ) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::AgentSetDestination { start, end })
    }

    /// Update the agent's knowledge of the world (vehicle state, lights, obstacles).
    pub fn agent_update(&mut self) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::AgentUpdate)
    }

    /// Run one step of the agent, returning the control it wants applied.
    pub fn agent_run_step(&mut self) -> Result<VehicleControl, SimClientError> {
        let (req, resp) = self.call(SimRequest::AgentRunStep)?;
        expect_response!(req, resp, SimResponse::Control(c) => c)
    }

    pub fn agent_queue_len(&mut self) -> Result<usize, SimClientError> {
        let (req, resp) = self.call(SimRequest::AgentQueueLen)?;
        expect_response!(req, resp, SimResponse::Count(c) => c)
    }

    pub fn agent_reroute(&mut self) -> Result<(), SimClientError> {
        self.call_ok(SimRequest::AgentReroute)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Short debug representation used in error messages. Sensor payloads can be megabytes of base64
/// so the representation is truncated.
fn error_context<T: std::fmt::Debug>(value: &T) -> String {
    let mut s = format!("{:?}", value);
    if s.len() > MAX_ERROR_CONTEXT_LEN {
        let mut end = MAX_ERROR_CONTEXT_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("...");
    }
    s
}

// ------------------------------------------------------------------------------------------------
// FAKES
// ------------------------------------------------------------------------------------------------


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bridge_error_is_returned() {
        let mut client = fake::client(|_| SimResponse::Error("spawn collision".into()));

        match client.spawn_actor("vehicle.audi.a2", Transform::default(), None, &[]) {
            Err(SimClientError::BridgeError(e)) => assert_eq!(e, "spawn collision"),
            other => panic!("Expected BridgeError, got {:?}", other)
        }
    }

    #[test]
    fn test_unexpected_response() {
        let mut client = fake::client(|_| SimResponse::Count(3));

        assert!(matches!(client.tick(), Err(SimClientError::UnexpectedResponse(_, _))));
    }

    #[test]
    fn test_missing_waypoint() {
        let mut client = fake::client(|_| SimResponse::Waypoint(None));

        assert!(matches!(
            client.get_waypoint(Location::new(1.0, 2.0, 0.0)),
            Err(SimClientError::NoWaypoint(_))
        ));
    }

    #[test]
    fn test_requests_are_recorded() {
        let mut client = fake::client(|req| match req {
            SimRequest::GetVelocity(_) => SimResponse::Vector(Vector3D { x: 3.0, y: 4.0, z: 0.0 }),
            _ => SimResponse::Ok
        });

        client.set_autopilot(ActorId(4), false).unwrap();
        let v = client.get_velocity(ActorId(4)).unwrap();

        assert_eq!(v.length(), 5.0);
        assert_eq!(client.link().requests, vec![
            SimRequest::SetAutopilot { actor: ActorId(4), enabled: false },
            SimRequest::GetVelocity(ActorId(4))
        ]);
    }

    #[test]
    fn test_error_context_is_truncated() {
        let long = "x".repeat(1000);
        assert!(error_context(&long).len() <= MAX_ERROR_CONTEXT_LEN + 3);
    }
}
