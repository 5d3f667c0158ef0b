//! # Scenario actions
//!
//! World actions the harness takes during a run besides driving: keeping the vehicle moving
//! through red lights and past the end of its route, placing and removing a static obstacle, and
//! the teleport and print-next debugging aids.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use serde::Serialize;

use comms_if::sim::{ActorId, Location, TrafficLightState};
use crate::actors::ActorRegistry;
use crate::sim_client::{SimClient, SimClientError, SimLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A static obstacle placed in front of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Obstacle {
    pub id: ActorId,
    pub location: Location
}

/// The vehicle's location and the location a fixed distance ahead of it along its lane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NextLocation {
    pub current: Location,
    pub next: Location,
    pub delta: Location,
    pub squared_norm: f64
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Turn the light the vehicle is stopped at green if it is red.
///
/// Returns true if a light was changed.
pub fn release_red_light<L: SimLink>(
    client: &mut SimClient<L>,
    vehicle: ActorId,
    green_time_s: f64
) -> Result<bool, SimClientError> {
    match client.traffic_light_at(vehicle)? {
        Some(TrafficLightState::Red) => {
            client.set_traffic_light(vehicle, TrafficLightState::Green, green_time_s)?;
            info!("Red light turned green for {:.1} s", green_time_s);
            Ok(true)
        },
        _ => Ok(false)
    }
}

/// Send the agent to a new destination once its route is nearly used up.
///
/// Returns true if the agent was rerouted.
pub fn reroute_if_needed<L: SimLink>(
    client: &mut SimClient<L>,
    min_route_waypoints: usize
) -> Result<bool, SimClientError> {
    if client.agent_queue_len()? < min_route_waypoints {
        client.agent_reroute()?;
        info!("Rerouting");
        Ok(true)
    }
    else {
        Ok(false)
    }
}

/// Spawn a static obstacle on the vehicle's lane `ahead_m` metres in front of it.
///
/// The obstacle has physics disabled so it stays where it is put.
pub fn spawn_obstacle<L: SimLink>(
    client: &mut SimClient<L>,
    actors: &mut ActorRegistry,
    vehicle: ActorId,
    blueprint: &str,
    ahead_m: f64
) -> Result<Obstacle, SimClientError> {
    let ego_location = client.get_location(vehicle)?;
    let ego_wp = client.get_waypoint(ego_location)?;
    let obstacle_wp = client.waypoint_next_first(&ego_wp, ahead_m)?;
    let location = obstacle_wp.transform.location;

    let id = client.spawn_actor(blueprint, obstacle_wp.transform, None, &[])?;
    actors.register("obstacle", id);

    client.set_location(id, location)?;
    client.set_simulate_physics(id, false)?;

    info!(
        "Obstacle spawned at ({:.2}, {:.2}, {:.2})",
        location.x, location.y, location.z
    );

    Ok(Obstacle { id, location })
}

/// Destroy the obstacle and forget it.
///
/// The obstacle stays registered if the simulator fails to destroy it, so it is still cleaned up
/// on exit.
pub fn destroy_obstacle<L: SimLink>(
    client: &mut SimClient<L>,
    actors: &mut ActorRegistry,
    obstacle: Obstacle
) -> Result<(), SimClientError> {
    client.destroy_actor(obstacle.id)?;
    actors.remove(obstacle.id);
    info!("Obstacle destroyed");

    Ok(())
}

/// Distance from the vehicle to the obstacle's spawn location.
pub fn obstacle_distance<L: SimLink>(
    client: &mut SimClient<L>,
    vehicle: ActorId,
    obstacle: &Obstacle
) -> Result<f64, SimClientError> {
    Ok(client.get_location(vehicle)?.distance(&obstacle.location))
}

/// Move the vehicle to the waypoint `distance_m` ahead of it.
pub fn teleport<L: SimLink>(
    client: &mut SimClient<L>,
    vehicle: ActorId,
    distance_m: f64
) -> Result<Location, SimClientError> {
    let ego_location = client.get_location(vehicle)?;
    let ego_wp = client.get_waypoint(ego_location)?;
    let next = client.waypoint_next_first(&ego_wp, distance_m)?.transform.location;

    client.set_location(vehicle, next)?;
    info!("Vehicle teleported to ({:.2}, {:.2}, {:.2})", next.x, next.y, next.z);

    Ok(next)
}

/// Find the location `distance_m` ahead of the vehicle's waypoint and log it.
pub fn print_next_location<L: SimLink>(
    client: &mut SimClient<L>,
    vehicle: ActorId,
    distance_m: f64
) -> Result<NextLocation, SimClientError> {
    let current = client.get_location(vehicle)?;
    let wp = client.get_waypoint(current)?;
    let next = client.waypoint_next_first(&wp, distance_m)?.transform.location;

    let delta = next - current;
    let squared_norm = delta.x.powi(2) + delta.y.powi(2) + delta.z.powi(2);

    info!("Current location: {:?}", current);
    info!("Location {} m ahead: {:?}", distance_m, next);
    info!("Delta: ({:.4}, {:.4}, {:.4}), squared norm {:.4}", delta.x, delta.y, delta.z, squared_norm);

    Ok(NextLocation {
        current,
        next,
        delta,
        squared_norm
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use comms_if::sim::{SimRequest, SimResponse};

    fn road_client(ego: Location) -> SimClient<fake::FakeLink> {
        fake::client(move |req| {
            if let Some(resp) = fake::straight_road(req, 3) {
                return resp
            }
            match req {
                SimRequest::GetLocation(_) => SimResponse::Location(ego),
                SimRequest::SpawnActor { .. } => SimResponse::Actor(ActorId(99)),
                _ => SimResponse::Ok
            }
        })
    }

    #[test]
    fn test_red_light_released() {
        let mut c = fake::client(|req| match req {
            SimRequest::TrafficLightAt(_) => SimResponse::TrafficLight(Some(TrafficLightState::Red)),
            _ => SimResponse::Ok
        });
        assert!(release_red_light(&mut c, ActorId(1), 10.0).unwrap());
        assert!(matches!(
            c.link().requests[1],
            SimRequest::SetTrafficLight { state: TrafficLightState::Green, green_time, .. }
                if green_time == 10.0
        ));

        let mut c = fake::client(|req| match req {
            SimRequest::TrafficLightAt(_) => SimResponse::TrafficLight(Some(TrafficLightState::Green)),
            _ => SimResponse::Ok
        });
        assert!(!release_red_light(&mut c, ActorId(1), 10.0).unwrap());
        assert_eq!(c.link().requests.len(), 1);
    }

    #[test]
    fn test_reroute() {
        let mut c = fake::client(|req| match req {
            SimRequest::AgentQueueLen => SimResponse::Count(4),
            _ => SimResponse::Ok
        });
        assert!(reroute_if_needed(&mut c, 5).unwrap());
        assert_eq!(c.link().requests[1], SimRequest::AgentReroute);

        assert!(!reroute_if_needed(&mut c, 4).unwrap());
    }

    #[test]
    fn test_obstacle_lifecycle() {
        let mut c = road_client(Location::new(5.0, 3.6, 0.0));
        let mut actors = ActorRegistry::new();

        let obstacle = spawn_obstacle(&mut c, &mut actors, ActorId(1), "vehicle.audi.a2", 30.0)
            .unwrap();

        assert_eq!(obstacle.id, ActorId(99));
        assert_eq!(obstacle.location, Location::new(35.0, 3.5, 0.0));
        assert!(actors.contains(ActorId(99)));
        assert!(c.link().requests.contains(
            &SimRequest::SetSimulatePhysics { actor: ActorId(99), enabled: false }
        ));

        let d = obstacle_distance(&mut c, ActorId(1), &obstacle).unwrap();
        assert!((d - (900.0f64 + 0.01).sqrt()).abs() < 1e-9);

        destroy_obstacle(&mut c, &mut actors, obstacle).unwrap();
        assert!(actors.is_empty());
        assert_eq!(c.link().requests.last(), Some(&SimRequest::DestroyActor(ActorId(99))));
    }

    #[test]
    fn test_teleport_and_print_next() {
        let mut c = road_client(Location::new(5.0, 0.2, 0.0));

        let next = print_next_location(&mut c, ActorId(1), 1.0).unwrap();
        assert_eq!(next.next, Location::new(6.0, 0.0, 0.0));
        assert!((next.delta.x - 1.0).abs() < 1e-12);
        assert!((next.squared_norm - 1.04).abs() < 1e-12);

        let to = teleport(&mut c, ActorId(1), 10.0).unwrap();
        assert_eq!(to, Location::new(15.0, 0.0, 0.0));
        assert_eq!(
            c.link().requests.last(),
            Some(&SimRequest::SetLocation { actor: ActorId(1), location: to })
        );
    }

    #[test]
    fn test_failed_destroy_keeps_obstacle_registered() {
        let mut c = fake::client(|req| match req {
            SimRequest::DestroyActor(_) => SimResponse::Error("actor not found".into()),
            _ => SimResponse::Ok
        });
        let mut actors = ActorRegistry::new();
        let obstacle = Obstacle {
            id: actors.register("obstacle", ActorId(99)),
            location: Location::new(35.0, 3.5, 0.0)
        };

        assert!(destroy_obstacle(&mut c, &mut actors, obstacle).is_err());
        assert!(actors.contains(ActorId(99)));
    }
}
