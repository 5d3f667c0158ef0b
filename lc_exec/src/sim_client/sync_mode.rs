//! # Synchronous mode
//!
//! In synchronous mode the simulated world only advances when the harness ticks it. After each
//! tick the world snapshot and the data of every registered sensor for the new frame are
//! gathered, so that one loop iteration of the harness always sees a consistent set of inputs.
//!
//! Data which belongs to an older frame is discarded. If the data for the ticked frame does not
//! arrive within the timeout a `SensorTimeout` error is raised, which is fatal to the harness.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{thread, time::{Duration, Instant}};
use log::{debug, info};

use comms_if::sim::{ActorId, SensorData, WorldSettings, WorldSnapshot};
use super::{SimClient, SimClientError, SimLink};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Simulation frame rate used when none is given.
pub const DEFAULT_FPS: f64 = 20.0;

/// Time between polls of an empty data queue.
const POLL_PERIOD: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A registered sensor.
#[derive(Debug, Clone)]
pub struct SyncSensor {
    /// Name used in logs and errors
    pub name: String,

    pub id: ActorId
}

/// The world's synchronous mode, entered for the lifetime of this struct.
#[derive(Debug)]
pub struct SyncMode {
    sensors: Vec<SyncSensor>,

    fixed_delta_seconds: f64,

    /// Settings before entering synchronous mode, `None` once they have been restored
    saved_settings: Option<WorldSettings>,

    /// Frame number of the last tick
    frame: u64
}

/// Everything the world produced for one frame.
#[derive(Debug, Clone)]
pub struct SyncFrame {
    pub snapshot: WorldSnapshot,

    /// Sensor data in the order the sensors were registered
    pub sensor_data: Vec<SensorData>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SyncMode {
    /// Put the world into synchronous mode with a fixed step of `1/fps` and start queueing data
    /// from the given sensors.
    pub fn enter<L: SimLink>(
        client: &mut SimClient<L>,
        sensors: Vec<SyncSensor>,
        fps: Option<f64>
    ) -> Result<Self, SimClientError> {
        let fixed_delta_seconds = 1.0 / fps.unwrap_or(DEFAULT_FPS);

        let saved_settings = client.get_settings()?;

        let frame = client.apply_settings(WorldSettings {
            synchronous_mode: true,
            no_rendering_mode: false,
            fixed_delta_seconds: Some(fixed_delta_seconds)
        })?;

        for sensor in sensors.iter() {
            client.listen(sensor.id)?;
        }

        info!(
            "Synchronous mode entered at frame {} with a {:.4} s step and {} sensors",
            frame,
            fixed_delta_seconds,
            sensors.len()
        );

        Ok(Self {
            sensors,
            fixed_delta_seconds,
            saved_settings: Some(saved_settings),
            frame
        })
    }

    /// Tick the world and gather the snapshot and sensor data for the new frame.
    pub fn tick<L: SimLink>(
        &mut self,
        client: &mut SimClient<L>,
        timeout: Duration
    ) -> Result<SyncFrame, SimClientError> {
        self.frame = client.tick()?;
        let frame = self.frame;

        let snapshot = retrieve(
            "world",
            frame,
            timeout,
            || client.poll_world(),
            |s: &WorldSnapshot| s.frame
        )?;

        let mut sensor_data = Vec::with_capacity(self.sensors.len());
        for sensor in self.sensors.iter() {
            let id = sensor.id;
            sensor_data.push(retrieve(
                &sensor.name,
                frame,
                timeout,
                || client.poll_sensor(id),
                |d: &SensorData| d.frame
            )?);
        }

        Ok(SyncFrame {
            snapshot,
            sensor_data
        })
    }

    /// Restore the settings the world had before entering synchronous mode.
    ///
    /// Calling this more than once has no further effect.
    pub fn exit<L: SimLink>(&mut self, client: &mut SimClient<L>) -> Result<(), SimClientError> {
        if let Some(settings) = self.saved_settings.take() {
            client.apply_settings(settings)?;
            info!("Synchronous mode exited, world settings restored");
        }

        Ok(())
    }

    /// Frame number of the last tick.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn fixed_delta_seconds(&self) -> f64 {
        self.fixed_delta_seconds
    }

    pub fn is_active(&self) -> bool {
        self.saved_settings.is_some()
    }
}

impl SyncSensor {
    pub fn new(name: &str, id: ActorId) -> Self {
        Self {
            name: name.to_string(),
            id
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Poll a queue until the datum for `frame` arrives, dropping data from other frames.
fn retrieve<T, P, F>(
    name: &str,
    frame: u64,
    timeout: Duration,
    mut poll: P,
    frame_of: F
) -> Result<T, SimClientError>
where
    P: FnMut() -> Result<Option<T>, SimClientError>,
    F: Fn(&T) -> u64
{
    let deadline = Instant::now() + timeout;

    loop {
        match poll()? {
            Some(d) if frame_of(&d) == frame => return Ok(d),
            Some(d) => debug!(
                "Discarding {} data from frame {} (waiting for {})", name, frame_of(&d), frame
            ),
            None => {
                if Instant::now() >= deadline {
                    return Err(SimClientError::SensorTimeout {
                        sensor: name.to_string(),
                        frame,
                        timeout_s: timeout.as_secs_f64()
                    })
                }
                thread::sleep(POLL_PERIOD);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use chrono::Utc;
    use comms_if::{eqpt::cam::CamFrame, sim::{SimRequest, SimResponse}};

    fn sensor_data(frame: u64) -> SensorData {
        SensorData {
            frame,
            timestamp: frame as f64 * 0.05,
            sensor: ActorId(10),
            payload: CamFrame::from_bgra(Utc::now(), 1, 1, &[0, 0, 0, 255])
        }
    }

    fn snapshot(frame: u64) -> WorldSnapshot {
        WorldSnapshot {
            frame,
            elapsed_seconds: frame as f64 * 0.05,
            delta_seconds: 0.05
        }
    }

    #[test]
    fn test_tick_matches_frames() {
        let mut world_frames = vec![Some(5), Some(4)];
        let mut sensor_frames = vec![Some(5), None, Some(3)];

        let mut client = fake::client(move |req| match req {
            SimRequest::GetSettings => SimResponse::Settings(WorldSettings::default()),
            SimRequest::ApplySettings(_) => SimResponse::Frame(4),
            SimRequest::Tick => SimResponse::Frame(5),
            SimRequest::PollWorld => SimResponse::Snapshot(
                world_frames.pop().flatten().map(snapshot)
            ),
            SimRequest::PollSensor(_) => SimResponse::Sensor(
                sensor_frames.pop().flatten().map(sensor_data)
            ),
            _ => SimResponse::Ok
        });

        let mut sync = SyncMode::enter(
            &mut client,
            vec![SyncSensor::new("front", ActorId(10))],
            Some(30.0)
        ).unwrap();

        let frame = sync.tick(&mut client, Duration::from_secs(1)).unwrap();

        assert_eq!(sync.frame(), 5);
        assert_eq!(frame.snapshot.frame, 5);
        assert_eq!(frame.sensor_data.len(), 1);
        assert!(frame.sensor_data.iter().all(|d| d.frame == 5));
    }

    #[test]
    fn test_enter_and_exit_settings() {
        let original = WorldSettings {
            synchronous_mode: false,
            no_rendering_mode: true,
            fixed_delta_seconds: None
        };

        let mut client = fake::client(move |req| match req {
            SimRequest::GetSettings => SimResponse::Settings(original),
            SimRequest::ApplySettings(_) => SimResponse::Frame(1),
            _ => SimResponse::Ok
        });

        let mut sync = SyncMode::enter(
            &mut client,
            vec![SyncSensor::new("front", ActorId(10)), SyncSensor::new("top", ActorId(11))],
            None
        ).unwrap();

        assert!((sync.fixed_delta_seconds() - 1.0 / DEFAULT_FPS).abs() < 1e-12);

        sync.exit(&mut client).unwrap();
        sync.exit(&mut client).unwrap();
        assert!(!sync.is_active());

        let requests = &client.link().requests;
        assert_eq!(requests[1], SimRequest::ApplySettings(WorldSettings {
            synchronous_mode: true,
            no_rendering_mode: false,
            fixed_delta_seconds: Some(0.05)
        }));
        assert_eq!(requests[2], SimRequest::Listen(ActorId(10)));
        assert_eq!(requests[3], SimRequest::Listen(ActorId(11)));

        // Restored once only
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[4], SimRequest::ApplySettings(original));
    }

    #[test]
    fn test_sensor_timeout() {
        let mut client = fake::client(|req| match req {
            SimRequest::GetSettings => SimResponse::Settings(WorldSettings::default()),
            SimRequest::ApplySettings(_) => SimResponse::Frame(0),
            SimRequest::Tick => SimResponse::Frame(1),
            SimRequest::PollWorld => SimResponse::Snapshot(Some(snapshot(1))),
            SimRequest::PollSensor(_) => SimResponse::Sensor(None),
            _ => SimResponse::Ok
        });

        let mut sync = SyncMode::enter(
            &mut client,
            vec![SyncSensor::new("front", ActorId(10))],
            Some(30.0)
        ).unwrap();

        match sync.tick(&mut client, Duration::from_millis(20)) {
            Err(SimClientError::SensorTimeout { sensor, frame, .. }) => {
                assert_eq!(sensor, "front");
                assert_eq!(frame, 1);
            },
            other => panic!("Expected SensorTimeout, got {:?}", other)
        }
    }
}
