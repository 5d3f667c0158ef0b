//! # Harness run
//!
//! Setup, main loop and shutdown of a collection run. The run is generic over the link to the
//! bridge, so the whole lifecycle, cleanup included, can be driven without a simulator.
//!
//! Everything which has to be released when the run stops is placed in `Resources` as soon as
//! it exists, and `shutdown` releases whatever is there however `run` ended.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, error, info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use comms_if::{
    eqpt::cam::{CamId, CamImage},
    sim::{ActorId, SensorData},
    tc::Tc,
};
use util::{
    host,
    module::State,
    session::Session,
    script_interpreter::{ScriptInterpreter, PendingTcs},
};
use crate::{
    actors::ActorRegistry,
    console::Console,
    data_store::DataStore,
    hud::Hud,
    image_saver::{BufferedImageSaver, ImageSaverError},
    keyboard::Flow,
    lane_change::{self, Direction},
    lat_ctrl::{self, Footprint},
    params::{CameraParams, LcExecParams},
    scenario,
    sim_client::{SimClient, SimLink, SyncMode, sync_mode::SyncSensor},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const CAMERA_BLUEPRINT: &str = "sensor.camera.rgb";

/// Parameter file of the lateral controller.
const LAT_CTRL_PARAMS: &str = "lat_ctrl.toml";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything which has to be released when the harness stops.
#[derive(Default)]
pub struct Resources {
    pub actors: ActorRegistry,
    pub sync_mode: Option<SyncMode>,
    pub saver: Option<BufferedImageSaver>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Various sources for the commands driving the harness.
pub enum TcSource {
    Console(Console),
    Script(ScriptInterpreter)
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Set up the world and run the main loop until a quit command, the end of the script, `stop`
/// being set or an error.
pub fn run<L: SimLink>(
    client: &mut SimClient<L>,
    session: &Session,
    params: &LcExecParams,
    lc_params: &lane_change::Params,
    tc_source: &mut TcSource,
    res: &mut Resources,
    stop: &AtomicBool,
) -> Result<(), Report> {

    // ---- SPAWN ACTORS ----

    let spawn_points = client.spawn_points().wrap_err("Could not get the spawn points")?;

    let start = *spawn_points.get(params.spawn_point_index).ok_or_else(|| eyre!(
        "Spawn point {} requested but the map only has {}",
        params.spawn_point_index,
        spawn_points.len()
    ))?;

    let mut rng = match params.random_seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy()
    };
    let end = spawn_points
        .choose(&mut rng)
        .map(|t| t.location)
        .ok_or_else(|| eyre!("The map has no spawn points"))?;

    client.tm_set_synchronous(true)
        .wrap_err("Could not put the traffic manager into synchronous mode")?;

    let vehicle = res.actors.register(
        "ego vehicle",
        client.spawn_actor(&params.vehicle_blueprint, start, None, &[])
            .wrap_err("Could not spawn the ego vehicle")?
    );
    info!("Ego vehicle spawned at spawn point {}", params.spawn_point_index);

    client.tm_ignore_lights(vehicle, 100.0)?;
    client.tm_auto_lane_change(vehicle, true)?;

    client.agent_create(vehicle, params.agent_behavior, true)
        .wrap_err("Could not create the navigation agent")?;
    let vehicle_location = client.get_location(vehicle)?;
    client.agent_set_destination(vehicle_location, end)
        .wrap_err("Could not set the agent's destination")?;
    info!(
        "Agent destination set to ({:.2}, {:.2}, {:.2})",
        end.x, end.y, end.z
    );

    let mut sensors = Vec::with_capacity(CamId::ALL.len());
    for cam in CamId::ALL.iter() {
        let id = spawn_camera(client, &mut res.actors, *cam, params.camera(*cam), vehicle)?;
        sensors.push(SyncSensor::new(cam.name(), id));
    }

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::new(vehicle, params.no_obstacle_distance_m);

    // ---- INITIALISE MODULES ----

    ds.lat_ctrl.init(LAT_CTRL_PARAMS, session)
        .wrap_err("Failed to initialise LatCtrl")?;
    info!("LatCtrl init complete");

    res.saver = Some(BufferedImageSaver::new(
        collection_root(&params.collection_root),
        params.buffer_size,
        params.front_camera.width,
        params.front_camera.height,
        params.image_channels,
        &params.sensor_name,
        params.lane_change_number
    ).wrap_err("Failed to initialise the image saver")?);
    info!("Image saver init complete");

    let mut hud = Hud::new(
        Duration::from_secs_f64(params.hud_period_s),
        if params.hud_preview { Some(session.session_root.join("preview.png")) } else { None }
    );

    info!("Module initialisation complete\n");

    // ---- SYNCHRONOUS MODE ----

    let sync_mode = res.sync_mode.get_or_insert(
        SyncMode::enter(client, sensors, Some(params.fps))
            .wrap_err("Could not enter synchronous mode")?
    );

    let tick_timeout = Duration::from_secs_f64(params.tick_timeout_s);

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let mut last_frame_instant: Option<Instant> = None;

    loop {

        if stop.load(Ordering::Relaxed) {
            info!("Interrupted, stopping");
            break
        }

        // Wall-clock time since the previous frame, used to ramp the manual steering
        let frame_instant = Instant::now();
        let dt_ms = last_frame_instant
            .map(|t| frame_instant.saturating_duration_since(t).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        last_frame_instant = Some(frame_instant);

        // ---- COMMAND PROCESSING ----

        let tcs = match tc_source {
            TcSource::Console(console) => console.pending(),
            TcSource::Script(si) => match si.get_pending_tcs(ds.sim_time_s) {
                PendingTcs::None => vec![],
                PendingTcs::Some(tcs) => tcs,
                PendingTcs::EndOfScript => {
                    info!("End of collection script reached, stopping");
                    break
                }
            }
        };

        let mut quit = false;
        for tc in tcs.iter() {
            debug!("Processing {:?}", tc);

            if ds.keyboard.apply(tc, client)? == Flow::Quit {
                quit = true;
            }

            // Handing back to the autopilot ends any forced lane change
            if *tc == Tc::AutopilotOn {
                ds.lat_ctrl.abort();
            }
        }

        if quit {
            info!("Quit requested, stopping");
            break
        }

        // ---- WORLD TICK ----

        client.agent_update()?;

        let frame = sync_mode.tick(client, tick_timeout)?;
        ds.frame_start(frame.snapshot);

        // Sensor data is in registration order
        for (cam, data) in CamId::ALL.iter().zip(frame.sensor_data.iter()) {
            ds.set_image(*cam, decode_image(data));
        }

        // ---- SCENARIO ----

        if scenario::release_red_light(client, vehicle, params.green_time_s)? {
            ds.num_lights_released += 1;
        }

        if scenario::reroute_if_needed(client, params.min_route_waypoints)? {
            ds.num_reroutes += 1;
        }

        let requests = ds.keyboard.take_requests();

        if requests.spawn_obstacle {
            if let Some(old) = ds.obstacle.take() {
                scenario::destroy_obstacle(client, &mut res.actors, old)?;
            }
            ds.obstacle = Some(scenario::spawn_obstacle(
                client,
                &mut res.actors,
                vehicle,
                &params.vehicle_blueprint,
                params.obstacle_ahead_m
            ).wrap_err("Could not spawn the obstacle")?);
        }

        ds.obstacle_distance_m = match ds.obstacle {
            Some(ref obstacle) => {
                let d = scenario::obstacle_distance(client, vehicle, obstacle)?;
                let (low, high) = params.obstacle_log_band_m;
                if d > low && d < high {
                    info!("Obstacle distance: {:.4} m", d);
                }
                d
            },
            None => params.no_obstacle_distance_m
        };

        if requests.destroy_obstacle {
            match ds.obstacle.take() {
                Some(obstacle) => scenario::destroy_obstacle(client, &mut res.actors, obstacle)?,
                None => warn!("There is no obstacle to destroy")
            }
        }

        if requests.print_next_location {
            scenario::print_next_location(client, vehicle, params.print_next_distance_m)?;
        }

        // ---- LANE CHANGE PLANNING ----

        let forced = [
            (requests.force_left_lane_change, Direction::Left),
            (requests.force_right_lane_change, Direction::Right)
        ];

        for (requested, direction) in forced.iter() {
            if !*requested {
                continue
            }

            let plan = match lane_change::plan(client, vehicle, *direction, lc_params) {
                Ok(p) => p,
                Err(e) if !e.is_fatal() => {
                    warn!("Lane change ignored: {}", e);
                    continue
                },
                Err(e) => return Err(e).wrap_err("Could not plan the lane change")
            };

            let [loc1, loc2, loc3] = plan.reference_locations();
            ds.lat_ctrl.begin(&loc1, &loc2, &loc3, &plan.tail_locations())
                .wrap_err("Could not load the lane change polyline")?;

            lane_change::draw(client, &plan, lc_params)?;

            session.save(
                format!("lane_changes/lane_change_{:03}.json", ds.lat_ctrl.num_lane_changes()),
                plan.clone()
            );

            ds.lane_change_plan = Some(plan);
        }

        // ---- VEHICLE CONTROL ----

        if ds.keyboard.autopilot_enabled {
            let mut control = client.agent_run_step()?;

            if ds.lat_ctrl.is_active() {
                let vertices = client.bounding_box_vertices(vehicle)?;
                let input = lat_ctrl::InputData {
                    footprint: Footprint::from_vertices(&vertices)?
                };

                let (output, report) = ds.lat_ctrl.proc(&input)
                    .wrap_err("Error during LatCtrl processing")?;

                ds.lat_ctrl_input = Some(input);
                ds.lat_ctrl_output = output;
                ds.lat_ctrl_status_rpt = report;

                if let Some(steer) = output {
                    control.steer = steer;
                }
            }

            client.apply_control(vehicle, control)?;
        }
        else {
            let control = ds.keyboard.manual_control(dt_ms);
            client.apply_control(vehicle, control)?;
        }

        ds.control = client.get_control(vehicle)?;

        if requests.teleport {
            scenario::teleport(client, vehicle, params.teleport_distance_m)?;
        }

        // ---- HUD ----

        let velocity = client.get_velocity(vehicle)?;
        hud.update(
            Instant::now(),
            &frame.snapshot,
            &velocity,
            ds.top_view_image.as_ref().map(|i| &i.image)
        );
        ds.hud_info = *hud.info();

        // ---- IMAGE COLLECTION ----

        if ds.keyboard.start_data_collection {
            if let (Some(image), Some(saver)) = (&ds.front_image, &mut res.saver) {
                if saver.index() % params.index_log_period.max(1) == 0 {
                    info!("Image index: {}", saver.index());
                }

                let meta = ds.keyboard.image_meta(ds.control.steer, ds.obstacle_distance_m);

                match saver.add_image(&image.image, meta) {
                    Ok(()) => (),
                    Err(e @ ImageSaverError::WrongSize { .. }) => warn!("Image not saved: {}", e),
                    Err(e) => return Err(e).wrap_err("Could not save the collected images")
                }
            }
        }

        ds.frame_end();
    }

    info!(
        "Main loop ended after {} frames, {} reroutes, {} lane changes",
        ds.num_frames,
        ds.num_reroutes,
        ds.lat_ctrl.num_lane_changes()
    );

    Ok(())
}

/// Release everything the run acquired. Failures are logged so every step is attempted.
pub fn shutdown<L: SimLink>(client: &mut SimClient<L>, res: &mut Resources) {
    info!("Shutting down");

    if let Some(mut saver) = res.saver.take() {
        match saver.finish() {
            Ok(n) => info!("{} images written", n),
            Err(e) => error!("Could not finish writing images: {}", e)
        }
    }

    if let Some(mut sync_mode) = res.sync_mode.take() {
        if let Err(e) = sync_mode.exit(client) {
            error!("Could not restore the world settings: {}", e);
        }
    }

    let num_destroyed = res.actors.destroy_all(client);
    info!("{} actors destroyed", num_destroyed);
}

/// Spawn a camera attached to the vehicle and register it.
fn spawn_camera<L: SimLink>(
    client: &mut SimClient<L>,
    actors: &mut ActorRegistry,
    cam: CamId,
    cam_params: &CameraParams,
    vehicle: ActorId,
) -> Result<ActorId, Report> {
    let attributes = cam_params.attributes();
    let attributes: Vec<(&str, &str)> = attributes
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let id = client.spawn_actor(
        CAMERA_BLUEPRINT,
        cam_params.transform(),
        Some(vehicle),
        &attributes
    ).wrap_err_with(|| format!("Could not spawn the {}", cam.name()))?;

    info!("Spawned the {} ({}x{})", cam.name(), cam_params.width, cam_params.height);

    Ok(actors.register(cam.name(), id))
}

/// Decode a camera frame, skipping it with a warning if it is corrupt.
fn decode_image(data: &SensorData) -> Option<CamImage> {
    match data.payload.to_cam_image() {
        Ok(i) => Some(i),
        Err(e) => {
            warn!("Could not decode the image from sensor {:?}: {}", data.sensor, e);
            None
        }
    }
}

/// Resolve the collection root, relative paths being relative to the harness root.
fn collection_root(root: &str) -> PathBuf {
    let path = Path::new(root);

    if path.is_absolute() {
        return path.to_path_buf()
    }

    match host::get_harness_root() {
        Ok(r) => r.join(path),
        Err(_) => path.to_path_buf()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use comms_if::sim::{Location, Rotation, SimRequest, SimResponse, Transform, WorldSettings};

    fn original_settings() -> WorldSettings {
        WorldSettings {
            synchronous_mode: false,
            no_rendering_mode: false,
            fixed_delta_seconds: None
        }
    }

    /// A bridge which accepts the whole setup, then fails every tick.
    fn bridge() -> SimClient<fake::FakeLink> {
        let mut next_actor = 10;

        fake::client(move |req| match req {
            SimRequest::SpawnPoints => SimResponse::Transforms(vec![
                Transform::default(),
                Transform::new(Location::new(50.0, 0.0, 0.0), Rotation::default())
            ]),
            SimRequest::SpawnActor { .. } => {
                next_actor += 1;
                SimResponse::Actor(ActorId(next_actor))
            },
            SimRequest::GetLocation(_) => SimResponse::Location(Location::default()),
            SimRequest::GetSettings => SimResponse::Settings(original_settings()),
            SimRequest::ApplySettings(_) => SimResponse::Frame(1),
            SimRequest::Tick => SimResponse::Error("simulator stopped".into()),
            _ => SimResponse::Ok
        })
    }

    /// The bundled parameters with a temporary collection root, and a fresh session.
    fn setup(name: &str) -> (LcExecParams, lane_change::Params, Session) {
        let workspace = concat!(env!("CARGO_MANIFEST_DIR"), "/..");
        std::env::set_var(host::HARNESS_ROOT_ENV, workspace);

        let mut params: LcExecParams = util::params::load("lc_exec.toml").unwrap();
        params.spawn_point_index = 0;
        params.random_seed = Some(1);
        params.collection_root = std::env::temp_dir()
            .join("lc_harness_test")
            .join(name)
            .to_string_lossy()
            .into_owned();

        let session = Session::new_in(
            "harness_test",
            std::env::temp_dir().join("lc_harness_test").join("sessions")
        ).unwrap();

        (params, lane_change::Params::default(), session)
    }

    fn script(text: &str) -> TcSource {
        TcSource::Script(ScriptInterpreter::from_str(text).unwrap())
    }

    /// Vehicle then the cameras, as spawned by the bridge.
    const SPAWNED: [ActorId; 3] = [ActorId(11), ActorId(12), ActorId(13)];

    #[test]
    fn test_cleanup_after_tick_failure() {
        let (params, lc_params, session) = setup("tick_failure");
        let mut client = bridge();
        let mut res = Resources::default();
        let stop = AtomicBool::new(false);

        let result = run(
            &mut client,
            &session,
            &params,
            &lc_params,
            &mut script("100.0: \"quit\";"),
            &mut res,
            &stop
        );
        assert!(result.is_err());

        // Setup completed before the failure
        assert_eq!(res.actors.len(), 3);
        assert!(res.sync_mode.is_some());
        assert!(res.saver.is_some());

        shutdown(&mut client, &mut res);
        session.exit();

        assert!(res.actors.is_empty());
        assert!(res.sync_mode.is_none());
        assert!(res.saver.is_none());

        let requests = &client.link().requests;
        for id in SPAWNED.iter() {
            assert!(requests.contains(&SimRequest::DestroyActor(*id)), "{:?} not destroyed", id);
        }

        let restored = requests
            .iter()
            .rposition(|r| *r == SimRequest::ApplySettings(original_settings()));
        let first_destroy = requests
            .iter()
            .position(|r| matches!(r, SimRequest::DestroyActor(_)));
        assert!(restored.is_some());
        assert!(restored < first_destroy);
    }

    #[test]
    fn test_stop_flag_ends_run() {
        let (params, lc_params, session) = setup("stop_flag");
        let mut client = bridge();
        let mut res = Resources::default();
        let stop = AtomicBool::new(true);

        run(
            &mut client,
            &session,
            &params,
            &lc_params,
            &mut script("100.0: \"quit\";"),
            &mut res,
            &stop
        ).unwrap();

        assert!(!client.link().requests.contains(&SimRequest::Tick));

        shutdown(&mut client, &mut res);
        session.exit();

        let requests = &client.link().requests;
        assert!(requests.contains(&SimRequest::ApplySettings(original_settings())));
        for id in SPAWNED.iter() {
            assert!(requests.contains(&SimRequest::DestroyActor(*id)));
        }
    }
}
