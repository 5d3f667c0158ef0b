//! Lateral control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Serialize;

// Internal
use super::{Params, LatCtrlError, PolylineFollower, Footprint, FollowerStep};
use comms_if::sim::Location;
use util::{
    params,
    module::State,
    archive::{Archived, Archiver, ArchiveError},
    session::Session
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session-relative path of the per-frame controller archive.
const ARCHIVE_PATH: &str = "lat_ctrl.csv";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Lateral control module state
#[derive(Default)]
pub struct LatCtrl {
    params: Params,

    /// The active lane change, if any
    follower: Option<PolylineFollower>,

    /// Number of steps taken on the active lane change
    num_steps: usize,

    /// Number of lane changes begun since initialisation
    num_lane_changes: usize,

    report: StatusReport,

    /// Row for the step taken this cycle, `None` when inactive
    row: Option<ArchiveRow>,
    arch_rows: Archiver
}

/// Input data to lateral control.
#[derive(Debug, Clone, Copy)]
pub struct InputData {
    /// The vehicle's footprint this frame
    pub footprint: Footprint
}

/// Status report for lateral control processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// True if a lane change was being followed this cycle
    pub active: bool,

    /// True if the lane change finished this cycle
    pub finished: bool,

    /// The follower step, if one was taken
    pub step: Option<FollowerStep>
}

/// One row of the lateral control archive.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ArchiveRow {
    pub crossed_pointer: usize,
    pub nxt_pointer: usize,
    pub cu_loc_x: f64,
    pub cu_loc_y: f64,
    pub gt_x: Option<f64>,
    pub gt_y: Option<f64>,
    pub target_loc_x: f64,
    pub target_loc_y: f64,
    pub dy: f64,
    pub steering: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ArchiveRow {
    /// Archive header, in field order.
    pub const FIELDS: [&'static str; 10] = [
        "crossed_pointer",
        "nxt_pointer",
        "cu_loc_x",
        "cu_loc_y",
        "gt_x",
        "gt_y",
        "target_loc_x",
        "target_loc_y",
        "dy",
        "steering"
    ];
}

impl State for LatCtrl {
    type InitData = &'static str;
    type InitError = LatCtrlError;

    type InputData = InputData;
    type OutputData = Option<f64>;
    type StatusReport = StatusReport;
    type ProcError = LatCtrlError;

    /// Initialise the LatCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params = params::load(init_data)
            .map_err(LatCtrlError::ParamLoadError)?;

        let arch = Archiver::from_path(session, ARCHIVE_PATH, &ArchiveRow::FIELDS)
            .map_err(LatCtrlError::ArchiveError)?;

        self.init_with(params, arch);

        Ok(())
    }

    /// Step the active lane change.
    ///
    /// The output is the steering demand which replaces the agent's, or `None` if no lane change
    /// is active. After the step on which the follower reaches the end of the polyline the lane
    /// change is dropped.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the cycle data
        self.report = StatusReport::default();
        self.row = None;

        let step = match self.follower {
            Some(ref mut f) => f.step(&input_data.footprint),
            None => return Ok((None, self.report))
        };

        self.num_steps += 1;

        debug!(
            "LatCtrl step {}: cr = {}, nxt = {}, dy = {:.3}, steering = {:.4}",
            self.num_steps,
            step.crossed_pointer,
            step.nxt_pointer,
            step.dy,
            step.steering
        );

        self.report.active = true;
        self.report.finished = step.finished;
        self.report.step = Some(step);

        self.row = Some(ArchiveRow::from(&step));
        self.write().map_err(LatCtrlError::ArchiveError)?;

        if step.finished {
            info!("Lane change finished after {} steps", self.num_steps);
            self.follower = None;
        }

        Ok((Some(step.steering), self.report))
    }
}

impl LatCtrl {
    /// Initialise from already loaded parameters, writing rows into the given archive.
    pub fn init_with(&mut self, params: Params, arch: Archiver) {
        self.params = params;
        self.arch_rows = arch;
        self.follower = None;
        self.num_steps = 0;
    }

    /// Begin following a new lane change polyline, replacing any active one.
    pub fn begin(
        &mut self,
        loc1: &Location,
        loc2: &Location,
        loc3: &Location,
        waypoints: &[Location]
    ) -> Result<(), LatCtrlError> {
        let follower = PolylineFollower::new(loc1, loc2, loc3, waypoints, self.params.clone())?;

        if self.follower.is_some() {
            info!("Replacing the active lane change");
        }

        info!(
            "Lane change polyline loaded: {} points, {:.2} m long",
            follower.points().len(),
            follower.length()
        );

        self.follower = Some(follower);
        self.num_steps = 0;
        self.num_lane_changes += 1;

        Ok(())
    }

    /// Drop the active lane change, if any.
    pub fn abort(&mut self) {
        if self.follower.take().is_some() {
            info!("Lane change aborted after {} steps", self.num_steps);
        }
    }

    pub fn is_active(&self) -> bool {
        self.follower.is_some()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn num_lane_changes(&self) -> usize {
        self.num_lane_changes
    }
}

impl Archived for LatCtrl {
    fn write(&mut self) -> Result<(), ArchiveError> {
        match self.row {
            Some(row) => self.arch_rows.serialise(row),
            None => Ok(())
        }
    }
}

impl From<&FollowerStep> for ArchiveRow {
    fn from(step: &FollowerStep) -> Self {
        Self {
            crossed_pointer: step.crossed_pointer,
            nxt_pointer: step.nxt_pointer,
            cu_loc_x: step.cu_loc.x,
            cu_loc_y: step.cu_loc.y,
            gt_x: step.gt.map(|g| g.x),
            gt_y: step.gt.map(|g| g.y),
            target_loc_x: step.target.x,
            target_loc_y: step.target.y,
            dy: step.dy,
            steering: step.steering
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn footprint_at(x: f64, y: f64) -> InputData {
        InputData {
            footprint: Footprint {
                front_left: Location::new(x, y - 0.9, 0.3),
                front_right: Location::new(x, y + 0.9, 0.3)
            }
        }
    }

    fn lat_ctrl(name: &str) -> (LatCtrl, std::path::PathBuf) {
        let path = std::env::temp_dir().join("lc_lat_ctrl_test").join(name);
        let mut lc = LatCtrl::default();
        lc.init_with(
            Params::default(),
            Archiver::from_file_path(&path, &ArchiveRow::FIELDS).unwrap()
        );
        (lc, path)
    }

    #[test]
    fn test_inactive_output() {
        let (mut lc, path) = lat_ctrl("inactive.csv");

        let (out, report) = lc.proc(&footprint_at(0.0, 0.0)).unwrap();

        assert!(out.is_none());
        assert!(!report.active);
        // The header is there even though no lane change was followed
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "crossed_pointer,nxt_pointer,cu_loc_x,cu_loc_y,gt_x,gt_y,\
            target_loc_x,target_loc_y,dy,steering\n"
        );
    }

    #[test]
    fn test_lane_change_rows_and_finish() {
        let (mut lc, path) = lat_ctrl("lane_change.csv");

        let tail: Vec<Location> = (1..=5)
            .map(|i| Location::new(25.0 + i as f64, -3.5, 0.0))
            .collect();
        lc.begin(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(25.0, -3.5, 0.0),
            &tail
        ).unwrap();
        assert!(lc.is_active());
        assert_eq!(lc.num_lane_changes(), 1);

        let mut num_active = 0;
        for i in 0..=60 {
            let x = i as f64 * 0.5;
            let y = if x <= 10.0 { 0.0 } else { (-3.5 * (x - 10.0) / 15.0).max(-3.5) };

            let (out, report) = lc.proc(&footprint_at(x, y)).unwrap();
            if report.active {
                num_active += 1;
                assert!(out.is_some());
            }
            if report.finished {
                break
            }
        }

        assert!(!lc.is_active());

        let csv = std::fs::read_to_string(path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "crossed_pointer,nxt_pointer,cu_loc_x,cu_loc_y,gt_x,gt_y,\
            target_loc_x,target_loc_y,dy,steering"
        );
        assert_eq!(lines.count(), num_active);
    }

    #[test]
    fn test_abort() {
        let (mut lc, _) = lat_ctrl("abort.csv");

        lc.begin(
            &Location::new(0.0, 0.0, 0.0),
            &Location::new(10.0, 0.0, 0.0),
            &Location::new(25.0, 3.5, 0.0),
            &[]
        ).unwrap();

        lc.abort();
        assert!(!lc.is_active());

        let (out, _) = lc.proc(&footprint_at(1.0, 0.0)).unwrap();
        assert!(out.is_none());
    }
}
