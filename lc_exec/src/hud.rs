//! # Heads-up display
//!
//! There is no window, the HUD's figures are logged at a fixed period instead: real frames per
//! second measured on the wall clock, simulated frames per second from the world's step, and the
//! ego vehicle's speed. The latest top-view image can be written out as a preview at the same
//! period.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{info, warn};
use serde::Serialize;

use comms_if::sim::{Vector3D, WorldSnapshot};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of frame intervals averaged for the real FPS.
const FPS_WINDOW: usize = 10;

const MS_TO_KMH: f64 = 3.6;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Hud {
    period: Duration,
    preview_path: Option<PathBuf>,

    last_frame: Option<Instant>,
    last_report: Option<Instant>,
    intervals: VecDeque<Duration>,

    info: HudInfo
}

/// Figures shown by the HUD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HudInfo {
    pub real_fps: f64,

    /// `None` until the world reports a step
    pub sim_fps: Option<u32>,

    pub speed_kmh: f64,

    /// Milliseconds since the previous frame, 0 on the first
    pub frame_time_ms: f64
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Hud {
    pub fn new(period: Duration, preview_path: Option<PathBuf>) -> Self {
        Self {
            period,
            preview_path,
            last_frame: None,
            last_report: None,
            intervals: VecDeque::with_capacity(FPS_WINDOW),
            info: HudInfo::default()
        }
    }

    /// Update the HUD for a frame which happened at `now`.
    ///
    /// Returns true if the figures were reported this frame.
    pub fn update(
        &mut self,
        now: Instant,
        snapshot: &WorldSnapshot,
        velocity: &Vector3D,
        top_view: Option<&DynamicImage>
    ) -> bool {
        self.info.frame_time_ms = match self.last_frame {
            Some(prev) => {
                let dt = now.saturating_duration_since(prev);
                if self.intervals.len() == FPS_WINDOW {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(dt);
                dt.as_secs_f64() * 1000.0
            },
            None => 0.0
        };
        self.last_frame = Some(now);

        let total: Duration = self.intervals.iter().sum();
        self.info.real_fps = if total > Duration::from_secs(0) {
            self.intervals.len() as f64 / total.as_secs_f64()
        }
        else {
            0.0
        };

        self.info.sim_fps = sim_fps(snapshot.delta_seconds);
        self.info.speed_kmh = speed_kmh(velocity);

        let due = match self.last_report {
            Some(t) => now.saturating_duration_since(t) >= self.period,
            None => true
        };
        if !due {
            return false
        }
        self.last_report = Some(now);

        info!(
            "{:5.0} FPS (real), {:>5} FPS (simulated), {:6.2} km/h (ego)",
            self.info.real_fps,
            self.info.sim_fps.map_or_else(|| "-".to_string(), |f| f.to_string()),
            self.info.speed_kmh
        );

        if let (Some(path), Some(img)) = (&self.preview_path, top_view) {
            if let Err(e) = img.save_with_format(path, image::ImageFormat::Png) {
                warn!("Could not write the HUD preview to {:?}: {}", path, e);
            }
        }

        true
    }

    pub fn info(&self) -> &HudInfo {
        &self.info
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Simulated frames per second for a world step, `None` for a non-positive step.
pub fn sim_fps(delta_seconds: f64) -> Option<u32> {
    if delta_seconds > 0.0 {
        Some((1.0 / delta_seconds).round() as u32)
    }
    else {
        None
    }
}

/// Speed in km/h of a velocity in m/s.
pub fn speed_kmh(velocity: &Vector3D) -> f64 {
    MS_TO_KMH * velocity.length()
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot(delta_seconds: f64) -> WorldSnapshot {
        WorldSnapshot {
            frame: 1,
            elapsed_seconds: 0.0,
            delta_seconds
        }
    }

    #[test]
    fn test_figures() {
        assert_eq!(sim_fps(1.0 / 30.0), Some(30));
        assert_eq!(sim_fps(0.0), None);

        let v = Vector3D { x: 3.0, y: 4.0, z: 0.0 };
        assert!((speed_kmh(&v) - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_report_period() {
        let mut hud = Hud::new(Duration::from_secs(1), None);
        let v = Vector3D::default();
        let t0 = Instant::now();

        // The first frame always reports
        assert!(hud.update(t0, &snapshot(0.05), &v, None));
        assert_eq!(hud.info().frame_time_ms, 0.0);

        let mut reports = 0;
        for i in 1..=20 {
            let t = t0 + Duration::from_millis(100 * i);
            if hud.update(t, &snapshot(0.05), &v, None) {
                reports += 1;
            }
        }
        assert_eq!(reports, 2);

        assert!((hud.info().real_fps - 10.0).abs() < 1e-9);
        assert!((hud.info().frame_time_ms - 100.0).abs() < 1e-9);
        assert_eq!(hud.info().sim_fps, Some(20));
    }

    #[test]
    fn test_preview_written() {
        let dir = std::env::temp_dir().join("lc_hud_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("preview.png");
        std::fs::remove_file(&path).ok();

        let img = DynamicImage::ImageRgb8(image::RgbImage::new(4, 3));
        let mut hud = Hud::new(Duration::from_secs(1), Some(path.clone()));
        hud.update(Instant::now(), &snapshot(0.05), &Vector3D::default(), Some(&img));

        assert!(path.exists());
    }
}
