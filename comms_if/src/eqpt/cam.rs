//! # Camera Equipment Communications Module
//!
//! The simulator's RGB cameras deliver 4-channel BGRA buffers. The bridge forwards these
//! untouched (or compressed, if configured to) as base64 text inside the JSON response, and the
//! harness converts them into RGB images here.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc, serde::ts_milliseconds};
use image::{DynamicImage, RgbImage};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An individual frame from a camera
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CamFrame {

    /// UTC timestamp at which the frame was received by the bridge
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The format of this frame
    pub format: ImageFormat,

    /// The formatted image data, encoded in base64
    pub b64_data: String
}

#[derive(Debug, Clone)]
pub struct CamImage {
    /// UTC timestamp at which the frame was received by the bridge
    pub timestamp: DateTime<Utc>,

    /// The image itself
    pub image: DynamicImage
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Cameras attached to the ego vehicle
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Hash, Eq, PartialEq)]
pub enum CamId {
    /// Forward facing camera on the bonnet, the one recorded into the dataset
    FrontRgb,

    /// Chase camera behind and above the vehicle
    TopView,
}

/// Possible formats for camera images. This is used rather than image::ImageFormat to:
///     1. Restrict the formats that can be sent back and forth
///     2. Allow serialisation as image::ImageFormat does not implement serde.
///     3. Carry the simulator's raw buffer layout, which has no container format.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub enum ImageFormat {
    /// PNG image
    Png,

    /// JPEG image with a quality value between 1 and 100, where 100 is best.
    Jpeg(u8),

    /// Raw 8 bit BGRA pixels, row major, as produced by the simulator's RGB camera.
    Bgra {
        width: u32,
        height: u32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CamFrameError {
    #[error("The frame data is not valid base64: {0}")]
    Base64Error(base64::DecodeError),

    #[error("Could not decode the frame image: {0}")]
    ImageError(image::ImageError),

    #[error("Raw frame has {found} bytes but a {width}x{height} BGRA image needs {expected}")]
    BadBufferSize {
        width: u32,
        height: u32,
        expected: usize,
        found: usize
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CamId {
    /// Every camera, in the order they are spawned and their data is delivered.
    pub const ALL: [CamId; 2] = [CamId::FrontRgb, CamId::TopView];

    /// Name used for the camera in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            CamId::FrontRgb => "front camera",
            CamId::TopView => "top view camera"
        }
    }
}

impl CamFrame {
    /// Build a frame from a raw BGRA buffer.
    pub fn from_bgra(timestamp: DateTime<Utc>, width: u32, height: u32, data: &[u8]) -> Self {
        Self {
            timestamp,
            format: ImageFormat::Bgra { width, height },
            b64_data: base64::encode(data)
        }
    }

    /// Decode the base64 payload into bytes.
    pub fn data(&self) -> Result<Vec<u8>, CamFrameError> {
        base64::decode(&self.b64_data).map_err(CamFrameError::Base64Error)
    }

    /// Convert this camera frame into a camera image
    pub fn to_cam_image(&self) -> Result<CamImage, CamFrameError> {
        let data = self.data()?;

        let image = match self.format {
            ImageFormat::Png =>
                image::load_from_memory_with_format(&data, image::ImageFormat::Png)
                    .map_err(CamFrameError::ImageError)?,
            ImageFormat::Jpeg(_) =>
                image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
                    .map_err(CamFrameError::ImageError)?,
            ImageFormat::Bgra { width, height } =>
                DynamicImage::ImageRgb8(bgra_to_rgb(width, height, &data)?)
        };

        Ok(CamImage {
            timestamp: self.timestamp,
            image
        })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a raw BGRA buffer into an RGB image, dropping the alpha channel.
pub fn bgra_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<RgbImage, CamFrameError> {
    let expected = (width as usize) * (height as usize) * 4;
    if data.len() != expected {
        return Err(CamFrameError::BadBufferSize {
            width,
            height,
            expected,
            found: data.len()
        })
    }

    let rgb: Vec<u8> = data
        .chunks_exact(4)
        .flat_map(|bgra| [bgra[2], bgra[1], bgra[0]].to_vec())
        .collect();

    // Length is checked above so the buffer always fits
    RgbImage::from_raw(width, height, rgb).ok_or(CamFrameError::BadBufferSize {
        width,
        height,
        expected,
        found: data.len()
    })
}
