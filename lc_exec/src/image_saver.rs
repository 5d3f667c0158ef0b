//! # Buffered image saver
//!
//! Collected camera frames are buffered in memory and handed in batches to a background writer
//! thread, so the main loop never waits on PNG encoding. Each sensor gets its own directory under
//! the collection root holding the numbered PNGs and a `meta.csv` with one row per image.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use image::{DynamicImage, GenericImageView};
use log::{debug, info, warn};
use serde::Serialize;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const META_FILE_NAME: &str = "meta.csv";

/// Batches which may wait for the writer before `add_image` blocks.
const MAX_QUEUED_BATCHES: usize = 1;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Labels recorded alongside each image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ImageMeta {
    /// Steering applied to the vehicle when the image was taken
    pub steer: f64,

    pub left_lane_change: u8,
    pub right_lane_change: u8,

    /// -1 in the first half of a lane change, 1 in the second, 0 otherwise
    pub lane_change_second_half: i8,

    pub junk: u8,

    /// Distance to the static obstacle in metres
    pub obstacle_distance: f64
}

pub struct BufferedImageSaver {
    sensor_dir: PathBuf,
    buffer_size: usize,
    width: u32,
    height: u32,
    channels: u8,
    lane_change_number: u32,

    buffer: Vec<BufferedImage>,

    /// Index given to the next image added
    index: u64,

    sender: Option<SyncSender<Vec<BufferedImage>>>,
    writer: Option<JoinHandle<Result<u64, ImageSaverError>>>
}

struct BufferedImage {
    index: u64,
    image: DynamicImage,
    meta: ImageMeta
}

/// A row of the metadata CSV.
#[derive(Serialize)]
struct MetaRow {
    index: u64,
    steer: f64,
    left_lane_change: u8,
    right_lane_change: u8,
    lane_change_second_half: i8,
    junk: u8,
    obstacle_distance: f64
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImageSaverError {
    #[error("Could not create the image directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Images with {0} channels are not supported, expected 1, 3 or 4")]
    UnsupportedChannels(u8),

    #[error("Expected a {expected_width}x{expected_height} image, got {width}x{height}")]
    WrongSize {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32
    },

    #[error("Could not write image {0}: {1}")]
    ImageWriteError(PathBuf, image::ImageError),

    #[error("Could not write the image metadata: {0}")]
    MetaWriteError(csv::Error),

    #[error("The image writer thread has stopped")]
    WriterStopped,

    #[error("The image writer thread panicked")]
    WriterPanicked
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BufferedImageSaver {
    /// Create a new saver writing into `{root}/{sensor_name}`.
    pub fn new<P: AsRef<Path>>(
        root: P,
        buffer_size: usize,
        width: u32,
        height: u32,
        channels: u8,
        sensor_name: &str,
        lane_change_number: u32
    ) -> Result<Self, ImageSaverError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ImageSaverError::UnsupportedChannels(channels))
        }

        let sensor_dir = root.as_ref().join(sensor_name);
        std::fs::create_dir_all(&sensor_dir).map_err(ImageSaverError::CreateDirError)?;

        let meta = csv::Writer::from_path(sensor_dir.join(META_FILE_NAME))
            .map_err(ImageSaverError::MetaWriteError)?;

        let (tx, rx) = batch_channel();
        let dir = sensor_dir.clone();
        let writer = thread::spawn(move || writer_thread(dir, meta, rx));

        info!(
            "Saving {}x{}x{} images to {:?} in batches of {} (lane change run {})",
            width, height, channels, sensor_dir, buffer_size, lane_change_number
        );

        Ok(Self {
            sensor_dir,
            buffer_size: buffer_size.max(1),
            width,
            height,
            channels,
            lane_change_number,
            buffer: Vec::with_capacity(buffer_size),
            index: 0,
            sender: Some(tx),
            writer: Some(writer)
        })
    }

    /// Add an image and its labels to the buffer, flushing the buffer to the writer once full.
    ///
    /// Images which don't match the saver's size are rejected and do not take an index.
    pub fn add_image(&mut self, image: &DynamicImage, meta: ImageMeta) -> Result<(), ImageSaverError> {
        let (width, height) = image.dimensions();
        if width != self.width || height != self.height {
            return Err(ImageSaverError::WrongSize {
                expected_width: self.width,
                expected_height: self.height,
                width,
                height
            })
        }

        let image = match self.channels {
            1 => DynamicImage::ImageLuma8(image.to_luma8()),
            4 => DynamicImage::ImageRgba8(image.to_rgba8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8())
        };

        self.buffer.push(BufferedImage {
            index: self.index,
            image,
            meta
        });
        self.index += 1;

        if self.buffer.len() >= self.buffer_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Flush what remains in the buffer and wait for the writer to finish.
    ///
    /// Returns the number of images written. Calling this again after the saver has finished
    /// does nothing and returns 0.
    pub fn finish(&mut self) -> Result<u64, ImageSaverError> {
        let flushed = self.flush();

        // Dropping the sender ends the writer's loop
        self.sender = None;

        let written = match self.writer.take() {
            Some(w) => w.join().map_err(|_| ImageSaverError::WriterPanicked)??,
            None => return flushed.map(|_| 0)
        };

        flushed?;

        info!("Image saver finished, {} images written to {:?}", written, self.sensor_dir);

        Ok(written)
    }

    /// Index which will be given to the next image.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn lane_change_number(&self) -> u32 {
        self.lane_change_number
    }

    pub fn sensor_dir(&self) -> &Path {
        &self.sensor_dir
    }

    fn flush(&mut self) -> Result<(), ImageSaverError> {
        if self.buffer.is_empty() {
            return Ok(())
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_size));
        debug!("Flushing {} images to the writer", batch.len());

        match self.sender {
            Some(ref s) => s.send(batch).map_err(|_| ImageSaverError::WriterStopped),
            None => Err(ImageSaverError::WriterStopped)
        }
    }
}

impl Drop for BufferedImageSaver {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.finish() {
                warn!("Image saver dropped without finishing cleanly: {}", e);
            }
        }
    }
}

impl From<&BufferedImage> for MetaRow {
    fn from(b: &BufferedImage) -> Self {
        Self {
            index: b.index,
            steer: b.meta.steer,
            left_lane_change: b.meta.left_lane_change,
            right_lane_change: b.meta.right_lane_change,
            lane_change_second_half: b.meta.lane_change_second_half,
            junk: b.meta.junk,
            obstacle_distance: b.meta.obstacle_distance
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Path of the PNG for the given image index.
pub fn image_path(sensor_dir: &Path, index: u64) -> PathBuf {
    sensor_dir.join(format!("{:07}.png", index))
}

/// Write batches until the sender is dropped, returning the number of images written.
fn writer_thread(
    sensor_dir: PathBuf,
    mut meta: csv::Writer<std::fs::File>,
    receiver: Receiver<Vec<BufferedImage>>
) -> Result<u64, ImageSaverError> {
    let mut num_written = 0;

    for batch in receiver.iter() {
        for b in batch.iter() {
            let path = image_path(&sensor_dir, b.index);
            b.image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| ImageSaverError::ImageWriteError(path, e))?;

            meta.serialize(MetaRow::from(b)).map_err(ImageSaverError::MetaWriteError)?;
            num_written += 1;
        }

        meta.flush()
            .map_err(|e| ImageSaverError::MetaWriteError(csv::Error::from(e)))?;
    }

    Ok(num_written)
}

/// Channel from the saver to the writer thread.
///
/// Bounded so that a writer which falls behind stalls collection instead of queueing batches
/// in memory without limit.
fn batch_channel() -> (SyncSender<Vec<BufferedImage>>, Receiver<Vec<BufferedImage>>) {
    sync_channel(MAX_QUEUED_BATCHES)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::TrySendError;

    fn saver(name: &str, buffer_size: usize) -> BufferedImageSaver {
        let root = std::env::temp_dir().join("lc_image_saver_test").join(name);
        std::fs::remove_dir_all(&root).ok();
        BufferedImageSaver::new(root, buffer_size, 8, 6, 3, "CameraRGB", 0).unwrap()
    }

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30])))
    }

    #[test]
    fn test_images_and_meta_written() {
        let mut s = saver("written", 2);
        let dir = s.sensor_dir().to_path_buf();

        for i in 0..5 {
            let meta = ImageMeta {
                steer: 0.1 * i as f64,
                left_lane_change: 1,
                lane_change_second_half: -1,
                obstacle_distance: 1000.0,
                ..Default::default()
            };
            s.add_image(&image(8, 6), meta).unwrap();
        }
        assert_eq!(s.index(), 5);

        assert_eq!(s.finish().unwrap(), 5);

        for i in 0..5 {
            let img = image::open(image_path(&dir, i)).unwrap();
            assert_eq!(img.dimensions(), (8, 6));
        }

        let csv = std::fs::read_to_string(dir.join(META_FILE_NAME)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "index,steer,left_lane_change,right_lane_change,lane_change_second_half,junk,\
            obstacle_distance"
        );
        assert_eq!(lines.len(), 6);
        assert!(lines[1].starts_with("0,0.0,1,0,-1,0,"));
    }

    #[test]
    fn test_wrong_size_rejected() {
        let mut s = saver("wrong_size", 10);

        assert!(matches!(
            s.add_image(&image(4, 6), ImageMeta::default()),
            Err(ImageSaverError::WrongSize { width: 4, .. })
        ));
        assert_eq!(s.index(), 0);

        assert_eq!(s.finish().unwrap(), 0);
        assert_eq!(s.finish().unwrap(), 0);
    }

    #[test]
    fn test_unsupported_channels() {
        let root = std::env::temp_dir().join("lc_image_saver_test").join("channels");
        assert!(matches!(
            BufferedImageSaver::new(root, 10, 8, 6, 2, "CameraRGB", 0),
            Err(ImageSaverError::UnsupportedChannels(2))
        ));
    }

    #[test]
    fn test_writer_queue_is_bounded() {
        let (tx, _rx) = batch_channel();

        assert!(tx.try_send(Vec::new()).is_ok());
        assert!(matches!(tx.try_send(Vec::new()), Err(TrySendError::Full(_))));
    }
}
