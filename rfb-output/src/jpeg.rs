//! JPEG frame directories.
//!
//! Each session gets its own directory `<first frame>.<id>` holding frames
//! named `<sequence>.<timestamp>.jpeg`. With a frame rate of zero every
//! completed update is written as it arrives. Otherwise the session is
//! resampled: the latest frame is repeated for every elapsed interval and
//! the final frame is written on close.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage, RgbaImage};
use rfb_common::{file_stamp, Timestamp};
use rfb_session::{ImageSink, ImageSinkFactory};
use tracing::debug;

use crate::frame_interval;

/// Encode `image` as a baseline JPEG. Alpha is dropped.
pub fn encode_jpeg<W: Write>(image: &RgbaImage, quality: u8, out: W) -> Result<()> {
    let rgb: RgbImage = image.convert();
    JpegEncoder::new_with_quality(out, quality.clamp(1, 100))
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .context("encoding JPEG")
}

pub struct JpegFactory {
    directory: PathBuf,
    fps: u32,
    quality: u8,
    next_id: AtomicUsize,
}

impl JpegFactory {
    pub fn new(directory: impl AsRef<Path>, fps: u32, quality: u8) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            fps,
            quality,
            next_id: AtomicUsize::new(0),
        }
    }
}

impl ImageSinkFactory for JpegFactory {
    fn create(&self) -> Box<dyn ImageSink> {
        Box::new(JpegStream {
            root: self.directory.clone(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            fps: self.fps,
            quality: self.quality,
            dir: None,
            next: None,
            frame: None,
        })
    }
}

struct FrameDir {
    path: PathBuf,
    sequence: u64,
    quality: u8,
}

impl FrameDir {
    fn create(root: &Path, id: usize, quality: u8, first: Timestamp) -> Result<Self> {
        let path = root.join(format!("{}.{:02}", file_stamp(first), id));
        fs::create_dir_all(&path).with_context(|| format!("creating {}", path.display()))?;
        debug!(path = %path.display(), "frame directory created");
        Ok(Self {
            path,
            sequence: 0,
            quality,
        })
    }

    fn save(&mut self, frame: &RgbaImage, at: Timestamp) -> Result<()> {
        let path = self
            .path
            .join(format!("{:06}.{}.jpeg", self.sequence, file_stamp(at)));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        self.sequence += 1;

        let mut out = BufWriter::new(file);
        encode_jpeg(frame, self.quality, &mut out)?;
        out.flush()
            .with_context(|| format!("writing {}", path.display()))
    }
}

struct JpegStream {
    root: PathBuf,
    id: usize,
    fps: u32,
    quality: u8,
    dir: Option<FrameDir>,
    next: Option<Timestamp>,
    frame: Option<RgbaImage>,
}

impl ImageSink for JpegStream {
    fn write(&mut self, image: &RgbaImage, at: Timestamp) -> Result<()> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => FrameDir::create(&self.root, self.id, self.quality, at)?,
        };
        let dir = self.dir.insert(dir);

        if self.fps == 0 {
            self.next = Some(at);
            return dir.save(image, at);
        }

        let interval = frame_interval(self.fps);
        let mut next = *self.next.get_or_insert(at + interval);
        while next < at {
            if let Some(frame) = &self.frame {
                dir.save(frame, next)?;
            }
            next = next + interval;
            self.next = Some(next);
        }
        self.frame = Some(image.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.fps == 0 {
            return Ok(());
        }
        match (self.dir.as_mut(), &self.frame, self.next) {
            (Some(dir), Some(frame), Some(next)) => dir.save(frame, next),
            _ => Ok(()),
        }
    }
}
