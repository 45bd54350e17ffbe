//! Motion-JPEG AVI videos, one per session, at a fixed frame rate.

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use image::RgbaImage;
use rfb_common::{file_stamp, Timestamp};
use rfb_session::{ImageSink, ImageSinkFactory};
use tracing::{debug, warn};

use crate::avi::AviWriter;
use crate::{encode_jpeg, frame_interval};

pub struct MjpegFactory {
    directory: PathBuf,
    fps: u32,
    quality: u8,
    next_id: AtomicUsize,
}

impl MjpegFactory {
    /// A frame rate of zero is raised to one.
    pub fn new(directory: impl AsRef<Path>, fps: u32, quality: u8) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            fps: fps.max(1),
            quality,
            next_id: AtomicUsize::new(0),
        }
    }
}

impl ImageSinkFactory for MjpegFactory {
    fn create(&self) -> Box<dyn ImageSink> {
        Box::new(MjpegStream {
            directory: self.directory.clone(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            fps: self.fps,
            quality: self.quality,
            writer: None,
            next: None,
            frame: None,
        })
    }
}

struct MjpegStream {
    directory: PathBuf,
    id: usize,
    fps: u32,
    quality: u8,
    writer: Option<AviWriter<BufWriter<File>>>,
    next: Option<Timestamp>,
    frame: Option<RgbaImage>,
}

impl MjpegStream {
    fn open(&self, image: &RgbaImage, first: Timestamp) -> Result<AviWriter<BufWriter<File>>> {
        let path = self
            .directory
            .join(format!("{}.{:02}.avi", file_stamp(first), self.id));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        debug!(path = %path.display(), width = image.width(), height = image.height(), "video opened");
        AviWriter::new(BufWriter::new(file), image.width(), image.height(), self.fps)
    }

    fn encode(&self, frame: &RgbaImage) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        encode_jpeg(frame, self.quality, &mut jpeg)?;
        Ok(jpeg)
    }
}

impl ImageSink for MjpegStream {
    fn write(&mut self, image: &RgbaImage, at: Timestamp) -> Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open(image, at)?,
        };
        self.writer = Some(writer);

        let interval = frame_interval(self.fps);
        let mut next = *self.next.get_or_insert(at + interval);
        if next < at {
            // The previous frame is encoded once and repeated.
            if let Some(frame) = &self.frame {
                let jpeg = self.encode(frame)?;
                if let Some(writer) = self.writer.as_mut() {
                    while next < at {
                        writer.add_frame(&jpeg)?;
                        next = next + interval;
                        self.next = Some(next);
                    }
                }
            }
        }
        self.frame = Some(image.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        if let Some(frame) = &self.frame {
            let last = self.encode(frame).and_then(|jpeg| writer.add_frame(&jpeg));
            if let Err(error) = last {
                warn!(%error, "final video frame dropped");
            }
        }
        let frames = writer.frames();
        writer.finish()?;
        debug!(frames, "video closed");
        Ok(())
    }
}
