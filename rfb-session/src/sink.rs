//! Output sink interfaces.
//!
//! The engine hands every completed framebuffer update to an [`ImageSink`]
//! and every clipboard payload to a [`FileSink`]. Sinks are created through
//! factories: one image stream per session, one file stream per payload.
//!
//! The fork factories multiplex a stream onto any number of backends. Writes
//! stop at the first failing backend; `close` closes every backend and
//! reports the first failure.

use std::io::Read;
use std::sync::Arc;

use anyhow::Result;
use image::RgbaImage;
use rfb_common::Timestamp;

/// Destination for reconstructed frames of one session.
pub trait ImageSink: Send {
    /// Record `image` as the picture at `at`. Called in increasing
    /// timestamp order.
    fn write(&mut self, image: &RgbaImage, at: Timestamp) -> Result<()>;

    /// Flush any buffered final frame and finalise the artifact.
    fn close(&mut self) -> Result<()>;
}

/// Destination for one extracted payload.
pub trait FileSink: Send {
    fn write(&mut self, reader: &mut dyn Read, at: Timestamp) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait ImageSinkFactory: Send + Sync {
    fn create(&self) -> Box<dyn ImageSink>;
}

pub trait FileSinkFactory: Send + Sync {
    fn create(&self) -> Box<dyn FileSink>;
}

/// Fan-out over zero or more image backends.
#[derive(Clone, Default)]
pub struct ForkImageFactory {
    factories: Vec<Arc<dyn ImageSinkFactory>>,
}

impl ForkImageFactory {
    pub fn new(factories: Vec<Arc<dyn ImageSinkFactory>>) -> Self {
        Self { factories }
    }

    pub fn push(&mut self, factory: Arc<dyn ImageSinkFactory>) {
        self.factories.push(factory);
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl ImageSinkFactory for ForkImageFactory {
    fn create(&self) -> Box<dyn ImageSink> {
        Box::new(ForkImageSink {
            sinks: self.factories.iter().map(|f| f.create()).collect(),
        })
    }
}

struct ForkImageSink {
    sinks: Vec<Box<dyn ImageSink>>,
}

impl ImageSink for ForkImageSink {
    fn write(&mut self, image: &RgbaImage, at: Timestamp) -> Result<()> {
        for sink in &mut self.sinks {
            sink.write(image, at)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.sinks.iter_mut().map(|s| s.close()))
    }
}

/// Fan-out over zero or more file backends.
#[derive(Clone, Default)]
pub struct ForkFileFactory {
    factories: Vec<Arc<dyn FileSinkFactory>>,
}

impl ForkFileFactory {
    pub fn new(factories: Vec<Arc<dyn FileSinkFactory>>) -> Self {
        Self { factories }
    }

    pub fn push(&mut self, factory: Arc<dyn FileSinkFactory>) {
        self.factories.push(factory);
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl FileSinkFactory for ForkFileFactory {
    fn create(&self) -> Box<dyn FileSink> {
        Box::new(ForkFileSink {
            sinks: self.factories.iter().map(|f| f.create()).collect(),
        })
    }
}

struct ForkFileSink {
    sinks: Vec<Box<dyn FileSink>>,
}

impl FileSink for ForkFileSink {
    fn write(&mut self, reader: &mut dyn Read, at: Timestamp) -> Result<()> {
        // The reader can only be drained once.
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        for sink in &mut self.sinks {
            sink.write(&mut data.as_slice(), at)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        close_all(self.sinks.iter_mut().map(|s| s.close()))
    }
}

fn close_all(results: impl Iterator<Item = Result<()>>) -> Result<()> {
    let mut first = Ok(());
    for result in results {
        if let Err(e) = result {
            if first.is_ok() {
                first = Err(e);
            }
        }
    }
    first
}

/// Sinks that discard everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ImageSink for NullSink {
    fn write(&mut self, _image: &RgbaImage, _at: Timestamp) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FileSink for NullSink {
    fn write(&mut self, _reader: &mut dyn Read, _at: Timestamp) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl ImageSinkFactory for NullSink {
    fn create(&self) -> Box<dyn ImageSink> {
        Box::new(NullSink)
    }
}

impl FileSinkFactory for NullSink {
    fn create(&self) -> Box<dyn FileSink> {
        Box::new(NullSink)
    }
}
