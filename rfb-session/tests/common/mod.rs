//! Recording sinks and wire fixtures shared by the integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{Duration, TimeZone, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbaImage;
use parking_lot::Mutex;
use rfb_common::{Flow, Timestamp};
use rfb_protocol::messages::{
    FramebufferUpdate, PixelFormat, Rectangle, ServerInit, SetEncodings, SetPixelFormat,
    ZlibRectangle,
};
use rfb_session::{FileSink, FileSinkFactory, ImageSink, ImageSinkFactory};

/// Everything the sinks were handed.
#[derive(Default)]
pub struct Recording {
    pub frames: Vec<(RgbaImage, Timestamp)>,
    pub files: Vec<(Vec<u8>, Timestamp)>,
    pub image_streams: usize,
    pub image_closes: usize,
    pub file_closes: usize,
}

/// Image and file factory recording into one shared [`Recording`].
#[derive(Clone, Default)]
pub struct Recorder {
    pub recording: Arc<Mutex<Recording>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<(RgbaImage, Timestamp)> {
        self.recording.lock().frames.clone()
    }

    pub fn files(&self) -> Vec<(Vec<u8>, Timestamp)> {
        self.recording.lock().files.clone()
    }
}

struct RecordingSink {
    recording: Arc<Mutex<Recording>>,
}

impl ImageSinkFactory for Recorder {
    fn create(&self) -> Box<dyn ImageSink> {
        self.recording.lock().image_streams += 1;
        Box::new(RecordingSink {
            recording: Arc::clone(&self.recording),
        })
    }
}

impl FileSinkFactory for Recorder {
    fn create(&self) -> Box<dyn FileSink> {
        Box::new(RecordingSink {
            recording: Arc::clone(&self.recording),
        })
    }
}

impl ImageSink for RecordingSink {
    fn write(&mut self, image: &RgbaImage, at: Timestamp) -> anyhow::Result<()> {
        self.recording.lock().frames.push((image.clone(), at));
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.recording.lock().image_closes += 1;
        Ok(())
    }
}

impl FileSink for RecordingSink {
    fn write(&mut self, reader: &mut dyn Read, at: Timestamp) -> anyhow::Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.recording.lock().files.push((data, at));
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.recording.lock().file_closes += 1;
        Ok(())
    }
}

/// Capture time `ms` milliseconds into the test capture.
pub fn at(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(1_650_000_000_000).unwrap() + Duration::milliseconds(ms)
}

/// Flows of a connection from `client` port 49500 to a server on 5900.
pub fn client_flows() -> (Flow<IpAddr>, Flow<u16>) {
    (
        Flow::new(
            IpAddr::V4(Ipv4Addr::new(172, 16, 0, 5)),
            IpAddr::V4(Ipv4Addr::new(172, 16, 0, 9)),
        ),
        Flow::new(49500, 5900),
    )
}

pub fn server_init(width: u16, height: u16, pixel_format: PixelFormat) -> Vec<u8> {
    let mut buf = BytesMut::new();
    ServerInit {
        framebuffer_width: width,
        framebuffer_height: height,
        pixel_format,
        name: b"DESKTOP-4F2K".to_vec(),
    }
    .encode(&mut buf);
    buf.to_vec()
}

pub fn set_encodings(encodings: &[i32]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    SetEncodings {
        encodings: encodings.to_vec(),
    }
    .encode(&mut buf);
    buf.to_vec()
}

pub fn set_pixel_format(pixel_format: PixelFormat) -> Vec<u8> {
    let mut buf = BytesMut::new();
    SetPixelFormat { pixel_format }.encode(&mut buf);
    buf.to_vec()
}

pub fn framebuffer_update(rectangles: u16) -> Vec<u8> {
    let mut buf = BytesMut::new();
    FramebufferUpdate {
        number_of_rectangles: rectangles,
    }
    .encode(&mut buf);
    buf.to_vec()
}

pub fn rectangle_header(x: u16, y: u16, width: u16, height: u16, encoding: i32) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Rectangle {
        x,
        y,
        width,
        height,
        encoding,
    }
    .encode(&mut buf);
    buf.to_vec()
}

pub fn zlib_rectangle(header: Rectangle, data: Vec<u8>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    ZlibRectangle { header, data }.encode(&mut buf);
    buf.to_vec()
}

/// Compress `parts` as one zlib stream, sync-flushing after each part.
pub fn compress_continuous(parts: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    parts
        .iter()
        .map(|part| {
            encoder.write_all(part).unwrap();
            encoder.flush().unwrap();
            std::mem::take(encoder.get_mut())
        })
        .collect()
}

/// `count` pixels of the 32-bit `word` in little-endian byte order.
pub fn solid_le(word: u32, count: usize) -> Vec<u8> {
    word.to_le_bytes()
        .iter()
        .copied()
        .cycle()
        .take(count * 4)
        .collect()
}

/// `count` pixels of the 32-bit `word` in big-endian byte order.
pub fn solid_be(word: u32, count: usize) -> Vec<u8> {
    word.to_be_bytes()
        .iter()
        .copied()
        .cycle()
        .take(count * 4)
        .collect()
}
