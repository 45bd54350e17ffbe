//! Minimal AVI (RIFF) writer for a single Motion-JPEG video stream.
//!
//! Layout:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih            main header (frame count patched on finish)
//!     LIST 'strl'
//!       strh 'vids'   stream header, handler 'MJPG'
//!       strf          BITMAPINFOHEADER
//!   LIST 'movi'
//!     '00dc' ...      one chunk per JPEG frame
//!   idx1              keyframe index, written on finish
//! ```

use std::io::{Seek, SeekFrom, Write};

use anyhow::{ensure, Context, Result};
use bytes::{BufMut, BytesMut};

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

const AVIH_SIZE: u32 = 56;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;
const STRL_SIZE: u32 = 4 + (8 + STRH_SIZE) + (8 + STRF_SIZE);
const HDRL_SIZE: u32 = 4 + (8 + AVIH_SIZE) + (8 + STRL_SIZE);

/// Header fields only known once every frame is written.
#[derive(Debug, Clone, Copy)]
struct Patches {
    riff_size: u64,
    max_bytes_per_sec: u64,
    total_frames: u64,
    avih_buffer_size: u64,
    stream_length: u64,
    strh_buffer_size: u64,
    movi_size: u64,
}

/// Streams JPEG frames into an AVI container.
///
/// `out` must be positioned at the start of an empty file. The container is
/// only valid after [`AviWriter::finish`].
pub struct AviWriter<W: Write + Seek> {
    out: W,
    fps: u32,
    patches: Patches,
    movi_start: u64,
    position: u64,
    index: Vec<(u32, u32)>,
    largest_frame: u32,
}

impl<W: Write + Seek> AviWriter<W> {
    /// Write the headers of a `width` x `height` video at `fps` frames per
    /// second.
    pub fn new(mut out: W, width: u32, height: u32, fps: u32) -> Result<Self> {
        ensure!(fps > 0, "AVI frame rate must be positive");

        let mut header = BytesMut::with_capacity(224);
        header.put_slice(b"RIFF");
        let riff_size = header.len() as u64;
        header.put_u32_le(0);
        header.put_slice(b"AVI ");

        header.put_slice(b"LIST");
        header.put_u32_le(HDRL_SIZE);
        header.put_slice(b"hdrl");

        header.put_slice(b"avih");
        header.put_u32_le(AVIH_SIZE);
        header.put_u32_le(1_000_000 / fps);
        let max_bytes_per_sec = header.len() as u64;
        header.put_u32_le(0);
        header.put_u32_le(0); // padding granularity
        header.put_u32_le(AVIF_HASINDEX);
        let total_frames = header.len() as u64;
        header.put_u32_le(0);
        header.put_u32_le(0); // initial frames
        header.put_u32_le(1); // streams
        let avih_buffer_size = header.len() as u64;
        header.put_u32_le(0);
        header.put_u32_le(width);
        header.put_u32_le(height);
        header.put_bytes(0, 16);

        header.put_slice(b"LIST");
        header.put_u32_le(STRL_SIZE);
        header.put_slice(b"strl");

        header.put_slice(b"strh");
        header.put_u32_le(STRH_SIZE);
        header.put_slice(b"vids");
        header.put_slice(b"MJPG");
        header.put_u32_le(0); // flags
        header.put_u16_le(0); // priority
        header.put_u16_le(0); // language
        header.put_u32_le(0); // initial frames
        header.put_u32_le(1); // scale
        header.put_u32_le(fps); // rate
        header.put_u32_le(0); // start
        let stream_length = header.len() as u64;
        header.put_u32_le(0);
        let strh_buffer_size = header.len() as u64;
        header.put_u32_le(0);
        header.put_u32_le(u32::MAX); // quality: codec default
        header.put_u32_le(0); // sample size
        header.put_u16_le(0);
        header.put_u16_le(0);
        header.put_u16_le(u16::try_from(width).unwrap_or(u16::MAX));
        header.put_u16_le(u16::try_from(height).unwrap_or(u16::MAX));

        header.put_slice(b"strf");
        header.put_u32_le(STRF_SIZE);
        header.put_u32_le(STRF_SIZE);
        header.put_i32_le(i32::try_from(width).unwrap_or(i32::MAX));
        header.put_i32_le(i32::try_from(height).unwrap_or(i32::MAX));
        header.put_u16_le(1); // planes
        header.put_u16_le(24); // bit count
        header.put_slice(b"MJPG");
        header.put_u32_le(width.saturating_mul(height).saturating_mul(3));
        header.put_bytes(0, 16);

        header.put_slice(b"LIST");
        let movi_size = header.len() as u64;
        header.put_u32_le(0);
        let movi_start = header.len() as u64;
        header.put_slice(b"movi");

        out.write_all(&header).context("writing AVI header")?;

        Ok(Self {
            out,
            fps,
            patches: Patches {
                riff_size,
                max_bytes_per_sec,
                total_frames,
                avih_buffer_size,
                stream_length,
                strh_buffer_size,
                movi_size,
            },
            movi_start,
            position: header.len() as u64,
            index: Vec::new(),
            largest_frame: 0,
        })
    }

    /// Append one JPEG-encoded frame.
    pub fn add_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        let size = u32::try_from(jpeg.len()).context("frame too large for AVI")?;
        let offset =
            u32::try_from(self.position - self.movi_start).context("AVI exceeds 4 GiB")?;

        self.out.write_all(b"00dc")?;
        self.out.write_all(&size.to_le_bytes())?;
        self.out.write_all(jpeg)?;
        let mut written = 8 + u64::from(size);
        if size % 2 == 1 {
            self.out.write_all(&[0])?;
            written += 1;
        }

        self.position += written;
        self.index.push((offset, size));
        self.largest_frame = self.largest_frame.max(size);
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> usize {
        self.index.len()
    }

    /// Write the index, patch the headers and hand back the output.
    pub fn finish(mut self) -> Result<W> {
        let index_start = self.position;
        let frames = u32::try_from(self.index.len()).context("too many AVI frames")?;

        let mut index = BytesMut::with_capacity(8 + 16 * self.index.len());
        index.put_slice(b"idx1");
        index.put_u32_le(frames.saturating_mul(16));
        for &(offset, size) in &self.index {
            index.put_slice(b"00dc");
            index.put_u32_le(AVIIF_KEYFRAME);
            index.put_u32_le(offset);
            index.put_u32_le(size);
        }
        self.out.write_all(&index).context("writing AVI index")?;
        let end = index_start + index.len() as u64;

        let p = self.patches;
        let riff = u32::try_from(end - 8).context("AVI exceeds 4 GiB")?;
        let movi = u32::try_from(index_start - p.movi_size - 4).context("AVI exceeds 4 GiB")?;
        self.patch(p.riff_size, riff)?;
        self.patch(p.movi_size, movi)?;
        self.patch(p.total_frames, frames)?;
        self.patch(p.stream_length, frames)?;
        self.patch(p.avih_buffer_size, self.largest_frame)?;
        self.patch(p.strh_buffer_size, self.largest_frame)?;
        self.patch(
            p.max_bytes_per_sec,
            self.largest_frame.saturating_mul(self.fps),
        )?;

        self.out.seek(SeekFrom::Start(end))?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn patch(&mut self, at: u64, value: u32) -> Result<()> {
        self.out.seek(SeekFrom::Start(at))?;
        self.out.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    #[test]
    fn test_header_layout() {
        let writer = AviWriter::new(Cursor::new(Vec::new()), 320, 200, 10).unwrap();
        let buf = writer.finish().unwrap().into_inner();

        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[8..12], b"AVI ");
        assert_eq!(&buf[12..16], b"LIST");
        assert_eq!(u32_at(&buf, 16), HDRL_SIZE);
        assert_eq!(&buf[20..24], b"hdrl");
        assert_eq!(&buf[24..28], b"avih");
        assert_eq!(u32_at(&buf, 32), 100_000);
        assert_eq!(&buf[212..216], b"LIST");
        assert_eq!(&buf[220..224], b"movi");
        assert_eq!(&buf[224..228], b"idx1");
        assert_eq!(buf.len(), 232);
        assert_eq!(u32_at(&buf, 4) as usize, buf.len() - 8);
    }

    #[test]
    fn test_frames_are_indexed_and_counted() {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), 4, 4, 5).unwrap();
        writer.add_frame(&[1, 2, 3]).unwrap();
        writer.add_frame(&[4, 5, 6, 7]).unwrap();
        assert_eq!(writer.frames(), 2);
        let buf = writer.finish().unwrap().into_inner();

        // avih total frames and strh length.
        assert_eq!(u32_at(&buf, 48), 2);
        assert_eq!(u32_at(&buf, 140), 2);

        // Odd-sized chunk padded to an even boundary.
        assert_eq!(&buf[224..228], b"00dc");
        assert_eq!(u32_at(&buf, 228), 3);
        assert_eq!(&buf[232..235], &[1, 2, 3]);
        assert_eq!(buf[235], 0);
        assert_eq!(&buf[236..240], b"00dc");

        let idx = 236 + 8 + 4;
        assert_eq!(&buf[idx..idx + 4], b"idx1");
        assert_eq!(u32_at(&buf, idx + 4), 32);
        // Offsets are relative to the 'movi' tag.
        assert_eq!(u32_at(&buf, idx + 12), AVIIF_KEYFRAME);
        assert_eq!(u32_at(&buf, idx + 16), 4);
        assert_eq!(u32_at(&buf, idx + 20), 3);
        assert_eq!(u32_at(&buf, idx + 32), 16);
        assert_eq!(u32_at(&buf, 216) as usize, idx - 220);
        assert_eq!(u32_at(&buf, 4) as usize, buf.len() - 8);
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        assert!(AviWriter::new(Cursor::new(Vec::new()), 4, 4, 0).is_err());
    }
}
