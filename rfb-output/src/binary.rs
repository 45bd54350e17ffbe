//! Raw payload files: each payload lands in `<timestamp>.<id>.bin`.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rfb_common::{file_stamp, Timestamp};
use rfb_session::{FileSink, FileSinkFactory};
use tracing::debug;

pub struct BinaryFactory {
    directory: PathBuf,
    next_id: AtomicUsize,
}

impl BinaryFactory {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl FileSinkFactory for BinaryFactory {
    fn create(&self) -> Box<dyn FileSink> {
        Box::new(BinaryFile {
            directory: self.directory.clone(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        })
    }
}

struct BinaryFile {
    directory: PathBuf,
    id: usize,
}

impl FileSink for BinaryFile {
    fn write(&mut self, reader: &mut dyn Read, at: Timestamp) -> Result<()> {
        let path = self
            .directory
            .join(format!("{}.{:02}.bin", file_stamp(at), self.id));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        let mut out = BufWriter::new(file);
        let size = io::copy(reader, &mut out)
            .and_then(|size| out.flush().map(|()| size))
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), size, "payload written");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_payload_file_name_and_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = BinaryFactory::new(tmp.path());
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let mut first = factory.create();
        first.write(&mut &b"secret"[..], at).unwrap();
        first.close().unwrap();
        let mut second = factory.create();
        second.write(&mut &b"other"[..], at).unwrap();

        let path = tmp.path().join("2024-03-09T14-05-07,000.00.bin");
        assert_eq!(std::fs::read(path).unwrap(), b"secret");
        let path = tmp.path().join("2024-03-09T14-05-07,000.01.bin");
        assert_eq!(std::fs::read(path).unwrap(), b"other");
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let factory = BinaryFactory::new(tmp.path());
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let mut sink = factory.create();
        sink.write(&mut &b"one"[..], at).unwrap();
        assert!(sink.write(&mut &b"two"[..], at).is_err());

        let path = tmp.path().join("2024-03-09T14-05-07,000.00.bin");
        assert_eq!(std::fs::read(path).unwrap(), b"one");
    }
}
