//! Block source implementation for physical disks and image files.

use crate::platform;
use imago_core::{BlockSource, Device, ImagingError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A read-only block source backed by a file handle with positioned reads.
///
/// `DiskSource` serves the imaging engine from any file-like source:
/// - Physical disk devices (`/dev/sda`, `/dev/nvme0n1`, `\\.\PhysicalDrive0`)
/// - Partition devices (`/dev/sda1`, ...)
/// - Disk image files (`.img`, `.raw`, ...)
///
/// Every read names its own offset, so one `DiskSource` can be shared by
/// concurrent reader workers. Dropping the source closes the handle.
#[derive(Debug)]
pub struct DiskSource {
    file: File,
    path: PathBuf,
    size: u64,
    native_block_size: u64,
}

impl DiskSource {
    /// Opens the source read-only and resolves its size and native block
    /// size up front.
    ///
    /// Fails with [`ImagingError::DeviceUnavailable`] if the path cannot
    /// be opened or its size cannot be queried. A zero-sized source opens
    /// fine here; the job layer rejects it before any copy starts.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|source| ImagingError::DeviceUnavailable {
                path: path.display().to_string(),
                source,
            })?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
            let _ = fadvise(&file, 0, None, Advice::NoReuse);
        }

        let size = resolve_size(&mut file, path)?;
        let native_block_size = probe_block_size(path);

        debug!(
            path = %path.display(),
            size,
            native_block_size,
            "opened block source"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            native_block_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn native_block_size(&self) -> u64 {
        self.native_block_size
    }

    /// Builds the device record the engine consumes, labelled with the
    /// final path component.
    pub fn device(&self) -> Device {
        let label = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());

        Device::new(
            self.path.display().to_string(),
            label,
            self.size,
            self.native_block_size,
        )
    }
}

impl BlockSource for DiskSource {
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        platform::read_at(&self.file, offset, buffer).map_err(|source| {
            ImagingError::ReadFailure { offset, source }
        })
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Regular files report their length in metadata; block devices need an
/// end-seek.
fn resolve_size(file: &mut File, path: &Path) -> Result<u64> {
    let unavailable = |source| ImagingError::DeviceUnavailable {
        path: path.display().to_string(),
        source,
    };

    let metadata = file.metadata().map_err(unavailable)?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let size = file.seek(SeekFrom::End(0)).map_err(unavailable)?;
    file.seek(SeekFrom::Start(0)).map_err(unavailable)?;
    Ok(size)
}

fn probe_block_size(path: &Path) -> u64 {
    if path.starts_with("/dev/") {
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            let sysfs = format!("/sys/class/block/{name}/queue/logical_block_size");
            if let Ok(content) = std::fs::read_to_string(&sysfs) {
                if let Ok(size) = content.trim().parse::<u64>() {
                    if size > 0 {
                        return size;
                    }
                }
            }
        }
        // Modern devices without a sysfs answer are almost always 4K.
        return 4096;
    }

    512
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_source_basic() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"Hello, World! This is test data for DiskSource.";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();

        let source = DiskSource::open(temp_file.path()).unwrap();
        assert_eq!(source.size(), test_data.len() as u64);

        let mut buffer = vec![0u8; 13];
        let bytes_read = source.read_at(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 13);
        assert_eq!(&buffer, b"Hello, World!");

        let mut buffer = vec![0u8; 4];
        let bytes_read = source.read_at(7, &mut buffer).unwrap();
        assert_eq!(bytes_read, 4);
        assert_eq!(&buffer, b"Worl");
    }

    #[test]
    fn test_read_beyond_end_is_short() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Short").unwrap();
        temp_file.flush().unwrap();

        let source = DiskSource::open(temp_file.path()).unwrap();

        let mut buffer = vec![0u8; 100];
        let bytes_read = source.read_at(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 5);
    }

    #[test]
    fn test_missing_path_is_unavailable() {
        let err = DiskSource::open("/definitely/not/here.img").unwrap_err();
        assert!(matches!(err, ImagingError::DeviceUnavailable { .. }));
    }

    #[test]
    fn test_concurrent_positioned_reads() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..8192u32).map(|i| (i % 256) as u8).collect();
        temp_file.write_all(&data).unwrap();
        temp_file.flush().unwrap();

        let source = Arc::new(DiskSource::open(temp_file.path()).unwrap());

        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let source = Arc::clone(&source);
            let expected = data.clone();
            handles.push(std::thread::spawn(move || {
                let offset = worker * 2048;
                let mut buffer = vec![0u8; 2048];
                source.read_full_at(offset, &mut buffer).unwrap();
                assert_eq!(
                    buffer,
                    &expected[offset as usize..offset as usize + 2048]
                );
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_device_record_uses_file_name() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0u8; 1024]).unwrap();
        temp_file.flush().unwrap();

        let source = DiskSource::open(temp_file.path()).unwrap();
        let device = source.device();

        assert_eq!(device.size_bytes, 1024);
        assert_eq!(device.native_block_size, 512);
        assert!(!device.label.is_empty());
    }
}
