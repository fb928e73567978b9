use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::interface::*;
use super::media::MediaState;

/// Disk-image access over a directory on the host filesystem, standing in
/// for the SD card of the real hardware. Images are flat files named by the
/// block-storage device; the handle stays open until a different image is
/// selected.
pub struct HostVolume {
    root: PathBuf,
    media: Option<MediaState>,
    image: Option<File>,
    image_name: String,
}

impl HostVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostVolume {
            root: root.into(),
            media: None,
            image: None,
            image_name: String::new(),
        }
    }

    /// Attach a media-presence flag; a mount with the medium absent reports
    /// not-ready.
    pub fn with_media(root: impl Into<PathBuf>, media: MediaState) -> Self {
        let mut volume = HostVolume::new(root);
        volume.media = Some(media);
        volume
    }

    /// Provision an empty full-size disk image. Used by tests and tooling;
    /// the device itself never creates images.
    pub fn create_image(&self, name: &str) -> io::Result<()> {
        let file = File::create(self.root.join(name))?;
        file.set_len(IMAGE_SIZE)
    }

    fn image_mut(&mut self) -> StoreResult<&mut File> {
        self.image.as_mut().ok_or(DiskStatus::NotOpened)
    }
}

impl Volume for HostVolume {
    fn mount(&mut self) -> DiskStatus {
        if let Some(media) = &self.media {
            if !media.present() {
                return DiskStatus::NotReady;
            }
        }
        if self.root.is_dir() {
            DiskStatus::Ok
        } else {
            DiskStatus::NotReady
        }
    }

    fn open_image(&mut self, name: &str) -> StoreResult<()> {
        if self.image.is_some() && self.image_name == name {
            return Ok(());
        }
        let path = self.root.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                debug!("Disk image '{}' unavailable: {}.", name, e);
                self.image = None;
                self.image_name.clear();
                match e.kind() {
                    ErrorKind::NotFound => DiskStatus::NoFile,
                    _ => DiskStatus::NotOpened,
                }
            })?;
        info!("Opened disk image '{}'.", name);
        self.image = Some(file);
        self.image_name = name.to_string();
        Ok(())
    }

    fn seek_block(&mut self, lba: u16) -> StoreResult<()> {
        let file = self.image_mut()?;
        let offset = lba as u64 * BLOCK_SIZE as u64;
        file.seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|_| DiskStatus::DiskErr)
    }

    fn read_segment(&mut self, buf: &mut [u8; SEGMENT_SIZE]) -> StoreResult<usize> {
        let file = self.image_mut()?;
        read_full(file, buf).map_err(|_| DiskStatus::NotReady)
    }

    fn write_segment(&mut self, buf: &[u8; SEGMENT_SIZE]) -> StoreResult<usize> {
        let file = self.image_mut()?;
        file.write_all(buf)
            .map(|_| SEGMENT_SIZE)
            .map_err(|_| DiskStatus::NotReady)
    }

    fn finalize(&mut self) -> StoreResult<()> {
        let file = self.image_mut()?;
        file.sync_data().map_err(|_| DiskStatus::DiskErr)
    }
}

/// Fill as much of `buf` as the file has left, tolerating partial reads.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// File-proxy backend over the host filesystem, rooted at the SD directory.
/// Keeps a single open file handle, like the firmware it replaces.
pub struct HostStore {
    root: PathBuf,
    file: Option<File>,
    open_name: String,
    dir: Option<fs::ReadDir>,
}

impl HostStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostStore {
            root: root.into(),
            file: None,
            open_name: String::new(),
            dir: None,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn file_mut(&mut self) -> StoreResult<&mut File> {
        self.file.as_mut().ok_or(DiskStatus::NotOpened)
    }
}

fn info_for(name: &str, metadata: &fs::Metadata) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: metadata.len().min(u32::MAX as u64) as u32,
        directory: metadata.is_dir(),
    }
}

impl FileStore for HostStore {
    fn exists(&self, path: &str) -> bool {
        !path.is_empty() && self.resolve(path).exists()
    }

    fn ensure_open(&mut self, path: &str, create: bool) -> StoreResult<()> {
        if self.file.is_some() && self.open_name == path {
            return Ok(());
        }
        let full = self.resolve(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(&full)
            .map_err(|e| {
                debug!("Failed to open '{}': {}.", path, e);
                match e.kind() {
                    ErrorKind::NotFound => DiskStatus::NoFile,
                    _ => DiskStatus::NotOpened,
                }
            })?;
        self.file = Some(file);
        self.open_name = path.to_string();
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
        self.open_name.clear();
    }

    fn seek(&mut self, offset: u64) -> StoreResult<()> {
        self.file_mut()?
            .seek(SeekFrom::Start(offset))
            .map(|_| ())
            .map_err(|_| DiskStatus::DiskErr)
    }

    fn read(&mut self, buf: &mut [u8]) -> StoreResult<usize> {
        let file = self.file_mut()?;
        read_full(file, buf).map_err(|_| DiskStatus::NotReady)
    }

    fn write(&mut self, data: &[u8]) -> StoreResult<usize> {
        self.file_mut()?
            .write_all(data)
            .map(|_| data.len())
            .map_err(|_| DiskStatus::NotReady)
    }

    fn open_dir(&mut self, path: &str) -> StoreResult<()> {
        match fs::read_dir(self.resolve(path)) {
            Ok(entries) => {
                self.dir = Some(entries);
                Ok(())
            }
            Err(e) => {
                self.dir = None;
                debug!("Failed to enumerate '{}': {}.", path, e);
                Err(DiskStatus::NoFile)
            }
        }
    }

    fn next_entry(&mut self) -> Option<FileInfo> {
        let entries = self.dir.as_mut()?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            if let Ok(metadata) = entry.metadata() {
                return Some(info_for(&entry.file_name().to_string_lossy(), &metadata));
            }
        }
        None
    }

    fn stat(&self, path: &str) -> Option<FileInfo> {
        let full = self.resolve(path);
        let metadata = fs::metadata(&full).ok()?;
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(info_for(&name, &metadata))
    }

    fn remove(&mut self, path: &str) -> bool {
        if self.open_name == path {
            self.close();
        }
        let removed = fs::remove_file(self.resolve(path)).is_ok();
        if !removed {
            warn!("Failed to delete '{}'.", path);
        }
        removed
    }

    fn mkdir(&mut self, path: &str) -> bool {
        fs::create_dir(self.resolve(path)).is_ok()
    }
}
