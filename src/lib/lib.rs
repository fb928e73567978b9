mod clock;
mod device;
mod dispatch;
mod drive;
mod files;
mod i2c;
mod opcode;
mod rtc;
mod storage;

use std::path::Path;

pub use crate::clock::Clock;
pub use crate::device::{Device, Session};
pub use crate::dispatch::Dispatcher;
pub use crate::drive::{Drive, MAX_DISK_NO};
pub use crate::files::FileProxy;
pub use crate::i2c::{DisconnectedI2c, I2cBus, I2cError, I2cPort, TRANSFER_CAP};
pub use crate::opcode::{Direction, Opcode};
pub use crate::rtc::{HostRtc, NoRtc, Rtc, RtcSnapshot, SNAPSHOT_LEN};
pub use crate::storage::{
    DiskStatus, FileInfo, FileStore, HostStore, HostVolume, MediaMonitor, MediaState,
    StoreResult, Volume, BLOCKS_PER_IMAGE, BLOCK_SIZE, FILE_INFO_LEN, IMAGE_SIZE,
    SECTOR_COUNT, SEGMENT_SIZE, TRACK_COUNT,
};

/// A dispatcher wired to the host-side collaborators.
pub type HostDispatcher = Dispatcher<HostVolume, HostStore, HostRtc, DisconnectedI2c>;

/// Assemble the full subsystem over a directory standing in for the SD card.
pub fn host_dispatcher(
    sd_root: impl AsRef<Path>,
    disk_set: u8,
    media: Option<MediaState>,
) -> HostDispatcher {
    let root = sd_root.as_ref();
    let volume = match media {
        Some(state) => HostVolume::with_media(root, state),
        None => HostVolume::new(root),
    };
    Dispatcher::new(
        Drive::new(volume, disk_set),
        FileProxy::new(HostStore::new(root)),
        Clock::new(HostRtc),
        I2cPort::new(DisconnectedI2c),
    )
}

/// Initialise logging for tests. The logger can only be initialised once,
/// but test order is unknown, so the result is ignored.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use simplelog::{Config, LevelFilter, TestLogger};

    let _ = TestLogger::init(LevelFilter::Trace, Config::default());
}
