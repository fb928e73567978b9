use log::debug;

use crate::device::{Device, Session};
use crate::opcode::Opcode;
use crate::storage::{
    DiskStatus, Volume, BLOCK_SIZE, SECTOR_COUNT, SEGMENT_SIZE, TRACK_COUNT,
};

/// Highest selectable disk number.
pub const MAX_DISK_NO: u8 = 99;

/// Combine a track/sector pair into the linear block address used to index
/// the disk image: 9 track bits above 5 sector bits.
pub(crate) fn lba(track: u16, sector: u8) -> u16 {
    (track << 5) | sector as u16
}

/// The emulated disk controller. Disks are flat image files selected by disk
/// set and disk number; sectors are transferred one byte per bus access in
/// 128-byte segments. Addressing and I/O outcomes latch in a sticky error
/// register read back through its own opcode.
pub struct Drive<V> {
    volume: V,
    disk_set: u8,
    track: u16,
    sector: u8,
    error: DiskStatus,
    session: Session,
    buffer: [u8; SEGMENT_SIZE],
}

impl<V: Volume> Drive<V> {
    pub fn new(volume: V, disk_set: u8) -> Self {
        Drive {
            volume,
            disk_set,
            track: 0,
            sector: 0,
            error: DiskStatus::Ok,
            session: Session::new(),
            buffer: [0; SEGMENT_SIZE],
        }
    }

    /// Select the disk set, changing which image-file family subsequent disk
    /// selections resolve to. Set by the boot configuration, not by the bus.
    pub fn set_disk_set(&mut self, disk_set: u8) {
        self.disk_set = disk_set;
    }

    pub fn disk_set(&self) -> u8 {
        self.disk_set
    }

    pub fn last_error(&self) -> DiskStatus {
        self.error
    }

    fn image_name(&self, disk: u8) -> String {
        format!("DS{}N{:02}.DSK", self.disk_set, disk)
    }

    fn addressing_valid(&self) -> bool {
        self.track < TRACK_COUNT && (self.sector as u16) < SECTOR_COUNT
    }

    /// Validate the current track/sector pair. An out-of-range sector wins
    /// the tie-break when both are invalid.
    fn validate_selection(&mut self) {
        self.error = if self.addressing_valid() {
            DiskStatus::Ok
        } else if (self.sector as u16) < SECTOR_COUNT {
            DiskStatus::BadTrackNo
        } else {
            DiskStatus::BadSectorNo
        };
    }

    fn sel_disk(&mut self, byte: u8) -> Opcode {
        self.session.finish();
        if byte <= MAX_DISK_NO {
            let name = self.image_name(byte);
            self.error = match self.volume.open_image(&name) {
                Ok(()) => DiskStatus::Ok,
                Err(e) => e,
            };
        } else {
            debug!("Illegal disk number {}.", byte);
            self.error = DiskStatus::BadDiskNo;
        }
        Opcode::NoOp
    }

    fn sel_track(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::SelTrack);
        if step == 0 {
            self.track = byte as u16;
            self.session.advance();
        } else {
            self.track = ((byte as u16) << 8) | (self.track & 0x00FF);
            self.validate_selection();
            self.session.finish();
        }
        self.session.continuation()
    }

    fn sel_sect(&mut self, byte: u8) -> Opcode {
        self.session.finish();
        self.sector = byte;
        self.validate_selection();
        Opcode::NoOp
    }

    fn write_sect(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::WriteSect);
        if step == 0 && self.addressing_valid() && self.error == DiskStatus::Ok {
            if let Err(e) = self.volume.seek_block(lba(self.track, self.sector)) {
                self.error = e;
            }
        }
        // With an error latched the remaining bytes are still consumed, but
        // nothing further reaches the image.
        if self.error == DiskStatus::Ok {
            let offset = step as usize % SEGMENT_SIZE;
            self.buffer[offset] = byte;
            if offset == SEGMENT_SIZE - 1 {
                match self.volume.write_segment(&self.buffer) {
                    Ok(n) if n < SEGMENT_SIZE => self.error = DiskStatus::UnexpectedEof,
                    Ok(_) => {}
                    Err(e) => self.error = e,
                }
                if step as usize == BLOCK_SIZE - 1 && self.error == DiskStatus::Ok {
                    if let Err(e) = self.volume.finalize() {
                        self.error = e;
                    }
                }
            }
        }
        if step as usize == BLOCK_SIZE - 1 {
            self.session.finish();
        } else {
            self.session.advance();
        }
        self.session.continuation()
    }

    fn read_sect(&mut self, byte: &mut u8) -> Opcode {
        let step = self.session.step(Opcode::ReadSect);
        if step == 0 && self.addressing_valid() && self.error == DiskStatus::Ok {
            if let Err(e) = self.volume.seek_block(lba(self.track, self.sector)) {
                self.error = e;
            }
        }
        if self.error == DiskStatus::Ok {
            let offset = step as usize % SEGMENT_SIZE;
            if offset == 0 {
                match self.volume.read_segment(&mut self.buffer) {
                    Ok(n) if n < SEGMENT_SIZE => self.error = DiskStatus::UnexpectedEof,
                    Ok(_) => {}
                    Err(e) => self.error = e,
                }
            }
            *byte = if self.error == DiskStatus::Ok {
                self.buffer[offset]
            } else {
                0
            };
        } else {
            *byte = 0;
        }
        if step as usize == BLOCK_SIZE - 1 {
            self.session.finish();
        } else {
            self.session.advance();
        }
        self.session.continuation()
    }

    fn err_disk(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = self.error.code();
        Opcode::NoOp
    }

    fn sd_mount(&mut self, byte: &mut u8) -> Opcode {
        // The mount outcome goes straight over the bus; the error register
        // is not involved.
        self.session.finish();
        *byte = self.volume.mount().code();
        Opcode::NoOp
    }
}

impl<V: Volume> Device for Drive<V> {
    fn read(&mut self, opcode: Opcode, byte: &mut u8) -> Opcode {
        match opcode {
            Opcode::ErrDisk => self.err_disk(byte),
            Opcode::ReadSect => self.read_sect(byte),
            Opcode::SdMount => self.sd_mount(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }

    fn write(&mut self, opcode: Opcode, byte: u8) -> Opcode {
        match opcode {
            Opcode::SelDisk => self.sel_disk(byte),
            Opcode::SelTrack => self.sel_track(byte),
            Opcode::SelSect => self.sel_sect(byte),
            Opcode::WriteSect => self.write_sect(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }
}
