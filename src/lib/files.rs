use log::warn;

use crate::device::{Device, Session};
use crate::opcode::Opcode;
use crate::storage::{DiskStatus, FileStore, FILE_INFO_LEN, SEGMENT_SIZE};

/// Minimal filesystem front-end over a path accumulated byte-by-byte.
/// Files are transferred in count-prefixed segments of up to 128 bytes at
/// offsets of `segment * 128`; directories are enumerated as fixed 18-byte
/// records. Outcomes latch in a status register mirroring the disk device's
/// error-register model.
pub struct FileProxy<F> {
    store: F,
    path: String,
    segment: u16,
    status: DiskStatus,
    session: Session,
    buffer: [u8; SEGMENT_SIZE],
    max_count: u8,
    record: [u8; FILE_INFO_LEN],
    dir_count: u16,
    dir_open: bool,
}

impl<F: FileStore> FileProxy<F> {
    pub fn new(store: F) -> Self {
        FileProxy {
            store,
            path: String::new(),
            segment: 0,
            status: DiskStatus::Ok,
            session: Session::new(),
            buffer: [0; SEGMENT_SIZE],
            max_count: 0,
            record: [0; FILE_INFO_LEN],
            dir_count: 0,
            dir_open: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn last_status(&self) -> DiskStatus {
        self.status
    }

    fn set_path(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::SetPath);
        if step == 0 {
            self.path.clear();
            self.store.close();
        }
        if byte == 0 {
            self.session.finish();
        } else {
            self.path.push(byte as char);
            self.session.advance();
        }
        self.session.continuation()
    }

    fn set_segment(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::SetSegment);
        if step == 0 {
            self.segment = byte as u16;
            self.session.advance();
        } else {
            self.segment |= (byte as u16) << 8;
            self.session.finish();
        }
        self.session.continuation()
    }

    fn segment_offset(&self) -> u64 {
        self.segment as u64 * SEGMENT_SIZE as u64
    }

    /// Open the accumulated path (if not already open) and position it at
    /// the current segment.
    fn prepare_io(&mut self, create: bool) -> DiskStatus {
        if self.path.is_empty() {
            return DiskStatus::NotOpened;
        }
        if let Err(e) = self.store.ensure_open(&self.path, create) {
            return e;
        }
        if let Err(e) = self.store.seek(self.segment_offset()) {
            return e;
        }
        DiskStatus::Ok
    }

    fn file_exists(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = self.store.exists(&self.path) as u8;
        Opcode::NoOp
    }

    fn read_dir(&mut self, byte: &mut u8) -> Opcode {
        let step = self.session.step(Opcode::ReadDir);
        if step == 0 {
            self.dir_count = 0;
            self.dir_open = !self.path.is_empty() && self.store.open_dir(&self.path).is_ok();
        }
        let offset = step as usize % FILE_INFO_LEN;
        if offset == 0 {
            // Record boundary: stage the next entry, or finish. A path that
            // names a plain file yields its own info exactly once.
            let entry = if self.dir_open {
                self.store.next_entry()
            } else if self.dir_count == 0 && !self.path.is_empty() {
                self.store.stat(&self.path).filter(|info| !info.directory)
            } else {
                None
            };
            match entry {
                Some(info) => {
                    self.record = info.encode();
                    self.dir_count += 1;
                }
                None => {
                    self.session.finish();
                    *byte = 0;
                    return Opcode::NoOp;
                }
            }
        }
        *byte = self.record[offset];
        self.session.advance();
        self.session.continuation()
    }

    fn read_file(&mut self, byte: &mut u8) -> Opcode {
        let step = self.session.step(Opcode::ReadFile);
        if step == 0 {
            self.max_count = 0;
            self.status = self.prepare_io(false);
            if self.status == DiskStatus::Ok {
                match self.store.read(&mut self.buffer) {
                    Ok(n) => self.max_count = n as u8,
                    Err(e) => self.status = e,
                }
            }
            *byte = self.max_count;
            if self.max_count == 0 {
                self.session.finish();
            } else {
                self.session.advance();
            }
        } else {
            let index = (step - 1) as usize;
            *byte = self.buffer[index];
            if index + 1 >= self.max_count as usize {
                self.session.finish();
            } else {
                self.session.advance();
            }
        }
        self.session.continuation()
    }

    fn write_file(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::WriteFile);
        if step == 0 {
            self.max_count = byte.min(SEGMENT_SIZE as u8);
            self.status = if self.path.is_empty() {
                DiskStatus::NotOpened
            } else {
                match self.store.ensure_open(&self.path, true) {
                    Ok(()) => DiskStatus::Ok,
                    Err(e) => e,
                }
            };
            if self.max_count == 0 {
                self.session.finish();
            } else {
                self.session.advance();
            }
        } else {
            self.buffer[(step - 1) as usize] = byte;
            if step == self.max_count as u16 {
                if self.status == DiskStatus::Ok {
                    self.status = self.flush_segment();
                }
                if self.status != DiskStatus::Ok {
                    warn!(
                        "Segment write to '{}' failed with status {}.",
                        self.path,
                        self.status.code()
                    );
                }
                self.session.finish();
            } else {
                self.session.advance();
            }
        }
        self.session.continuation()
    }

    fn flush_segment(&mut self) -> DiskStatus {
        if let Err(e) = self.store.seek(self.segment_offset()) {
            return e;
        }
        match self.store.write(&self.buffer[..self.max_count as usize]) {
            Ok(n) if n < self.max_count as usize => DiskStatus::UnexpectedEof,
            Ok(_) => DiskStatus::Ok,
            Err(e) => e,
        }
    }

    fn del_file(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = (!self.path.is_empty() && self.store.remove(&self.path)) as u8;
        Opcode::NoOp
    }

    fn mk_dir(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = (!self.path.is_empty() && self.store.mkdir(&self.path)) as u8;
        Opcode::NoOp
    }

    fn file_err(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = self.status.code();
        Opcode::NoOp
    }
}

impl<F: FileStore> Device for FileProxy<F> {
    fn read(&mut self, opcode: Opcode, byte: &mut u8) -> Opcode {
        match opcode {
            Opcode::ReadDir => self.read_dir(byte),
            Opcode::ReadFile => self.read_file(byte),
            Opcode::FileExists => self.file_exists(byte),
            Opcode::MkDir => self.mk_dir(byte),
            Opcode::DelFile => self.del_file(byte),
            Opcode::FileErr => self.file_err(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }

    fn write(&mut self, opcode: Opcode, byte: u8) -> Opcode {
        match opcode {
            Opcode::SetPath => self.set_path(byte),
            Opcode::SetSegment => self.set_segment(byte),
            Opcode::WriteFile => self.write_file(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }
}
