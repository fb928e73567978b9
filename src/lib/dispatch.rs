use log::trace;

use crate::clock::Clock;
use crate::device::Device;
use crate::drive::Drive;
use crate::files::FileProxy;
use crate::i2c::{I2cBus, I2cPort};
use crate::opcode::{Direction, Opcode};
use crate::rtc::Rtc;
use crate::storage::{FileStore, Volume};

/// Routes each bus access to the device owning its opcode. The mapping is
/// fixed at build time; the dispatcher holds no transfer state of its own.
/// Unowned opcodes and wrong-direction accesses are answered with the idle
/// sentinel and have no side effect.
pub struct Dispatcher<V, F, R, B> {
    drive: Drive<V>,
    files: FileProxy<F>,
    clock: Clock<R>,
    port: I2cPort<B>,
}

impl<V, F, R, B> Dispatcher<V, F, R, B>
where
    V: Volume,
    F: FileStore,
    R: Rtc,
    B: I2cBus,
{
    pub fn new(
        drive: Drive<V>,
        files: FileProxy<F>,
        clock: Clock<R>,
        port: I2cPort<B>,
    ) -> Self {
        Dispatcher {
            drive,
            files,
            clock,
            port,
        }
    }

    /// Perform one bus access: route the opcode, exchange one byte, and
    /// return the continuation opcode for the caller to compare against
    /// `Opcode::NoOp`.
    pub fn handle(&mut self, raw: u8, direction: Direction, byte: &mut u8) -> Opcode {
        let opcode = match Opcode::decode(raw) {
            Some(opcode) => opcode,
            None => {
                trace!("Unowned opcode 0x{:02X} ignored.", raw);
                return Opcode::NoOp;
            }
        };
        if opcode.direction() != Some(direction) {
            trace!("Opcode 0x{:02X} accessed with the wrong direction.", raw);
            return Opcode::NoOp;
        }

        use Opcode::*;
        let device: &mut dyn Device = match opcode {
            SelDisk | SelTrack | SelSect | WriteSect | ErrDisk | ReadSect | SdMount => {
                &mut self.drive
            }
            SetPath | SetSegment | WriteFile | ReadDir | ReadFile | FileExists | MkDir
            | DelFile | FileErr => &mut self.files,
            DateTime => &mut self.clock,
            I2cAddr | I2cWrite | I2cProbe | I2cRead | I2cStat => &mut self.port,
            NoOp => return Opcode::NoOp,
        };

        match direction {
            Direction::Read => device.read(opcode, byte),
            Direction::Write => device.write(opcode, *byte),
        }
    }

    pub fn drive(&self) -> &Drive<V> {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Drive<V> {
        &mut self.drive
    }

    pub fn files(&self) -> &FileProxy<F> {
        &self.files
    }

    pub fn clock(&self) -> &Clock<R> {
        &self.clock
    }

    pub fn port(&self) -> &I2cPort<B> {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;
    use crate::i2c::DisconnectedI2c;
    use crate::rtc::NoRtc;
    use crate::storage::{DiskStatus, HostStore, HostVolume};
    use tempfile::TempDir;

    type TestDispatcher = Dispatcher<HostVolume, HostStore, NoRtc, DisconnectedI2c>;

    fn fixture() -> (TestDispatcher, TempDir) {
        init_test_logging();
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let dispatcher = Dispatcher::new(
            Drive::new(HostVolume::new(root), 0),
            FileProxy::new(HostStore::new(root)),
            Clock::new(NoRtc),
            I2cPort::new(DisconnectedI2c),
        );
        (dispatcher, temp_dir)
    }

    #[test]
    fn test_unknown_opcode_is_idle() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 0xEE;
        assert_eq!(bus.handle(0x42, Direction::Read, &mut byte), Opcode::NoOp);
        assert_eq!(bus.handle(0x42, Direction::Write, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 0xEE);
    }

    #[test]
    fn test_idle_opcode_is_inert() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 0xEE;
        assert_eq!(bus.handle(0xFF, Direction::Read, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 0xEE);
    }

    #[test]
    fn test_wrong_direction_has_no_side_effect() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 100;
        // SELDISK is a write opcode: reading it must not select a disk.
        assert_eq!(
            bus.handle(Opcode::SelDisk as u8, Direction::Read, &mut byte),
            Opcode::NoOp
        );
        assert_eq!(byte, 100);
        assert_eq!(bus.drive().last_error(), DiskStatus::Ok);

        // ERRDISK is a read opcode: writing it is ignored.
        assert_eq!(
            bus.handle(Opcode::ErrDisk as u8, Direction::Write, &mut byte),
            Opcode::NoOp
        );
    }

    #[test]
    fn test_routes_to_drive() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 100;
        bus.handle(Opcode::SelDisk as u8, Direction::Write, &mut byte);
        let mut error = 0;
        bus.handle(Opcode::ErrDisk as u8, Direction::Read, &mut error);
        assert_eq!(error, DiskStatus::BadDiskNo.code());
    }

    #[test]
    fn test_routes_to_files() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 0;
        bus.handle(Opcode::SetPath as u8, Direction::Write, &mut byte);
        let mut exists = 0xEE;
        assert_eq!(
            bus.handle(Opcode::FileExists as u8, Direction::Read, &mut exists),
            Opcode::NoOp
        );
        assert_eq!(exists, 0);
    }

    #[test]
    fn test_routes_to_clock_and_port() {
        let (mut bus, _temp_dir) = fixture();
        // Absent clock: idle, byte untouched.
        let mut byte = 0xEE;
        assert_eq!(
            bus.handle(Opcode::DateTime as u8, Direction::Read, &mut byte),
            Opcode::NoOp
        );
        assert_eq!(byte, 0xEE);

        // Disconnected I2C: probe answers false.
        let mut ack = 0xEE;
        assert_eq!(
            bus.handle(Opcode::I2cProbe as u8, Direction::Read, &mut ack),
            Opcode::NoOp
        );
        assert_eq!(ack, 0);
    }

    #[test]
    fn test_multi_byte_operation_spans_calls() {
        let (mut bus, _temp_dir) = fixture();
        let mut byte = 0x34;
        assert_eq!(
            bus.handle(Opcode::SelTrack as u8, Direction::Write, &mut byte),
            Opcode::SelTrack
        );
        byte = 0x00;
        assert_eq!(
            bus.handle(Opcode::SelTrack as u8, Direction::Write, &mut byte),
            Opcode::NoOp
        );
        let mut error = 0xEE;
        bus.handle(Opcode::ErrDisk as u8, Direction::Read, &mut error);
        assert_eq!(error, DiskStatus::Ok.code());
    }
}
