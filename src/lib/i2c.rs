use log::warn;

use crate::device::{Device, Session};
use crate::opcode::Opcode;

/// Largest streamable transfer; descriptors asking for more are clamped.
pub const TRANSFER_CAP: usize = 128;

/// Failure modes of a bulk transaction, encoded as the wire status values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cError {
    AddressNack = 2,
    DataNack = 3,
    Bus = 4,
}

/// The raw I2C collaborator: probe plus single bulk transactions. The port
/// device turns these into per-byte streams.
pub trait I2cBus {
    fn probe(&mut self, addr: u8) -> bool;
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, I2cError>;
    fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), I2cError>;
}

/// A bus with nothing attached: every probe fails and every transfer is
/// address-NACKed. Used when the hardware option is not fitted.
pub struct DisconnectedI2c;

impl I2cBus for DisconnectedI2c {
    fn probe(&mut self, _addr: u8) -> bool {
        false
    }

    fn read(&mut self, _addr: u8, _buf: &mut [u8]) -> Result<usize, I2cError> {
        Err(I2cError::AddressNack)
    }

    fn write(&mut self, _addr: u8, _data: &[u8]) -> Result<(), I2cError> {
        Err(I2cError::AddressNack)
    }
}

/// I2C passthrough device. A transfer descriptor (7-bit address, length) is
/// set once by two writes; streamed reads perform one bulk transaction up
/// front and emit buffered bytes, streamed writes accumulate and commit on
/// the final byte. The last transaction outcome is readable as a status
/// byte, like the disk error register.
pub struct I2cPort<B> {
    bus: B,
    addr: u8,
    transfer: u8,
    avail: u8,
    status: u8,
    session: Session,
    buffer: [u8; TRANSFER_CAP],
}

impl<B: I2cBus> I2cPort<B> {
    pub fn new(bus: B) -> Self {
        I2cPort {
            bus,
            addr: 0,
            transfer: 0,
            avail: 0,
            status: 0,
            session: Session::new(),
            buffer: [0; TRANSFER_CAP],
        }
    }

    pub fn last_status(&self) -> u8 {
        self.status
    }

    fn set_addr(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::I2cAddr);
        if step == 0 {
            self.addr = byte & 0x7F;
            self.session.advance();
        } else {
            self.transfer = byte.min(TRANSFER_CAP as u8);
            self.session.finish();
        }
        self.session.continuation()
    }

    fn probe(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = self.bus.probe(self.addr) as u8;
        Opcode::NoOp
    }

    fn stream_read(&mut self, byte: &mut u8) -> Opcode {
        let step = self.session.step(Opcode::I2cRead);
        if step == 0 {
            self.avail = 0;
            self.status = 0;
            if self.transfer == 0 {
                self.session.finish();
                return Opcode::NoOp;
            }
            match self.bus.read(self.addr, &mut self.buffer[..self.transfer as usize]) {
                Ok(n) => self.avail = n as u8,
                Err(e) => {
                    self.status = e as u8;
                    warn!("I2C read of {} bytes from 0x{:02X} failed.", self.transfer, self.addr);
                }
            }
            if self.avail == 0 {
                self.session.finish();
                *byte = 0;
                return Opcode::NoOp;
            }
        }
        *byte = self.buffer[step as usize];
        if step + 1 >= self.avail as u16 {
            self.session.finish();
        } else {
            self.session.advance();
        }
        self.session.continuation()
    }

    fn stream_write(&mut self, byte: u8) -> Opcode {
        let step = self.session.step(Opcode::I2cWrite);
        if step == 0 {
            self.status = 0;
            if self.transfer == 0 {
                self.session.finish();
                return Opcode::NoOp;
            }
        }
        self.buffer[step as usize] = byte;
        if step + 1 >= self.transfer as u16 {
            if let Err(e) = self.bus.write(self.addr, &self.buffer[..self.transfer as usize]) {
                self.status = e as u8;
                warn!("I2C write of {} bytes to 0x{:02X} failed.", self.transfer, self.addr);
            }
            self.session.finish();
        } else {
            self.session.advance();
        }
        self.session.continuation()
    }

    fn stat(&mut self, byte: &mut u8) -> Opcode {
        self.session.finish();
        *byte = self.status;
        Opcode::NoOp
    }
}

impl<B: I2cBus> Device for I2cPort<B> {
    fn read(&mut self, opcode: Opcode, byte: &mut u8) -> Opcode {
        match opcode {
            Opcode::I2cProbe => self.probe(byte),
            Opcode::I2cRead => self.stream_read(byte),
            Opcode::I2cStat => self.stat(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }

    fn write(&mut self, opcode: Opcode, byte: u8) -> Opcode {
        match opcode {
            Opcode::I2cAddr => self.set_addr(byte),
            Opcode::I2cWrite => self.stream_write(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;

    /// A scripted bus with one device at a fixed address.
    struct ScriptedBus {
        device_addr: u8,
        response: Vec<u8>,
        written: Vec<Vec<u8>>,
        reads: usize,
    }

    impl ScriptedBus {
        fn new(device_addr: u8, response: &[u8]) -> Self {
            ScriptedBus {
                device_addr,
                response: response.to_vec(),
                written: Vec::new(),
                reads: 0,
            }
        }
    }

    impl I2cBus for ScriptedBus {
        fn probe(&mut self, addr: u8) -> bool {
            addr == self.device_addr
        }

        fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<usize, I2cError> {
            if addr != self.device_addr {
                return Err(I2cError::AddressNack);
            }
            self.reads += 1;
            let n = buf.len().min(self.response.len());
            buf[..n].copy_from_slice(&self.response[..n]);
            Ok(n)
        }

        fn write(&mut self, addr: u8, data: &[u8]) -> Result<(), I2cError> {
            if addr != self.device_addr {
                return Err(I2cError::AddressNack);
            }
            self.written.push(data.to_vec());
            Ok(())
        }
    }

    fn set_descriptor(port: &mut I2cPort<ScriptedBus>, addr: u8, len: u8) {
        assert_eq!(port.write(Opcode::I2cAddr, addr), Opcode::I2cAddr);
        assert_eq!(port.write(Opcode::I2cAddr, len), Opcode::NoOp);
    }

    #[test]
    fn test_probe() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x48, &[]));
        set_descriptor(&mut port, 0x48, 0);
        let mut byte = 0;
        assert_eq!(port.read(Opcode::I2cProbe, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 1);
        set_descriptor(&mut port, 0x49, 0);
        port.read(Opcode::I2cProbe, &mut byte);
        assert_eq!(byte, 0);
    }

    #[test]
    fn test_streamed_read() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &[10, 20, 30]));
        set_descriptor(&mut port, 0x50, 3);

        let mut data = Vec::new();
        for i in 0..3 {
            let mut byte = 0;
            let continuation = port.read(Opcode::I2cRead, &mut byte);
            data.push(byte);
            if i == 2 {
                assert_eq!(continuation, Opcode::NoOp);
            } else {
                assert_eq!(continuation, Opcode::I2cRead);
            }
        }
        assert_eq!(data, [10, 20, 30]);
        // One bulk transaction, not three.
        assert_eq!(port.bus.reads, 1);
        assert_eq!(port.last_status(), 0);
    }

    #[test]
    fn test_streamed_write() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &[]));
        set_descriptor(&mut port, 0x50, 3);

        assert_eq!(port.write(Opcode::I2cWrite, 0x01), Opcode::I2cWrite);
        assert_eq!(port.write(Opcode::I2cWrite, 0x02), Opcode::I2cWrite);
        assert!(port.bus.written.is_empty());
        assert_eq!(port.write(Opcode::I2cWrite, 0x03), Opcode::NoOp);
        assert_eq!(port.bus.written, vec![vec![0x01, 0x02, 0x03]]);
        assert_eq!(port.last_status(), 0);
    }

    #[test]
    fn test_zero_length_transfer_is_inert() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &[1, 2, 3]));
        set_descriptor(&mut port, 0x50, 0);

        let mut byte = 0xEE;
        assert_eq!(port.read(Opcode::I2cRead, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 0xEE);
        assert_eq!(port.write(Opcode::I2cWrite, 0x77), Opcode::NoOp);
        assert_eq!(port.bus.reads, 0);
        assert!(port.bus.written.is_empty());
    }

    #[test]
    fn test_short_read_idles_early() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &[7]));
        set_descriptor(&mut port, 0x50, 4);

        let mut byte = 0;
        assert_eq!(port.read(Opcode::I2cRead, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 7);
    }

    #[test]
    fn test_nack_latches_status() {
        init_test_logging();
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &[]));
        set_descriptor(&mut port, 0x23, 2);

        let mut byte = 0xEE;
        assert_eq!(port.read(Opcode::I2cRead, &mut byte), Opcode::NoOp);
        assert_eq!(byte, 0);
        let mut status = 0;
        assert_eq!(port.read(Opcode::I2cStat, &mut status), Opcode::NoOp);
        assert_eq!(status, I2cError::AddressNack as u8);

        // A successful transfer clears the register.
        set_descriptor(&mut port, 0x50, 1);
        port.write(Opcode::I2cWrite, 0x42);
        port.read(Opcode::I2cStat, &mut status);
        assert_eq!(status, 0);
    }

    #[test]
    fn test_descriptor_length_is_clamped() {
        init_test_logging();
        let response = vec![0xA5; TRANSFER_CAP + 50];
        let mut port = I2cPort::new(ScriptedBus::new(0x50, &response));
        set_descriptor(&mut port, 0x50, 255);

        let mut count = 0;
        loop {
            let mut byte = 0;
            let continuation = port.read(Opcode::I2cRead, &mut byte);
            assert_eq!(byte, 0xA5);
            count += 1;
            if continuation == Opcode::NoOp {
                break;
            }
        }
        assert_eq!(count, TRANSFER_CAP);
    }
}
