use log::info;

use crate::device::{Device, Session};
use crate::opcode::Opcode;
use crate::rtc::{Rtc, SNAPSHOT_LEN};

/// Streams a 7-byte timestamp snapshot from the real-time clock. Presence is
/// probed once at construction; with no clock fitted every access reports
/// idle and leaves the byte slot alone, so callers must tolerate repeated
/// idle responses.
pub struct Clock<R> {
    rtc: R,
    found: bool,
    session: Session,
    snapshot: [u8; SNAPSHOT_LEN],
}

impl<R: Rtc> Clock<R> {
    pub fn new(mut rtc: R) -> Self {
        let found = rtc.present();
        if found {
            info!("RTC detected.");
        } else {
            info!("No RTC fitted.");
        }
        Clock {
            rtc,
            found,
            session: Session::new(),
            snapshot: [0; SNAPSHOT_LEN],
        }
    }

    pub fn found(&self) -> bool {
        self.found
    }

    fn date_time(&mut self, byte: &mut u8) -> Opcode {
        if !self.found {
            self.session.finish();
            return Opcode::NoOp;
        }
        let step = self.session.step(Opcode::DateTime);
        if step == 0 {
            self.snapshot = self.rtc.snapshot().encode();
        }
        *byte = self.snapshot[step as usize];
        if step as usize == SNAPSHOT_LEN - 1 {
            self.session.finish();
        } else {
            self.session.advance();
        }
        self.session.continuation()
    }
}

impl<R: Rtc> Device for Clock<R> {
    fn read(&mut self, opcode: Opcode, byte: &mut u8) -> Opcode {
        match opcode {
            Opcode::DateTime => self.date_time(byte),
            _ => {
                self.session.finish();
                Opcode::NoOp
            }
        }
    }

    fn write(&mut self, _opcode: Opcode, _byte: u8) -> Opcode {
        self.session.finish();
        Opcode::NoOp
    }
}
