use time::OffsetDateTime;

/// Bytes in the timestamp stream: seconds, minutes, hours, day, month,
/// two-digit year, temperature.
pub const SNAPSHOT_LEN: usize = 7;

/// One coherent reading of the real-time clock, in binary (not BCD).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcSnapshot {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub temp_c: i8,
}

impl RtcSnapshot {
    /// The wire order of the timestamp fields.
    pub fn encode(&self) -> [u8; SNAPSHOT_LEN] {
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.day,
            self.month,
            self.year,
            self.temp_c as u8,
        ]
    }
}

/// The clock-chip collaborator. Presence is probed once at device
/// construction; BCD conversion and register access are the implementation's
/// concern.
pub trait Rtc {
    fn present(&mut self) -> bool;
    fn snapshot(&mut self) -> RtcSnapshot;
}

/// Clock collaborator backed by the host system clock. The hardware die
/// temperature has no host equivalent and reads as zero.
pub struct HostRtc;

impl Rtc for HostRtc {
    fn present(&mut self) -> bool {
        true
    }

    fn snapshot(&mut self) -> RtcSnapshot {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        RtcSnapshot {
            seconds: now.second(),
            minutes: now.minute(),
            hours: now.hour(),
            day: now.day(),
            month: u8::from(now.month()),
            year: now.year().rem_euclid(100) as u8,
            temp_c: 0,
        }
    }
}

/// Stand-in for an absent clock chip.
pub struct NoRtc;

impl Rtc for NoRtc {
    fn present(&mut self) -> bool {
        false
    }

    fn snapshot(&mut self) -> RtcSnapshot {
        RtcSnapshot {
            seconds: 0,
            minutes: 0,
            hours: 0,
            day: 0,
            month: 0,
            year: 0,
            temp_c: 0,
        }
    }
}
