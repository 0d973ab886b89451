//! Calendar timestamps decoded from on-disk metadata
//!
//! Stamps keep the source format's native resolution: fields the format
//! does not store stay zero. FAT modification times carry two-second
//! resolution, creation times add a 10 ms refinement, and access stamps
//! are date-only.

use core::fmt;

/// Calendar timestamp with up to centisecond resolution
///
/// Field order makes the derived ordering chronological.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Hundredths of a second
    pub centis: u8,
}

impl Timestamp {
    /// Decode a DOS date word: bits 15..9 years since 1980, 8..5 month,
    /// 4..0 day
    pub fn from_dos_date(date: u16) -> Self {
        Timestamp {
            year: 1980 + (date >> 9),
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            ..Timestamp::default()
        }
    }

    /// Decode DOS date and time words; the time word stores bits 15..11
    /// hour, 10..5 minute, 4..0 two-second units
    pub fn from_dos_datetime(date: u16, time: u16) -> Self {
        let mut ts = Self::from_dos_date(date);
        ts.hour = (time >> 11) as u8;
        ts.minute = ((time >> 5) & 0x3F) as u8;
        ts.second = ((time & 0x1F) * 2) as u8;
        ts
    }

    /// Decode a creation stamp: date/time words plus a 0..=199 count of
    /// 10 ms units refining the two-second field
    pub fn from_dos_datetime_tenths(date: u16, time: u16, tenths: u8) -> Self {
        let mut ts = Self::from_dos_datetime(date, time);
        ts.second += tenths / 100;
        ts.centis = tenths % 100;
        ts
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}
