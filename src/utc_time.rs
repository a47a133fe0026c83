use std::ops;
use std::time::Duration;

use time::macros::{datetime, offset};
use time::{OffsetDateTime, PrimitiveDateTime};


#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct UtcDateTime(PrimitiveDateTime);

impl UtcDateTime {
    pub const UNIX_EPOCH: Self = Self(datetime!(1970-01-01 0:00));
    pub fn now() -> Self {
        let now_odt = OffsetDateTime::now_utc();
        Self(PrimitiveDateTime::new(now_odt.date(), now_odt.time()))
    }

    // Saturates to zero for instants before the epoch, which the server never observes.
    pub fn unix_millis(self) -> u64 {
        let nanos = OffsetDateTime::from(self).unix_timestamp_nanos();
        u64::try_from(nanos / 1_000_000).unwrap_or(0)
    }
}

impl From<PrimitiveDateTime> for UtcDateTime {
    fn from(pdt: PrimitiveDateTime) -> Self { Self(pdt) }
}
impl From<OffsetDateTime> for UtcDateTime {
    fn from(odt: OffsetDateTime) -> Self {
        let utc = odt.to_offset(offset!(UTC));
        Self::from(PrimitiveDateTime::new(utc.date(), utc.time()))
    }
}

impl From<UtcDateTime> for OffsetDateTime {
    fn from(udt: UtcDateTime) -> Self { udt.0.assume_utc() }
}

impl ops::Add<Duration> for UtcDateTime {
    type Output = Self;
    fn add(self, d: Duration) -> Self { Self(self.0 + d) }
}
