use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use time::{OffsetDateTime, UtcOffset};

pub fn localized_datetime(time: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = time.to_offset(UtcOffset::UTC);
    let seconds = utc.unix_timestamp();
    let nanos: u32 = utc.nanosecond();
    let datetime_utc = DateTime::<Utc>::from_timestamp(seconds, nanos)
        .or_else(|| DateTime::<Utc>::from_timestamp(seconds, 0))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    tz.from_utc_datetime(&datetime_utc.naive_utc())
}

/// Human date shown on listings, e.g. `March 4, 2024`.
pub fn display_date(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz).format("%B %-d, %Y").to_string()
}

/// Machine-readable timestamp for `<time datetime=…>`.
pub fn iso_datetime(time: OffsetDateTime, tz: Tz) -> String {
    localized_datetime(time, tz).to_rfc3339()
}
