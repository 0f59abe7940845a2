//! UTCTime and GeneralizedTime (X.690 §8.25-§8.26).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::Error;
use crate::native::Native;

/// Decodes UTCTime contents (`YYMMDDhhmm[ss]Z` or with `±hhmm`) into a timestamp. The two-digit
/// year pivots at 50: `00-49 -> 2000-2049`, `50-99 -> 1950-1999` (X.509 clarifies the X.690 rule).
pub fn decode_utc_time(contents: &[u8]) -> Result<DateTime<FixedOffset>, Error> {
    let s = std::str::from_utf8(contents)
        .map_err(|_| Error::invalid_value("UTCTime contents are not ASCII"))?;
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::invalid_value("malformed UTCTime"))?;
    if !(10..=12).contains(&digits_end) {
        return Err(Error::invalid_value("malformed UTCTime"));
    }
    let has_seconds = digits_end == 12;

    let yy: i32 = s[0..2].parse().map_err(|_| Error::invalid_value("malformed UTCTime year"))?;
    let year = if yy < 50 { 2000 + yy } else { 1900 + yy };
    let month: u32 = s[2..4].parse().map_err(|_| Error::invalid_value("malformed UTCTime month"))?;
    let day: u32 = s[4..6].parse().map_err(|_| Error::invalid_value("malformed UTCTime day"))?;
    let hour: u32 = s[6..8].parse().map_err(|_| Error::invalid_value("malformed UTCTime hour"))?;
    let minute: u32 = s[8..10]
        .parse()
        .map_err(|_| Error::invalid_value("malformed UTCTime minute"))?;
    let second: u32 = if has_seconds {
        s[10..12].parse().map_err(|_| Error::invalid_value("malformed UTCTime second"))?
    } else {
        0
    };

    let offset = parse_offset(&s[digits_end..])?;
    build_datetime(year, month, day, hour, minute, second, 0, offset)
}

/// Decodes GeneralizedTime contents (`YYYYMMDDhh[mm[ss[.fff]]]` with optional `Z`/`±hhmm`).
pub fn decode_generalized_time(contents: &[u8]) -> Result<DateTime<FixedOffset>, Error> {
    let s = std::str::from_utf8(contents)
        .map_err(|_| Error::invalid_value("GeneralizedTime contents are not ASCII"))?;

    let year: i32 = s
        .get(0..4)
        .ok_or_else(|| Error::invalid_value("malformed GeneralizedTime"))?
        .parse()
        .map_err(|_| Error::invalid_value("malformed GeneralizedTime year"))?;
    let month: u32 = s[4..6].parse().map_err(|_| Error::invalid_value("malformed GeneralizedTime month"))?;
    let day: u32 = s[6..8].parse().map_err(|_| Error::invalid_value("malformed GeneralizedTime day"))?;
    let hour: u32 = s[8..10].parse().map_err(|_| Error::invalid_value("malformed GeneralizedTime hour"))?;

    let rest = &s[10..];
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let numeric = &rest[..digits_end];
    let tz_part = &rest[digits_end..];

    let (minute, second, micros) = parse_generalized_fraction(numeric)?;

    let offset = parse_offset(tz_part)?;
    build_datetime(year, month, day, hour, minute, second, micros, offset)
}

fn parse_generalized_fraction(numeric: &str) -> Result<(u32, u32, u32), Error> {
    if numeric.is_empty() {
        return Ok((0, 0, 0));
    }
    let (main, frac) = match numeric.split_once('.') {
        Some((m, f)) => (m, Some(f)),
        None => (numeric, None),
    };
    let minute: u32 = if main.len() >= 2 {
        main[0..2].parse().map_err(|_| Error::invalid_value("malformed minute"))?
    } else {
        return Err(Error::invalid_value("malformed GeneralizedTime"));
    };
    let second: u32 = if main.len() >= 4 {
        main[2..4].parse().map_err(|_| Error::invalid_value("malformed second"))?
    } else {
        0
    };
    let micros = match frac {
        Some(f) if !f.is_empty() => {
            let padded = format!("{f:0<6}");
            padded[..6].parse().map_err(|_| Error::invalid_value("malformed fractional seconds"))?
        }
        _ => 0,
    };
    Ok((minute, second, micros))
}

fn parse_offset(tz: &str) -> Result<FixedOffset, Error> {
    if tz == "Z" || tz.is_empty() {
        return Ok(FixedOffset::east_opt(0).unwrap());
    }
    if tz.len() != 5 {
        return Err(Error::invalid_value("malformed timezone offset"));
    }
    let sign = match &tz[0..1] {
        "+" => 1,
        "-" => -1,
        _ => return Err(Error::invalid_value("malformed timezone offset")),
    };
    let hh: i32 = tz[1..3].parse().map_err(|_| Error::invalid_value("malformed timezone offset"))?;
    let mm: i32 = tz[3..5].parse().map_err(|_| Error::invalid_value("malformed timezone offset"))?;
    FixedOffset::east_opt(sign * (hh * 3600 + mm * 60)).ok_or_else(|| Error::invalid_value("timezone offset out of range"))
}

#[allow(clippy::too_many_arguments)]
fn build_datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, Error> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::invalid_value("invalid calendar date"))?;
    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
        .ok_or_else(|| Error::invalid_value("invalid time of day"))?;
    let naive = date.and_time(time);
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::invalid_value("ambiguous or nonexistent local time"))
}

/// Encodes a timestamp as `YYMMDDhhmmssZ`, normalized to UTC (DER mandates UTC with no fractional
/// seconds for UTCTime).
pub fn encode_utc_time(dt: &DateTime<FixedOffset>) -> Vec<u8> {
    let utc = dt.with_timezone(&Utc);
    format!(
        "{:02}{:02}{:02}{:02}{:02}{:02}Z",
        utc.format("%y"),
        utc.format("%m"),
        utc.format("%d"),
        utc.format("%H"),
        utc.format("%M"),
        utc.format("%S")
    )
    .into_bytes()
}

/// Encodes a timestamp as `YYYYMMDDhhmmssZ`, normalized to UTC.
pub fn encode_generalized_time(dt: &DateTime<FixedOffset>) -> Vec<u8> {
    let utc = dt.with_timezone(&Utc);
    utc.format("%Y%m%d%H%M%SZ").to_string().into_bytes()
}

pub fn decode_utc_native(contents: &[u8]) -> Result<Native, Error> {
    Ok(Native::Time(decode_utc_time(contents)?))
}

pub fn decode_generalized_native(contents: &[u8]) -> Result<Native, Error> {
    Ok(Native::Time(decode_generalized_time(contents)?))
}
