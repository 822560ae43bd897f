// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ASN.1 time primitives shared by the certificate and CMS types.

use {
    bcder::{
        decode::{Constructed, DecodeError, Primitive, Source},
        encode::{PrimitiveContent, Values},
        Mode, Tag,
    },
    chrono::{DateTime, Datelike, TimeZone, Timelike, Utc},
    std::{
        fmt::{Display, Formatter},
        io::Write,
        ops::Deref,
        str::FromStr,
    },
};

/// Time variant.
///
/// ```ASN.1
/// Time ::= CHOICE {
///   utcTime UTCTime,
///   generalizedTime GeneralizedTime }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Time {
    UtcTime(UtcTime),
    GeneralizedTime(GeneralizedTime),
}

impl Time {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| {
            if tag == Tag::UTC_TIME {
                Ok(Self::UtcTime(UtcTime::from_primitive(prim)?))
            } else if tag == Tag::GENERALIZED_TIME {
                Ok(Self::GeneralizedTime(GeneralizedTime::from_primitive(prim)?))
            } else {
                Err(prim.content_err("expected UTCTime or GeneralizedTime"))
            }
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::UtcTime(utc) => (Some(utc.encode()), None),
            Self::GeneralizedTime(gt) => (None, Some(gt.encode())),
        }
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(t: DateTime<Utc>) -> Self {
        Self::UtcTime(UtcTime::from(t))
    }
}

impl From<Time> for DateTime<Utc> {
    fn from(t: Time) -> Self {
        match t {
            Time::UtcTime(utc) => *utc,
            Time::GeneralizedTime(gt) => *gt,
        }
    }
}

fn parse_digits(data: &[u8]) -> Result<u32, &'static str> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| u32::from_str(s).ok())
        .ok_or("invalid digits in time value")
}

fn datetime_from_parts(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<DateTime<Utc>, &'static str> {
    match Utc.with_ymd_and_hms(year, month, day, hour, minute, second) {
        chrono::LocalResult::Single(dt) => Ok(dt),
        _ => Err("invalid calendar time"),
    }
}

/// UTCTime with the two-digit year window mandated by RFC 5280: values
/// 50-99 are 19xx, values 00-49 are 20xx.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtcTime(DateTime<Utc>);

impl UtcTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::UTC_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|msg| prim.content_err(msg))
    }

    /// Parse UTCTime string data of the form `YYMMDDHHMMSSZ`.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() != "YYMMDDHHMMSSZ".len() || data[12] != b'Z' {
            return Err("malformed UTCTime");
        }

        let year = parse_digits(&data[0..2])? as i32;
        let year = if year >= 50 { year + 1900 } else { year + 2000 };

        Ok(Self(datetime_from_parts(
            year,
            parse_digits(&data[2..4])?,
            parse_digits(&data[4..6])?,
            parse_digits(&data[6..8])?,
            parse_digits(&data[8..10])?,
            parse_digits(&data[10..12])?,
        )?))
    }
}

impl Display for UtcTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100,
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl From<DateTime<Utc>> for UtcTime {
    fn from(t: DateTime<Utc>) -> Self {
        Self(t)
    }
}

impl Deref for UtcTime {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

/// GeneralizedTime restricted to the `YYYYMMDDHHMMSSZ` form.
///
/// Fractional seconds and timezone offsets are not decoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime(DateTime<Utc>);

impl GeneralizedTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(
        prim: &mut Primitive<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|msg| prim.content_err(msg))
    }

    /// Parse GeneralizedTime string data of the form `YYYYMMDDHHMMSSZ`.
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() != "YYYYMMDDHHMMSSZ".len() || data[14] != b'Z' {
            return Err("malformed GeneralizedTime");
        }

        Ok(Self(datetime_from_parts(
            parse_digits(&data[0..4])? as i32,
            parse_digits(&data[4..6])?,
            parse_digits(&data[6..8])?,
            parse_digits(&data[8..10])?,
            parse_digits(&data[10..12])?,
            parse_digits(&data[12..14])?,
        )?))
    }
}

impl Display for GeneralizedTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

impl Deref for GeneralizedTime {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_time_parse_and_render() {
        let t = UtcTime::parse(b"240131123015Z").unwrap();
        assert_eq!(t.year(), 2024);
        assert_eq!(t.month(), 1);
        assert_eq!(t.day(), 31);
        assert_eq!(t.hour(), 12);
        assert_eq!(t.minute(), 30);
        assert_eq!(t.second(), 15);
        assert_eq!(t.to_string(), "240131123015Z");

        // Two-digit year window.
        let t = UtcTime::parse(b"990101000000Z").unwrap();
        assert_eq!(t.year(), 1999);
    }

    #[test]
    fn utc_time_invalid() {
        assert!(UtcTime::parse(b"").is_err());
        assert!(UtcTime::parse(b"240131123015").is_err());
        assert!(UtcTime::parse(b"2401311230159").is_err());
        assert!(UtcTime::parse(b"24013112301xZ").is_err());
        assert!(UtcTime::parse(b"241331123015Z").is_err());
    }

    #[test]
    fn generalized_time_parse_and_render() {
        let t = GeneralizedTime::parse(b"20220129133742Z").unwrap();
        assert_eq!(t.year(), 2022);
        assert_eq!(t.to_string(), "20220129133742Z");

        assert!(GeneralizedTime::parse(b"20220129133742.333Z").is_err());
        assert!(GeneralizedTime::parse(b"20220129133742-0800").is_err());
    }
}
