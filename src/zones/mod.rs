//! The zones a server is authoritative for: a registry of SOA
//! records, looked up by walking a queried name towards the root.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::types::*;

/// A collection of zones.
#[derive(Debug, Clone, Default)]
pub struct Zones {
    zones: HashMap<DomainName, Zone>,
}

impl Zones {
    pub fn new() -> Self {
        Self {
            zones: HashMap::new(),
        }
    }

    /// Find the zone covering a domain, if there is one: try the name
    /// itself, then strip leading labels one at a time until a
    /// registered apex matches.  The first match wins.
    pub fn get(&self, name: &DomainName) -> Option<&Zone> {
        for i in 0..name.labels.len() {
            let labels = &name.labels[i..];
            if let Some(apex) = DomainName::from_labels(labels.to_vec()) {
                if let Some(zone) = self.zones.get(&apex) {
                    return Some(zone);
                }
            }
        }

        None
    }

    /// Create or replace a zone.
    pub fn insert(&mut self, zone: Zone) {
        self.zones.insert(zone.apex.clone(), zone);
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// A zone this server is authoritative for: an apex domain and the
/// SOA record describing it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Zone {
    apex: DomainName,
    soa: Soa,
}

impl Zone {
    pub fn new(apex: DomainName, soa: Soa) -> Self {
        Self { apex, soa }
    }

    pub fn apex(&self) -> &DomainName {
        &self.apex
    }

    pub fn soa(&self) -> &Soa {
        &self.soa
    }

    /// The SOA resource record for this zone.  Its TTL is the SOA
    /// minimum, which also caps negative-answer caching (RFC 2308).
    pub fn soa_record(&self) -> ResourceRecord {
        ResourceRecord {
            name: self.apex.clone(),
            rtype_with_data: RecordTypeWithData::SOA {
                mname: self.soa.mname.clone(),
                rname: self.soa.rname.clone(),
                serial: self.soa.serial,
                refresh: self.soa.refresh,
                retry: self.soa.retry,
                expire: self.soa.expire,
                minimum: self.soa.minimum,
            },
            rclass: RecordClass::IN,
            ttl: self.soa.minimum,
        }
    }
}

/// The fields of an SOA record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Soa {
    pub mname: DomainName,
    pub rname: DomainName,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Soa {
    /// The responsible-person mailbox in its presentation form: the
    /// first label separated by `@` instead of `.`, undoing the
    /// conversion `mailbox_to_domain` applies.
    pub fn rname_mailbox(&self) -> String {
        let dotted = self.rname.to_dotted_string();
        match dotted.split_once('.') {
            Some((user, rest)) if !rest.is_empty() => format!("{user}@{rest}"),
            _ => dotted,
        }
    }
}

/// Parse a responsible-person mailbox into the domain name form an
/// SOA record carries: `admin@example.com` becomes
/// `admin.example.com`.  Names already in dotted form pass through.
pub fn mailbox_to_domain(mailbox: &str) -> Option<DomainName> {
    match mailbox.split_once('@') {
        Some((user, host)) if !user.contains('.') => {
            DomainName::from_dotted_string(&format!("{user}.{host}"))
        }
        Some(_) => None,
        None => DomainName::from_dotted_string(mailbox),
    }
}

/// An SOA serial number: a fixed value, or "now", which resolves to
/// the current UNIX time in seconds when the zone is registered.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Serial {
    Now,
    Fixed(u32),
}

impl Serial {
    #[allow(clippy::missing_panics_doc)]
    pub fn resolve(self) -> u32 {
        match self {
            Serial::Fixed(value) => value,
            Serial::Now => {
                // safe unless the clock is before 1970
                let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
                now.as_secs() as u32
            }
        }
    }
}

impl From<u32> for Serial {
    fn from(value: u32) -> Self {
        Serial::Fixed(value)
    }
}

impl FromStr for Serial {
    type Err = SpanFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "now" {
            Ok(Serial::Now)
        } else if let Ok(value) = s.parse() {
            Ok(Serial::Fixed(value))
        } else {
            Err(SpanFromStr::NoParse)
        }
    }
}

/// A time span in seconds, for the SOA timers.  Constructed from a
/// raw second count or from a short string like `"2h"` or `"30m"`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Span(pub u32);

impl From<u32> for Span {
    fn from(seconds: u32) -> Self {
        Span(seconds)
    }
}

impl FromStr for Span {
    type Err = SpanFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(seconds) = trimmed.parse() {
            return Ok(Span(seconds));
        }

        parse_time_span(s).map(Span).ok_or(SpanFromStr::NoParse)
    }
}

/// Errors that can arise when converting a `&str` into a `Span` or
/// `Serial`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SpanFromStr {
    NoParse,
}

impl fmt::Display for SpanFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to a time span")
    }
}

impl std::error::Error for SpanFromStr {}

/// Convert a time-span string - digits followed by one of `s`, `m`,
/// `h`, `d`, `w`, with optional surrounding whitespace - to seconds.
/// Returns `None` for anything else, so callers can pass non-matching
/// values through untouched.
pub fn parse_time_span(s: &str) -> Option<u32> {
    let trimmed = s.trim();
    let (digits, unit) = trimmed.split_at(trimmed.len().checked_sub(1)?);
    let digits = digits.trim_end();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u32 = digits.parse().ok()?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        "w" => 60 * 60 * 24 * 7,
        _ => return None,
    };

    value.checked_mul(multiplier)
}
