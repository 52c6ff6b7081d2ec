//! Access policy grammar
//!
//! Shared access tokens and stored container policies are described with a
//! compact string: `start=<days>;expiry=<days>;policy=<name>;p=<letters>`.
//! Any subset of the keys may appear, in any order. Day offsets are relative
//! to the current time and may be negative.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Grammar restated in every parse error
pub const POLICY_GRAMMAR: &str = "start=<days>;expiry=<days>;policy=<policy>;p=rwdl";

/// A single access right
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    Delete,
    List,
}

impl Permission {
    const ORDER: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::List,
    ];

    fn bit(self) -> u8 {
        match self {
            Permission::Read => 0b0001,
            Permission::Write => 0b0010,
            Permission::Delete => 0b0100,
            Permission::List => 0b1000,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
            Permission::List => 'l',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'r' => Some(Permission::Read),
            'w' => Some(Permission::Write),
            'd' => Some(Permission::Delete),
            'l' => Some(Permission::List),
            _ => None,
        }
    }
}

/// Set of access rights
///
/// Displays in the canonical `rwdl` order expected by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Permissions(u8);

impl Permissions {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Permission::ORDER.into_iter().collect()
    }

    pub fn insert(&mut self, permission: Permission) {
        self.0 |= permission.bit();
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ORDER.into_iter().filter(|p| self.contains(*p))
    }

    /// Build from a letter string; unrecognized letters are ignored
    pub fn from_letters(letters: &str) -> Self {
        letters.chars().filter_map(Permission::from_letter).collect()
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Permissions::empty();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in self.iter() {
            write!(f, "{}", p.letter())?;
        }
        Ok(())
    }
}

impl Serialize for Permissions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let letters = String::deserialize(deserializer)?;
        Ok(Permissions::from_letters(&letters))
    }
}

/// A time-bounded, permission-scoped access grant
///
/// Unset times defer to the service's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<Timestamp>,
    pub permissions: Permissions,
}

/// A parsed policy string: the grant plus an optional stored-policy name
///
/// When `policy_name` is set, tokens reference the server-side policy of
/// that name instead of embedding the grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySpec {
    pub policy: AccessPolicy,
    pub policy_name: Option<String>,
}

/// Parse a policy string relative to the current time
pub fn parse_policy_spec(value: Option<&str>) -> Result<PolicySpec> {
    parse_policy_spec_at(value, Timestamp::now())
}

/// Parse a policy string relative to `now`
pub fn parse_policy_spec_at(value: Option<&str>, now: Timestamp) -> Result<PolicySpec> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::MissingValue(format!("Value should be set. Expected: {POLICY_GRAMMAR}"))
    })?;

    let mut spec = PolicySpec::default();
    for pair in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, raw) = match pair.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (pair, None),
        };

        match key.to_ascii_lowercase().as_str() {
            "start" => spec.policy.start = Some(offset_days(now, key, require(key, raw)?)?),
            "expiry" => spec.policy.expiry = Some(offset_days(now, key, require(key, raw)?)?),
            "policy" => spec.policy_name = Some(require(key, raw)?.to_string()),
            "p" => {
                let letters = require(key, raw)?;
                for p in Permissions::from_letters(letters).iter() {
                    spec.policy.permissions.insert(p);
                }
            }
            _ => {
                return Err(Error::UnknownParameter {
                    key: key.to_string(),
                    expected: POLICY_GRAMMAR.to_string(),
                });
            }
        }
    }

    Ok(spec)
}

fn require<'a>(key: &str, raw: Option<&'a str>) -> Result<&'a str> {
    raw.ok_or_else(|| {
        Error::MissingValue(format!("'{key}' needs a value. Expected: {POLICY_GRAMMAR}"))
    })
}

fn offset_days(now: Timestamp, key: &str, raw: &str) -> Result<Timestamp> {
    let days: i64 = raw.parse().map_err(|_| {
        Error::InvalidValue(format!(
            "'{key}' must be an integer number of days, got '{raw}'. Expected: {POLICY_GRAMMAR}"
        ))
    })?;

    days.checked_mul(86_400)
        .map(SignedDuration::from_secs)
        .and_then(|offset| now.checked_add(offset).ok())
        .ok_or_else(|| Error::InvalidValue(format!("'{key}' offset of {days} days is out of range")))
}
