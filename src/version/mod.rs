// src/version/mod.rs

//! Epoch-version-release handling and constraint satisfaction
//!
//! Versions follow the RPM `[epoch:]version[-release]` layout and compare
//! segment-wise the way rpm does: runs of digits compare numerically, runs of
//! letters compare lexically, a digit run is newer than a letter run, `~`
//! sorts before anything (pre-releases) and `^` sorts after the base version.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed epoch-version-release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    /// Build an EVR from its parts
    pub fn new(epoch: u64, version: impl Into<String>, release: Option<&str>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release: release.map(str::to_string),
        }
    }

    /// Parse an EVR string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.2.3-4.el8" → epoch=0, version="1.2.3", release=Some("4.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("0", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        // Release is everything after the last dash so versions may not contain one
        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }
        if release.as_deref() == Some("") {
            return Err(Error::ParseError(format!(
                "Empty release component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two EVRs
    pub fn compare(&self, other: &Evr) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
    }

    /// Compare ignoring the release when either side has none
    ///
    /// This is how a constraint like `>= 2.0` treats a candidate `2.0-3`.
    pub fn compare_loose(&self, other: &Evr) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| rpmvercmp(&self.version, &other.version))
            .then_with(|| match (&self.release, &other.release) {
                (Some(a), Some(b)) => rpmvercmp(a, b),
                _ => Ordering::Equal,
            })
    }
}

/// Segment-wise version comparison as performed by rpm
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // Skip separators, but not the tilde and caret markers
        while let Some((&c, rest)) = a.split_first() {
            if c.is_ascii_alphanumeric() || c == b'~' || c == b'^' {
                break;
            }
            a = rest;
        }
        while let Some((&c, rest)) = b.split_first() {
            if c.is_ascii_alphanumeric() || c == b'~' || c == b'^' {
                break;
            }
            b = rest;
        }

        // Tilde sorts before everything, including the end of the string
        match (a.first(), b.first()) {
            (Some(b'~'), Some(b'~')) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        // Caret sorts after the end of the string but before anything else
        match (a.first(), b.first()) {
            (Some(b'^'), Some(b'^')) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (Some(b'^'), None) => return Ordering::Greater,
            (None, Some(b'^')) => return Ordering::Less,
            (Some(b'^'), _) => return Ordering::Less,
            (_, Some(b'^')) => return Ordering::Greater,
            _ => {}
        }

        if a.is_empty() || b.is_empty() {
            break;
        }

        let numeric = a[0].is_ascii_digit();
        let take = |s: &[u8]| -> usize {
            s.iter()
                .take_while(|c| {
                    if numeric {
                        c.is_ascii_digit()
                    } else {
                        c.is_ascii_alphabetic()
                    }
                })
                .count()
        };
        let a_len = take(a);
        let b_len = take(b);
        let (seg_a, rest_a) = a.split_at(a_len);
        let (seg_b, rest_b) = b.split_at(b_len);

        // Segments of different types: numeric is newer
        if seg_b.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let trim = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
            let seg_a = &seg_a[trim(seg_a)..];
            let seg_b = &seg_b[trim(seg_b)..];
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        a = rest_a;
        b = rest_b;
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl FromStr for Evr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            // Keep Ord consistent with Eq for strings rpm treats as equal ("1.0" vs "1_0")
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.release.cmp(&other.release))
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Evr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Evr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Evr::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(Evr),
    /// Greater than
    GreaterThan(Evr),
    /// Greater than or equal
    GreaterOrEqual(Evr),
    /// Less than
    LessThan(Evr),
    /// Less than or equal
    LessOrEqual(Evr),
    /// Not equal
    NotEqual(Evr),
    /// Both constraints must be satisfied (for ranges like ">= 1.0, < 2.0")
    And(Box<VersionConstraint>, Box<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - "= 1.5.0" → Exact(1.5.0)
    /// - ">= 1.0, < 2.0" → And(..)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        if let Some((left, right)) = s.split_once(',') {
            let left = Self::parse(left)?;
            let right = Self::parse(right)?;
            return Ok(VersionConstraint::And(Box::new(left), Box::new(right)));
        }

        let parsed = if let Some(rest) = s.strip_prefix(">=") {
            VersionConstraint::GreaterOrEqual(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix("<=") {
            VersionConstraint::LessOrEqual(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix("!=") {
            VersionConstraint::NotEqual(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix('>') {
            VersionConstraint::GreaterThan(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix('<') {
            VersionConstraint::LessThan(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix("==") {
            VersionConstraint::Exact(Evr::parse(rest)?)
        } else if let Some(rest) = s.strip_prefix('=') {
            VersionConstraint::Exact(Evr::parse(rest)?)
        } else {
            // No operator means exact match
            VersionConstraint::Exact(Evr::parse(s)?)
        };

        Ok(parsed)
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Evr) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version.compare_loose(v) == Ordering::Equal,
            VersionConstraint::GreaterThan(v) => version.compare_loose(v) == Ordering::Greater,
            VersionConstraint::GreaterOrEqual(v) => version.compare_loose(v) != Ordering::Less,
            VersionConstraint::LessThan(v) => version.compare_loose(v) == Ordering::Less,
            VersionConstraint::LessOrEqual(v) => version.compare_loose(v) != Ordering::Greater,
            VersionConstraint::NotEqual(v) => version.compare_loose(v) != Ordering::Equal,
            VersionConstraint::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::And(left, right) => write!(f, "{}, {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evr(s: &str) -> Evr {
        Evr::parse(s).unwrap()
    }

    #[test]
    fn test_evr_parse_simple() {
        let v = evr("1.2.3");
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_evr_parse_full() {
        let v = evr("1:2.3.4-5.el8");
        assert_eq!(v.epoch, 1);
        assert_eq!(v.version, "2.3.4");
        assert_eq!(v.release, Some("5.el8".to_string()));
    }

    #[test]
    fn test_evr_parse_empty_epoch() {
        let v = evr(":1.02.208-2.fc43");
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.02.208");
        assert_eq!(v.release, Some("2.fc43".to_string()));
    }

    #[test]
    fn test_evr_parse_rejects_garbage() {
        assert!(Evr::parse("").is_err());
        assert!(Evr::parse("x:1.0").is_err());
        assert!(Evr::parse("1.0-").is_err());
    }

    #[test]
    fn test_epoch_wins() {
        assert!(evr("1:1.0") > evr("0:9.9"));
    }

    #[test]
    fn test_numeric_segments() {
        assert!(evr("1.10") > evr("1.9"));
        assert!(evr("1.010") == evr("1.010"));
        assert_eq!(rpmvercmp("1.010", "1.10"), Ordering::Equal);
        assert!(evr("2.0") > evr("1.99.99"));
    }

    #[test]
    fn test_alpha_and_numeric_mix() {
        assert_eq!(rpmvercmp("1.0a", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.a", "1.1"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0.b", "1.0.a"), Ordering::Greater);
    }

    #[test]
    fn test_tilde_and_caret() {
        assert_eq!(rpmvercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(rpmvercmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(rpmvercmp("1.0^git1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_release_ordering() {
        assert!(evr("1.2.3-1") < evr("1.2.3-2"));
        assert!(evr("1.2.3-10") > evr("1.2.3-9"));
    }

    #[test]
    fn test_constraint_ignores_missing_release() {
        let c = VersionConstraint::parse(">= 2.0").unwrap();
        assert!(c.satisfies(&evr("2.0-1")));
        assert!(!c.satisfies(&evr("1.9-7")));

        let exact = VersionConstraint::parse("= 2.0").unwrap();
        assert!(exact.satisfies(&evr("2.0-5")));
    }

    #[test]
    fn test_constraint_and() {
        let c = VersionConstraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert!(c.satisfies(&evr("1.5.0")));
        assert!(!c.satisfies(&evr("2.0.0")));
        assert!(!c.satisfies(&evr("0.9.0")));
    }

    #[test]
    fn test_constraint_any() {
        let c = VersionConstraint::parse("*").unwrap();
        assert!(c.satisfies(&evr("99.99.99")));
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(evr("2:1.2.3-4.el8").to_string(), "2:1.2.3-4.el8");
        assert_eq!(evr("0:1.2.3").to_string(), "1.2.3");
        let c = VersionConstraint::parse(">= 1.0.0, < 2.0.0").unwrap();
        assert_eq!(c.to_string(), ">= 1.0.0, < 2.0.0");
    }
}
