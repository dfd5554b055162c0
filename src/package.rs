// src/package.rs

//! Package identity and metadata
//!
//! A [`PackageRef`] names one concrete build of a package. Identity is the
//! NEVRA: two refs with the same name, architecture and EVR are the same
//! package no matter which repository they were seen in.

use crate::error::{Error, Result};
use crate::transaction::Reason;
use crate::version::{Evr, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Repository id used for packages only known from the installed system
pub const SYSTEM_REPO: &str = "@System";

/// Immutable reference to one package build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRef {
    name: String,
    arch: String,
    evr: Evr,
    repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl PackageRef {
    /// Create a package reference
    pub fn new(
        name: impl Into<String>,
        arch: impl Into<String>,
        evr: Evr,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arch: arch.into(),
            evr,
            repo: repo.into(),
            checksum: None,
        }
    }

    /// Attach a content checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Parse `name-[epoch:]version-release.arch` (the `@repo` suffix is optional)
    pub fn parse_nevra(s: &str) -> Result<Self> {
        let (nevra, repo) = match s.rsplit_once('@') {
            Some((n, r)) if !r.is_empty() => (n, r),
            _ => (s, SYSTEM_REPO),
        };
        let (nevr, arch) = nevra
            .rsplit_once('.')
            .ok_or_else(|| Error::ParseError(format!("Missing architecture in '{}'", s)))?;
        let (nev, release) = nevr
            .rsplit_once('-')
            .ok_or_else(|| Error::ParseError(format!("Missing release in '{}'", s)))?;
        let (name, version) = nev
            .rsplit_once('-')
            .ok_or_else(|| Error::ParseError(format!("Missing version in '{}'", s)))?;
        if name.is_empty() || arch.is_empty() {
            return Err(Error::ParseError(format!("Malformed NEVRA '{}'", s)));
        }
        let evr = Evr::parse(&format!("{}-{}", version, release))?;
        Ok(Self::new(name, arch, evr, repo))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn evr(&self) -> &Evr {
        &self.evr
    }

    /// Repository the package was seen in
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// The (name, architecture) pair that at most one installed build may hold
    pub fn name_arch(&self) -> NameArch {
        NameArch {
            name: self.name.clone(),
            arch: self.arch.clone(),
        }
    }

    /// Full NEVRA string (`name-epoch:version-release.arch`)
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.evr, self.arch)
    }

    /// Same build as `other`, originating from `other`'s repository
    pub fn same_build_as(&self, other: &PackageRef) -> bool {
        self == other && self.repo == other.repo
    }

    /// Copy of this ref attributed to another repository
    pub fn in_repo(&self, repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..self.clone()
        }
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arch == other.arch && self.evr == other.evr
    }
}

impl Eq for PackageRef {}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.arch.hash(state);
        self.evr.hash(state);
    }
}

impl Ord for PackageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.arch.cmp(&other.arch))
            .then_with(|| self.evr.cmp(&other.evr))
    }
}

impl PartialOrd for PackageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.evr, self.arch)
    }
}

/// Name and architecture of a package, without version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameArch {
    pub name: String,
    pub arch: String,
}

impl fmt::Display for NameArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.arch)
    }
}

/// A capability requirement (`name [op version]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub constraint: VersionConstraint,
}

impl Requirement {
    /// Requirement on any version of a capability
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: VersionConstraint::Any,
        }
    }

    /// Parse `name`, `name >= 1.0`, `name = 2:1.0-3`, `name >= 1.0, < 2.0`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '=' | '!'))
            .unwrap_or(s.len());
        let (name, rest) = s.split_at(split);
        if name.is_empty() {
            return Err(Error::ParseError(format!(
                "Requirement '{}' has no capability name",
                s
            )));
        }
        Ok(Self {
            name: name.to_string(),
            constraint: VersionConstraint::parse(rest)?,
        })
    }

    /// Does a provide of `name` at `version` (unversioned when `None`) satisfy this?
    pub fn matches(&self, name: &str, version: Option<&Evr>) -> bool {
        if self.name != name {
            return false;
        }
        match (version, &self.constraint) {
            (_, VersionConstraint::Any) => true,
            (Some(v), constraint) => constraint.satisfies(v),
            (None, _) => false,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constraint {
            VersionConstraint::Any => write!(f, "{}", self.name),
            ref c => write!(f, "{} {}", self.name, c),
        }
    }
}

impl Serialize for Requirement {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Requirement::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A capability a package offers (`name` or `name = version`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    pub name: String,
    pub version: Option<Evr>,
}

impl Provide {
    /// Parse `name` or `name = version`
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((name, version)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::ParseError(format!("Provide '{}' has no name", s)));
                }
                Ok(Self {
                    name: name.to_string(),
                    version: Some(Evr::parse(version)?),
                })
            }
            None => Ok(Self {
                name: s.trim().to_string(),
                version: None,
            }),
        }
    }
}

impl fmt::Display for Provide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} = {}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Serialize for Provide {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Provide {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Provide::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Scriptlet ordering hints declared by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingHints {
    /// Install this package before the named packages when both are in a transaction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_before: Vec<String>,
    /// Remove this package only after the named packages are removed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_after: Vec<String>,
}

impl OrderingHints {
    pub fn is_empty(&self) -> bool {
        self.install_before.is_empty() && self.remove_after.is_empty()
    }
}

/// Dependency metadata the index keeps for each package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weak_requires: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provide>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "OrderingHints::is_empty")]
    pub hints: OrderingHints,
    /// Why an installed package is on the system (None for available packages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_reason: Option<Reason>,
}

impl PackageMetadata {
    /// Does `package` (described by this metadata) provide something matching `req`?
    pub fn provides_match(&self, package: &PackageRef, req: &Requirement) -> bool {
        req.matches(package.name(), Some(package.evr()))
            || self
                .provides
                .iter()
                .any(|p| req.matches(&p.name, p.version.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, evr: &str, repo: &str) -> PackageRef {
        PackageRef::new(name, "x86_64", Evr::parse(evr).unwrap(), repo)
    }

    #[test]
    fn test_identity_ignores_repo_and_checksum() {
        let a = pkg("foo", "1.0-1", "fedora");
        let b = pkg("foo", "1.0-1", "updates").with_checksum("abc");
        assert_eq!(a, b);
        assert!(!a.same_build_as(&b));
        assert_ne!(a, pkg("foo", "1.0-2", "fedora"));
    }

    #[test]
    fn test_parse_nevra() {
        let p = PackageRef::parse_nevra("glibc-2:2.38-14.fc39.x86_64@updates").unwrap();
        assert_eq!(p.name(), "glibc");
        assert_eq!(p.arch(), "x86_64");
        assert_eq!(p.evr().epoch, 2);
        assert_eq!(p.evr().version, "2.38");
        assert_eq!(p.repo(), "updates");

        let dashed = PackageRef::parse_nevra("python3-libs-3.12.1-1.noarch").unwrap();
        assert_eq!(dashed.name(), "python3-libs");
        assert_eq!(dashed.repo(), SYSTEM_REPO);

        assert!(PackageRef::parse_nevra("nonsense").is_err());
    }

    #[test]
    fn test_display_is_nevra() {
        let p = pkg("foo", "1:2.0-3", "fedora");
        assert_eq!(p.to_string(), "foo-1:2.0-3.x86_64");
        assert_eq!(p.nevra(), p.to_string());
    }

    #[test]
    fn test_requirement_parse() {
        let r = Requirement::parse("foo>=2.0").unwrap();
        assert_eq!(r.name, "foo");
        assert_eq!(r.to_string(), "foo >= 2.0");

        let r = Requirement::parse("libssl.so.3").unwrap();
        assert_eq!(r.constraint, VersionConstraint::Any);
        assert!(Requirement::parse(">= 1.0").is_err());
    }

    #[test]
    fn test_unversioned_provide_only_matches_unversioned_requirement() {
        let any = Requirement::any("webserver");
        let versioned = Requirement::parse("webserver >= 1").unwrap();
        assert!(any.matches("webserver", None));
        assert!(!versioned.matches("webserver", None));
    }

    #[test]
    fn test_metadata_self_provide() {
        let meta = PackageMetadata {
            provides: vec![Provide::parse("httpd-api = 2.4").unwrap()],
            ..Default::default()
        };
        let httpd = pkg("httpd", "2.4.58-1", "fedora");
        assert!(meta.provides_match(&httpd, &Requirement::parse("httpd >= 2.4").unwrap()));
        assert!(meta.provides_match(&httpd, &Requirement::parse("httpd-api = 2.4").unwrap()));
        assert!(!meta.provides_match(&httpd, &Requirement::parse("httpd < 2").unwrap()));
    }
}
