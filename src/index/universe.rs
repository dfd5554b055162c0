// src/index/universe.rs

//! Universe files: a TOML description of installed and available packages
//!
//! ```toml
//! [[installed]]
//! nevra = "foo-1.0-1.x86_64"
//! repo = "fedora"
//! reason = "USER"
//!
//! [[available]]
//! nevra = "bar-1.0-1.x86_64"
//! repo = "updates"
//! requires = ["foo >= 2.0"]
//! ```

use super::MemoryIndex;
use crate::error::Result;
use crate::package::{OrderingHints, PackageMetadata, PackageRef, Provide, Requirement, SYSTEM_REPO};
use crate::transaction::Reason;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// One package in a universe file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub nevra: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommends: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provide>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<Requirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_after: Vec<String>,
}

impl UniverseEntry {
    fn from_package(pkg: &PackageRef, meta: &PackageMetadata) -> Self {
        Self {
            nevra: pkg.nevra(),
            repo: Some(pkg.repo().to_string()),
            checksum: pkg.checksum().map(str::to_string),
            reason: meta.install_reason,
            requires: meta.requires.clone(),
            recommends: meta.weak_requires.clone(),
            provides: meta.provides.clone(),
            conflicts: meta.conflicts.clone(),
            obsoletes: meta.obsoletes.clone(),
            install_before: meta.hints.install_before.clone(),
            remove_after: meta.hints.remove_after.clone(),
        }
    }

    fn into_package(self, default_repo: &str) -> Result<(PackageRef, PackageMetadata)> {
        let parsed = PackageRef::parse_nevra(&self.nevra)?;
        let repo = self.repo.as_deref().unwrap_or(default_repo);
        let mut pkg = parsed.in_repo(repo);
        if let Some(checksum) = self.checksum {
            pkg = pkg.with_checksum(checksum);
        }
        let meta = PackageMetadata {
            requires: self.requires,
            weak_requires: self.recommends,
            provides: self.provides,
            conflicts: self.conflicts,
            obsoletes: self.obsoletes,
            hints: OrderingHints {
                install_before: self.install_before,
                remove_after: self.remove_after,
            },
            install_reason: self.reason,
        };
        Ok((pkg, meta))
    }
}

/// Whole universe file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseFile {
    #[serde(default)]
    pub installed: Vec<UniverseEntry>,
    #[serde(default)]
    pub available: Vec<UniverseEntry>,
}

impl UniverseFile {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl MemoryIndex {
    /// Build an index from a parsed universe file
    pub fn from_universe(universe: UniverseFile) -> Result<Self> {
        let mut index = Self::new();
        for entry in universe.installed {
            let (pkg, meta) = entry.into_package(SYSTEM_REPO)?;
            index.add_installed(pkg, meta);
        }
        for entry in universe.available {
            let (pkg, meta) = entry.into_package("available")?;
            index.add_available(pkg, meta);
        }
        Ok(index)
    }

    /// Snapshot the index as a universe file
    pub fn to_universe(&self) -> UniverseFile {
        UniverseFile {
            installed: self
                .installed_entries()
                .map(|(pkg, meta)| UniverseEntry::from_package(pkg, meta))
                .collect(),
            available: self
                .available_entries()
                .map(|(pkg, meta)| UniverseEntry::from_package(pkg, meta))
                .collect(),
        }
    }

    /// Load a universe file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let index = Self::from_universe(UniverseFile::parse(&content)?)?;
        info!(
            "Loaded universe from {} ({} installed)",
            path.display(),
            index.installed_entries().count()
        );
        Ok(index)
    }

    /// Write the index back, replacing the file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, self.to_universe().to_toml()?)?;
        fs::rename(&tmp, path)?;
        debug!("Saved universe to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{PackageFilter, PackageIndex};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[[installed]]
nevra = "foo-1.0-1.x86_64"
repo = "fedora"

[[installed]]
nevra = "libbar-3.1-2.x86_64"
reason = "DEPENDENCY"

[[available]]
nevra = "foo-2.0-1.x86_64"
repo = "updates"
requires = ["libbar >= 3"]
provides = ["foo-api = 2"]
install_before = ["bar"]
"#;

    #[test]
    fn test_parse_sample() {
        let index = MemoryIndex::from_universe(UniverseFile::parse(SAMPLE).unwrap()).unwrap();
        let libbar = index.installed_instance("libbar", "x86_64").unwrap();
        assert_eq!(libbar.repo(), SYSTEM_REPO);
        assert_eq!(index.install_reason(&libbar), Some(Reason::Dependency));

        let foo2 = index
            .query(&PackageFilter::pattern("foo-2.0").available())
            .pop()
            .unwrap();
        let meta = index.metadata(&foo2).unwrap();
        assert_eq!(meta.requires[0].to_string(), "libbar >= 3");
        assert_eq!(meta.hints.install_before, vec!["bar".to_string()]);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("universe.toml");

        let index = MemoryIndex::from_universe(UniverseFile::parse(SAMPLE).unwrap()).unwrap();
        index.save(&path).unwrap();

        let reloaded = MemoryIndex::load(&path).unwrap();
        assert_eq!(reloaded.to_universe(), index.to_universe());
        assert_eq!(reloaded.installed().len(), 2);
    }

    #[test]
    fn test_rejects_bad_nevra() {
        let bad = UniverseFile::parse("[[available]]\nnevra = \"nonsense\"\n").unwrap();
        assert!(MemoryIndex::from_universe(bad).is_err());
    }
}
