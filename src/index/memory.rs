// src/index/memory.rs

//! In-memory package index
//!
//! Holds the installed set and every repository's available packages. It is
//! also an [`Installer`]: applying a transaction item updates the installed
//! set, which is how the command-line front end "installs" packages into a
//! universe file.

use super::solver::Solver;
use super::{PackageFilter, PackageIndex, SolveOutcome, SolveRequest, pattern_matches};
use crate::error::{Error, Result};
use crate::package::{NameArch, PackageMetadata, PackageRef};
use crate::transaction::{InstallError, Installer, Reason, TransactionPackage};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct InstalledEntry {
    package: PackageRef,
    metadata: PackageMetadata,
}

/// Index over an installed set plus available repositories
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    installed: BTreeMap<NameArch, InstalledEntry>,
    /// Keyed by (package, repository) so one build may come from several repos
    available: BTreeMap<(PackageRef, String), PackageMetadata>,
    excludes: Vec<String>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package offered by its repository
    pub fn add_available(&mut self, pkg: PackageRef, metadata: PackageMetadata) {
        let repo = pkg.repo().to_string();
        self.available.insert((pkg, repo), metadata);
    }

    /// Register an installed package, replacing any build in the same slot
    ///
    /// Packages without a recorded install reason are treated as user-installed.
    pub fn add_installed(&mut self, pkg: PackageRef, mut metadata: PackageMetadata) {
        metadata.install_reason.get_or_insert(Reason::User);
        self.installed.insert(
            pkg.name_arch(),
            InstalledEntry {
                package: pkg,
                metadata,
            },
        );
    }

    /// Hide available packages matching any of these globs
    pub fn set_excludes(&mut self, patterns: &[String]) -> Result<()> {
        for pattern in patterns {
            glob::Pattern::new(pattern)
                .map_err(|e| Error::Config(format!("Invalid exclude pattern '{}': {}", pattern, e)))?;
        }
        self.excludes = patterns.to_vec();
        Ok(())
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Why an installed package is on the system
    pub fn install_reason(&self, pkg: &PackageRef) -> Option<Reason> {
        self.installed
            .get(&pkg.name_arch())
            .filter(|entry| &entry.package == pkg)
            .and_then(|entry| entry.metadata.install_reason)
    }

    /// Installed packages with their metadata, in slot order
    pub(super) fn installed_entries(&self) -> impl Iterator<Item = (&PackageRef, &PackageMetadata)> {
        self.installed
            .values()
            .map(|entry| (&entry.package, &entry.metadata))
    }

    /// Available packages with their metadata, sorted by package then repository
    pub(super) fn available_entries(&self) -> impl Iterator<Item = (&PackageRef, &PackageMetadata)> {
        self.available.iter().map(|((pkg, _), meta)| (pkg, meta))
    }

    fn available_metadata(&self, pkg: &PackageRef) -> Option<&PackageMetadata> {
        self.available
            .get(&(pkg.clone(), pkg.repo().to_string()))
            .or_else(|| {
                self.available
                    .iter()
                    .find(|((candidate, _), _)| candidate == pkg)
                    .map(|(_, meta)| meta)
            })
    }
}

impl PackageIndex for MemoryIndex {
    fn query(&self, filter: &PackageFilter) -> Vec<PackageRef> {
        let mut found = Vec::new();

        if filter.installed != Some(false) {
            found.extend(
                self.installed
                    .values()
                    .map(|entry| &entry.package)
                    .filter(|pkg| filter.matches(pkg))
                    .cloned(),
            );
        }
        if filter.installed != Some(true) {
            found.extend(
                self.available
                    .keys()
                    .map(|(pkg, _)| pkg)
                    .filter(|pkg| filter.matches(pkg))
                    .filter(|pkg| filter.include_excluded || !self.is_excluded(pkg))
                    .cloned(),
            );
        }

        found.sort_by(|a, b| a.cmp(b).then_with(|| a.repo().cmp(b.repo())));
        found.dedup_by(|a, b| a.same_build_as(b));
        found
    }

    fn metadata(&self, pkg: &PackageRef) -> Option<&PackageMetadata> {
        let installed = self
            .installed
            .get(&pkg.name_arch())
            .filter(|entry| &entry.package == pkg);

        match installed {
            Some(entry) if entry.package.repo() == pkg.repo() => Some(&entry.metadata),
            Some(entry) => self.available_metadata(pkg).or(Some(&entry.metadata)),
            None => self.available_metadata(pkg),
        }
    }

    fn installed_instance(&self, name: &str, arch: &str) -> Option<PackageRef> {
        self.installed
            .get(&NameArch {
                name: name.to_string(),
                arch: arch.to_string(),
            })
            .map(|entry| entry.package.clone())
    }

    fn is_excluded(&self, pkg: &PackageRef) -> bool {
        self.excludes
            .iter()
            .any(|pattern| pattern_matches(pattern, pkg))
    }

    fn solve(&self, request: &SolveRequest) -> SolveOutcome {
        Solver::new(self, request.policy).solve(request)
    }
}

impl Installer for MemoryIndex {
    fn apply(&mut self, item: &TransactionPackage) -> std::result::Result<(), InstallError> {
        let slot = item.package.name_arch();

        if item.action.is_removal() {
            match self.installed.get(&slot) {
                Some(entry) if entry.package == item.package => {
                    self.installed.remove(&slot);
                    debug!("Removed {}", item.package);
                    Ok(())
                }
                _ => Err(InstallError::Other(format!(
                    "{} is not installed",
                    item.package
                ))),
            }
        } else {
            let mut metadata = self
                .available_metadata(&item.package)
                .cloned()
                .ok_or_else(|| {
                    InstallError::PayloadCorrupt(format!(
                        "{} (not offered by repository {})",
                        item.package,
                        item.package.repo()
                    ))
                })?;

            // Upgrades keep the reason the previous build was installed for
            let previous_reason = self
                .installed
                .get(&slot)
                .and_then(|entry| entry.metadata.install_reason);
            metadata.install_reason = Some(match (previous_reason, item.reason) {
                (Some(previous), _) if item.replaces.is_some() => previous,
                (_, Reason::Clean) => Reason::Dependency,
                (_, reason) => reason,
            });

            self.installed.insert(
                slot,
                InstalledEntry {
                    package: item.package.clone(),
                    metadata,
                },
            );
            debug!("Installed {}", item.package);
            Ok(())
        }
    }
}
