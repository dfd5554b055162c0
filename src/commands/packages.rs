// src/commands/packages.rs
//! Install, remove, upgrade, downgrade, reinstall and distro-sync

use super::{Context, apply_resolution};
use crate::cli::Commands;
use anyhow::{Result, bail};
use goalpost::{Goal, Job, JobAction, JobFlags};
use tracing::info;

/// Resolve `jobs` against the context's index and apply the result
fn run_jobs(ctx: &mut Context, jobs: Vec<Job>) -> Result<()> {
    let resolution = {
        let mut goal = Goal::with_policy(&ctx.index, ctx.config.goal_policy());
        for job in jobs {
            goal.add_job(job);
        }
        goal.resolve()?
    };
    apply_resolution(ctx, resolution)
}

fn jobs(action: JobAction, patterns: &[String], flags: JobFlags) -> Vec<Job> {
    patterns
        .iter()
        .map(|pattern| Job::pattern(action, pattern.as_str()).with_flags(flags))
        .collect()
}

/// Patterns, or every package when none are given
fn or_everything(patterns: &[String]) -> Vec<String> {
    if patterns.is_empty() {
        vec!["*".to_string()]
    } else {
        patterns.to_vec()
    }
}

pub fn cmd_install(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::Install {
        packages,
        allow_downgrade,
        force,
    } = command
    else {
        bail!("install handler called for '{}'", command.name());
    };
    info!("Installing: {}", packages.join(", "));
    let flags = JobFlags {
        allow_downgrade: *allow_downgrade,
        force: *force,
        ..Default::default()
    };
    run_jobs(ctx, jobs(JobAction::Install, packages, flags))
}

pub fn cmd_remove(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::Remove {
        packages,
        clean_deps,
    } = command
    else {
        bail!("remove handler called for '{}'", command.name());
    };
    info!("Removing: {}", packages.join(", "));
    let flags = JobFlags {
        clean_deps: *clean_deps || ctx.config.clean_requirements_on_remove,
        ..Default::default()
    };
    run_jobs(ctx, jobs(JobAction::Remove, packages, flags))
}

pub fn cmd_upgrade(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::Upgrade { packages } = command else {
        bail!("upgrade handler called for '{}'", command.name());
    };
    let patterns = or_everything(packages);
    run_jobs(ctx, jobs(JobAction::Upgrade, &patterns, JobFlags::default()))
}

pub fn cmd_downgrade(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::Downgrade { packages } = command else {
        bail!("downgrade handler called for '{}'", command.name());
    };
    run_jobs(ctx, jobs(JobAction::Downgrade, packages, JobFlags::default()))
}

pub fn cmd_reinstall(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::Reinstall { packages } = command else {
        bail!("reinstall handler called for '{}'", command.name());
    };
    run_jobs(ctx, jobs(JobAction::Reinstall, packages, JobFlags::default()))
}

pub fn cmd_distro_sync(ctx: &mut Context, command: &Commands) -> Result<()> {
    let Commands::DistroSync { packages } = command else {
        bail!("distro-sync handler called for '{}'", command.name());
    };
    let patterns = or_everything(packages);
    run_jobs(ctx, jobs(JobAction::DistroSync, &patterns, JobFlags::default()))
}
