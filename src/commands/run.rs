//! The plan/apply/destroy entry point.
//!
//! Resolves the selected profiles, drives the dry-run pass, collects
//! operator approval, runs the real pass for the approved subset, and
//! always tears the workspaces down afterwards.

use anyhow::{Result, bail};
use std::path::Path;

use crate::Context;
use crate::cli::RunArgs;
use crate::command::Operation;
use crate::engine::approval::{InteractionHandler, TermPrompt};
use crate::engine::{ExecutionResult, Executor};
use crate::profile::{self, Profile};
use crate::{select, ui};

pub fn run(ctx: &Context, operation: Operation, args: &RunArgs) -> Result<()> {
    profile::ensure_active_dir(Path::new("."))?;

    let available = profile::discover()?;
    let names = if args.profiles.is_empty() {
        let all = profile::names(&available);
        if all.is_empty() {
            bail!(
                "no profiles found; add matching .tfbackend and .tfvars files under backend/ and vars/"
            );
        }
        select::select_profiles(&all)?
    } else {
        args.profiles.clone()
    };

    let mut selected = Vec::new();
    for name in &names {
        match profile::find(&available, name) {
            Some(found) => selected.push(found.clone()),
            None => bail!("profile '{name}' not found"),
        }
    }

    if !ctx.quiet {
        ui::header(&format!("{operation} across {} profile(s)", selected.len()));
        if ctx.verbose > 0 {
            for found in &selected {
                ui::kv(&found.name, &format!("{}/{}", found.vars_dir, found.var_file));
            }
        }
    }

    let mut executor = Executor::new()?;
    executor.set_max_concurrency(args.jobs);
    executor.set_targets(args.target.clone());
    executor.set_extra_args(args.extra_args.clone());

    // Workspaces come down on every exit path; a teardown failure is a
    // warning, never a reason to mask the run's outcome.
    let outcome = run_passes(&mut executor, operation, selected);
    if let Err(error) = executor.cleanup() {
        log::warn!("workspace cleanup failed: {error:#}");
    }
    outcome
}

fn run_passes(executor: &mut Executor, operation: Operation, profiles: Vec<Profile>) -> Result<()> {
    let mut interaction = InteractionHandler::new(TermPrompt);
    let plan = executor.plan_dry_run(operation, profiles, &mut interaction)?;

    if plan.approved.is_empty() {
        ui::info("No profiles approved or execution cancelled.");
        return Ok(());
    }

    ui::section(&format!("Executing {operation} for approved profile(s)"));
    let results = executor.execute_approved(&plan)?;
    summarize(&results);

    if results.iter().any(|result| !result.success) {
        bail!("one or more profiles failed");
    }
    Ok(())
}

fn summarize(results: &[ExecutionResult]) {
    ui::header("Run summary");
    for result in results {
        if result.success {
            ui::success(&format!(
                "{} completed in {:.2?}",
                result.profile, result.duration
            ));
        } else {
            let detail = result
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_string(), ToString::to_string);
            ui::error(&format!(
                "{} failed after {:.2?}: {detail}",
                result.profile, result.duration
            ));
        }
    }
}
