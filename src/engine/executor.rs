//! Bounded parallel execution of the provisioning tool across profiles.
//!
//! One task per profile, at most `max_concurrency` running at once. Each
//! task initializes the tool in its workspace (with a single credential
//! retry), builds its command vector, spawns the tool with both streams
//! piped, forwards every line as a tagged event, and finalizes exactly one
//! result after both streams drain and the process exits. A profile's
//! failure never cancels its siblings.

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use super::approval::{InteractionHandler, Prompt};
use super::stream::{self, StreamEvent};
use crate::aws;
use crate::command::{CommandBuilder, CommandSpec, DEFAULT_TOOL, ExecutionOptions, Operation};
use crate::error::ExecError;
use crate::profile::Profile;
use crate::ui;
use crate::workspace::WorkspaceManager;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Outcome of one (profile, pass) task. Immutable once produced.
#[derive(Debug)]
pub struct ExecutionResult {
    pub profile: String,
    pub success: bool,
    /// Combined stdout + stderr, in per-stream order.
    pub output: String,
    pub error: Option<ExecError>,
    pub duration: Duration,
    pub workspace: PathBuf,
}

/// Produced by the dry-run pass, consumed by the real pass.
///
/// `approved` is always a subset of `profiles`: it is built from the
/// reviewed results, and the real pass re-filters against `profiles`.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub operation: Operation,
    pub profiles: Vec<Profile>,
    pub approved: Vec<String>,
}

pub struct Executor {
    max_concurrency: usize,
    extra_args: Vec<String>,
    targets: Vec<String>,
    tool: String,
    workspaces: WorkspaceManager,
}

impl Executor {
    pub fn new() -> Result<Self> {
        Ok(Self::with_workspaces(WorkspaceManager::new()?))
    }

    fn with_workspaces(workspaces: WorkspaceManager) -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            extra_args: Vec::new(),
            targets: Vec::new(),
            tool: DEFAULT_TOOL.to_string(),
            workspaces,
        }
    }

    pub fn set_max_concurrency(&mut self, jobs: usize) {
        self.max_concurrency = jobs.max(1);
    }

    pub fn set_extra_args(&mut self, args: Vec<String>) {
        self.extra_args = args;
    }

    pub fn set_targets(&mut self, targets: Vec<String>) {
        self.targets = targets;
    }

    /// Allocate workspaces, run the dry-run pass, and collect approvals.
    ///
    /// The dry run always uses plan semantics: a destroy request becomes
    /// `plan --destroy`, so the operator reviews a removal-scoped plan
    /// instead of a plain one.
    pub fn plan_dry_run<P: Prompt>(
        &mut self,
        operation: Operation,
        profiles: Vec<Profile>,
        interaction: &mut InteractionHandler<P>,
    ) -> Result<ExecutionPlan> {
        if profiles.is_empty() {
            bail!("no profiles provided");
        }

        let names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
        self.workspaces
            .allocate(&names)
            .context("error creating workspaces")?;

        ui::section(&format!("Dry-run pass for {operation}"));
        ui::dim(&format!(
            "executing {} profile(s) with real-time output",
            profiles.len()
        ));

        let mut args = Vec::new();
        if operation == Operation::Destroy {
            args.push("--destroy".to_string());
        }
        args.extend(self.extra_args.iter().cloned());

        let options = ExecutionOptions {
            operation: Operation::Plan,
            args,
            dry_run: true,
        };
        let results = self.run_pass(&profiles, &options)?;

        ui::header("Dry run completed - plan review");

        let approved = interaction
            .review(&results)
            .context("error collecting approvals")?;

        Ok(ExecutionPlan {
            operation,
            profiles,
            approved,
        })
    }

    /// Run the real (mutating) pass, restricted to approved profiles.
    /// Zero approvals means zero tasks.
    pub fn execute_approved(&self, plan: &ExecutionPlan) -> Result<Vec<ExecutionResult>> {
        let approved = approved_profiles(plan);
        if approved.is_empty() {
            return Ok(Vec::new());
        }

        ui::dim(&format!(
            "executing {} approved profile(s) with real-time output",
            approved.len()
        ));
        let options = ExecutionOptions {
            operation: plan.operation,
            args: self.extra_args.clone(),
            dry_run: false,
        };
        self.run_pass(&approved, &options)
    }

    /// Tear down every workspace this invocation allocated. Safe to call
    /// on every exit path, including after failures.
    pub fn cleanup(&mut self) -> Result<()> {
        self.workspaces.teardown()
    }

    /// One bounded pass: a pool capped at `max_concurrency`, one task per
    /// profile, all output funneled into a single display consumer. The
    /// pass returns once every task has produced its result and the
    /// consumer has drained the channel.
    fn run_pass(
        &self,
        profiles: &[Profile],
        options: &ExecutionOptions,
    ) -> Result<Vec<ExecutionResult>> {
        let (tx, rx) = mpsc::channel();
        let display = stream::spawn(rx);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_concurrency)
            .build()
            .context("failed to create execution thread pool")?;

        let results = pool.install(|| {
            profiles
                .par_iter()
                .map_with(tx.clone(), |tx, profile| {
                    self.execute_profile(profile, options, tx)
                })
                .collect::<Vec<_>>()
        });

        // Hang up the last sender so the display consumer terminates.
        drop(tx);
        if display.join().is_err() {
            log::warn!("streaming display thread panicked");
        }

        Ok(results)
    }

    fn execute_profile(
        &self,
        profile: &Profile,
        options: &ExecutionOptions,
        tx: &Sender<StreamEvent>,
    ) -> ExecutionResult {
        let started = Instant::now();

        let Some(workspace) = self.workspaces.path_for(&profile.name) else {
            let error =
                ExecError::Build(format!("workspace not found for profile {}", profile.name));
            return error_result(profile, error, started, PathBuf::new(), tx);
        };
        let workspace = workspace.to_path_buf();

        let _ = tx.send(StreamEvent::stdout(&profile.name, "Starting execution..."));

        if let Err(error) = self.init_workspace(profile, &workspace, tx) {
            return error_result(profile, error, started, workspace, tx);
        }

        let builder = CommandBuilder::for_profile(profile)
            .with_program(&self.tool)
            .with_working_dir(&workspace)
            .with_targets(self.targets.clone());
        let spec = match builder.build(options) {
            Ok(spec) => spec,
            Err(error) => return error_result(profile, error, started, workspace, tx),
        };

        self.run_streaming(profile, &spec, started, workspace, tx)
    }

    /// Run `init` in the workspace. A failure carrying the session-expiry
    /// signature triggers one credential refresh and exactly one retry; a
    /// second failure is terminal for this profile.
    fn init_workspace(
        &self,
        profile: &Profile,
        workspace: &Path,
        tx: &Sender<StreamEvent>,
    ) -> Result<(), ExecError> {
        let builder = CommandBuilder::for_profile(profile)
            .with_program(&self.tool)
            .with_working_dir(workspace);

        let backend_path = builder
            .backend_config_path()
            .ok_or_else(|| ExecError::Config("profile has no backend config".to_string()))?;
        if !backend_path.exists() {
            return Err(ExecError::Config(format!(
                "backend config file not found: {}",
                backend_path.display()
            )));
        }

        let spec = builder.build_init();
        let _ = tx.send(StreamEvent::stdout(&profile.name, "INIT: Initializing..."));

        let captured = stream_command(&spec, &profile.name, Some("INIT: "), tx)
            .map_err(|e| ExecError::Execution(e.to_string()))?;
        if captured.status.success() {
            let _ = tx.send(StreamEvent::stdout(&profile.name, "INIT: Initialized"));
            return Ok(());
        }
        if !aws::session_expired(&captured.stderr) {
            let _ = tx.send(StreamEvent::stderr(
                &profile.name,
                format!("INIT: failed ({})", captured.status),
            ));
            return Err(ExecError::Execution(format!(
                "init exited with {}",
                captured.status
            )));
        }

        let _ = tx.send(StreamEvent::stderr(
            &profile.name,
            "INIT: AWS SSO session has expired, attempting login...",
        ));
        aws::refresh_from_backend_config(&backend_path)
            .map_err(|e| ExecError::Credential(format!("{e:#}")))?;

        let retry = stream_command(&spec, &profile.name, Some("INIT: "), tx)
            .map_err(|e| ExecError::Execution(e.to_string()))?;
        if retry.status.success() {
            let _ = tx.send(StreamEvent::stdout(&profile.name, "INIT: Initialized"));
            Ok(())
        } else if aws::session_expired(&retry.stderr) {
            Err(ExecError::Credential(format!(
                "session still expired after login ({})",
                retry.status
            )))
        } else {
            Err(ExecError::Execution(format!(
                "init exited with {} after credential refresh",
                retry.status
            )))
        }
    }

    fn run_streaming(
        &self,
        profile: &Profile,
        spec: &CommandSpec,
        started: Instant,
        workspace: PathBuf,
        tx: &Sender<StreamEvent>,
    ) -> ExecutionResult {
        let captured = match stream_command(spec, &profile.name, None, tx) {
            Ok(captured) => captured,
            Err(e) => {
                return error_result(
                    profile,
                    ExecError::Execution(format!("{e:#}")),
                    started,
                    workspace,
                    tx,
                );
            }
        };

        let duration = started.elapsed();
        let output = format!("{}{}", captured.stdout, captured.stderr);

        if captured.status.success() {
            let _ = tx.send(StreamEvent::stdout(
                &profile.name,
                format!("✅ Execution completed successfully in {duration:.2?}"),
            ));
            return ExecutionResult {
                profile: profile.name.clone(),
                success: true,
                output,
                error: None,
                duration,
                workspace,
            };
        }

        // Session expiry outside init is recorded, not retried: the retry
        // budget is scoped to initialization only.
        let error = if aws::session_expired(&captured.stderr) {
            ExecError::Credential(format!("session expired ({})", captured.status))
        } else {
            ExecError::Execution(format!("{} exited with {}", spec.program, captured.status))
        };
        let _ = tx.send(StreamEvent::stderr(
            &profile.name,
            format!("❌ Execution failed after {duration:.2?}: {error}"),
        ));

        ExecutionResult {
            profile: profile.name.clone(),
            success: false,
            output,
            error: Some(error),
            duration,
            workspace,
        }
    }
}

/// Profiles from the plan whose names were approved. Names outside the
/// plan's profile list cannot produce tasks.
fn approved_profiles(plan: &ExecutionPlan) -> Vec<Profile> {
    plan.profiles
        .iter()
        .filter(|profile| plan.approved.contains(&profile.name))
        .cloned()
        .collect()
}

fn error_result(
    profile: &Profile,
    error: ExecError,
    started: Instant,
    workspace: PathBuf,
    tx: &Sender<StreamEvent>,
) -> ExecutionResult {
    let _ = tx.send(StreamEvent::stderr(
        &profile.name,
        format!("❌ Error: {error}"),
    ));
    ExecutionResult {
        profile: profile.name.clone(),
        success: false,
        output: String::new(),
        error: Some(error),
        duration: started.elapsed(),
        workspace,
    }
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Spawn the tool and stream both output pipes line by line.
///
/// Two reader threads drain stdout and stderr concurrently; the function
/// only observes process exit after both readers finish, so no output can
/// be lost or reordered relative to the exit status.
fn stream_command(
    spec: &CommandSpec,
    profile: &str,
    prefix: Option<&str>,
    tx: &Sender<StreamEvent>,
) -> Result<CapturedOutput> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn {}", spec.program))?;
    let stdout = child.stdout.take().context("child stdout unavailable")?;
    let stderr = child.stderr.take().context("child stderr unavailable")?;

    let (out_buf, err_buf) = thread::scope(|scope| {
        let out = scope.spawn(move || forward_lines(stdout, profile, prefix, false, tx));
        let err = scope.spawn(move || forward_lines(stderr, profile, prefix, true, tx));
        (
            out.join().unwrap_or_default(),
            err.join().unwrap_or_default(),
        )
    });

    let status = child
        .wait()
        .with_context(|| format!("failed waiting for {}", spec.program))?;

    Ok(CapturedOutput {
        status,
        stdout: out_buf,
        stderr: err_buf,
    })
}

fn forward_lines(
    reader: impl Read,
    profile: &str,
    prefix: Option<&str>,
    is_error: bool,
    tx: &Sender<StreamEvent>,
) -> String {
    let mut captured = String::new();
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else { break };
        captured.push_str(&line);
        captured.push('\n');

        let text = match prefix {
            Some(prefix) => format!("{prefix}{line}"),
            None => line,
        };
        let event = if is_error {
            StreamEvent::stderr(profile, text)
        } else {
            StreamEvent::stdout(profile, text)
        };
        let _ = tx.send(event);
    }
    captured
}
