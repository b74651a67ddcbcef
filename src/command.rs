//! Command vector construction for the external provisioning tool.
//!
//! The builder produces the exact argv and working directory for one
//! invocation. It never spawns anything itself; the engine owns process
//! lifecycles.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ExecError;
use crate::profile::Profile;

pub const DEFAULT_TOOL: &str = "terraform";

/// The three mutating operation kinds. Anything else is rejected at the
/// CLI boundary, so the builder only ever sees these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Plan,
    Apply,
    Destroy,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for one pass of the runner. Built once per invocation and
/// shared read-only across every task of that pass.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub operation: Operation,
    /// Caller-supplied passthrough arguments, appended last.
    pub args: Vec<String>,
    pub dry_run: bool,
}

/// A fully resolved invocation: program, argv, working directory.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    working_dir: Option<PathBuf>,
    backend_config: Option<String>,
    var_file: Option<String>,
    backend_dir: String,
    vars_dir: String,
    targets: Vec<String>,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_TOOL.to_string(),
            working_dir: None,
            backend_config: None,
            var_file: None,
            backend_dir: crate::profile::BACKEND_DIR.to_string(),
            vars_dir: crate::profile::VARS_DIR.to_string(),
            targets: Vec::new(),
        }
    }

    /// Seed the builder from a discovered profile.
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            backend_config: Some(profile.backend_config.clone()),
            var_file: Some(profile.var_file.clone()),
            backend_dir: profile.backend_dir.clone(),
            vars_dir: profile.vars_dir.clone(),
            ..Self::new()
        }
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }

    /// Full path to the backend config file, resolved against the working
    /// directory when one is set.
    pub fn backend_config_path(&self) -> Option<PathBuf> {
        let config = self.backend_config.as_ref()?;
        Some(self.resolve(Path::new(&self.backend_dir).join(config)))
    }

    /// Full path to the var file, resolved like `backend_config_path`.
    pub fn var_file_path(&self) -> Option<PathBuf> {
        let var_file = self.var_file.as_ref()?;
        Some(self.resolve(Path::new(&self.vars_dir).join(var_file)))
    }

    /// `<tool> init --backend-config=<path> --reconfigure`
    pub fn build_init(&self) -> CommandSpec {
        let mut args = vec!["init".to_string()];
        if let Some(config) = &self.backend_config {
            args.push(format!(
                "--backend-config={}",
                Path::new(&self.backend_dir).join(config).display()
            ));
        }
        args.push("--reconfigure".to_string());

        CommandSpec {
            program: self.program.clone(),
            args,
            working_dir: self.working_dir.clone(),
        }
    }

    /// Build the argv for a plan/apply/destroy invocation.
    ///
    /// A configured var file that does not exist on disk is a hard error,
    /// caught here before any subprocess is spawned.
    pub fn build(&self, options: &ExecutionOptions) -> Result<CommandSpec, ExecError> {
        if let Some(path) = self.var_file_path()
            && !path.exists()
        {
            return Err(ExecError::Config(format!(
                "var file not found: {}",
                path.display()
            )));
        }

        let mut args = vec![options.operation.as_str().to_string()];

        if let Some(var_file) = &self.var_file {
            args.push(format!(
                "--var-file={}",
                Path::new(&self.vars_dir).join(var_file).display()
            ));
        }

        for target in &self.targets {
            args.push(format!("--target={target}"));
        }

        match options.operation {
            // Plan always requests a machine-checkable exit code.
            Operation::Plan => args.push("--detailed-exitcode".to_string()),
            // Mutating commands auto-confirm except in dry-run mode.
            Operation::Apply | Operation::Destroy => {
                if !options.dry_run {
                    args.push("--auto-approve".to_string());
                }
            }
        }

        args.extend(options.args.iter().cloned());

        Ok(CommandSpec {
            program: self.program.clone(),
            args,
            working_dir: self.working_dir.clone(),
        })
    }

    fn resolve(&self, rel: PathBuf) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.join(rel),
            None => rel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_profile() -> Profile {
        Profile {
            name: "dev".to_string(),
            backend_config: "dev.tfbackend".to_string(),
            var_file: "dev.tfvars".to_string(),
            backend_dir: "backend".to_string(),
            vars_dir: "vars".to_string(),
        }
    }

    fn options(operation: Operation, dry_run: bool) -> ExecutionOptions {
        ExecutionOptions {
            operation,
            args: Vec::new(),
            dry_run,
        }
    }

    fn workspace_with_var_file() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("vars")).unwrap();
        fs::write(tmp.path().join("vars/dev.tfvars"), "").unwrap();
        tmp
    }

    #[test]
    fn init_command_vector() {
        let spec = CommandBuilder::for_profile(&test_profile()).build_init();
        assert_eq!(spec.program, "terraform");
        assert_eq!(
            spec.args,
            ["init", "--backend-config=backend/dev.tfbackend", "--reconfigure"]
        );
    }

    #[test]
    fn plan_requests_detailed_exitcode() {
        let tmp = workspace_with_var_file();
        let spec = CommandBuilder::for_profile(&test_profile())
            .with_working_dir(tmp.path())
            .build(&options(Operation::Plan, false))
            .unwrap();
        assert_eq!(
            spec.args,
            ["plan", "--var-file=vars/dev.tfvars", "--detailed-exitcode"]
        );
    }

    #[test]
    fn apply_auto_approves_unless_dry_run() {
        let tmp = workspace_with_var_file();
        let builder = CommandBuilder::for_profile(&test_profile()).with_working_dir(tmp.path());

        let real = builder.build(&options(Operation::Apply, false)).unwrap();
        assert!(real.args.contains(&"--auto-approve".to_string()));

        let dry = builder.build(&options(Operation::Apply, true)).unwrap();
        assert!(!dry.args.contains(&"--auto-approve".to_string()));
    }

    #[test]
    fn targets_and_passthrough_are_appended() {
        let tmp = workspace_with_var_file();
        let spec = CommandBuilder::for_profile(&test_profile())
            .with_working_dir(tmp.path())
            .with_targets(vec!["aws_s3_bucket.logs".to_string()])
            .build(&ExecutionOptions {
                operation: Operation::Destroy,
                args: vec!["--lock=false".to_string()],
                dry_run: false,
            })
            .unwrap();
        assert_eq!(
            spec.args,
            [
                "destroy",
                "--var-file=vars/dev.tfvars",
                "--target=aws_s3_bucket.logs",
                "--auto-approve",
                "--lock=false"
            ]
        );
    }

    #[test]
    fn missing_var_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CommandBuilder::for_profile(&test_profile())
            .with_working_dir(tmp.path())
            .build(&options(Operation::Plan, false))
            .unwrap_err();
        assert!(matches!(err, ExecError::Config(_)));
    }
}
