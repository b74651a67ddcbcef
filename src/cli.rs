use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "terramux")]
#[command(version)]
#[command(about = "Parallel Terraform runner across profile environments", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run terraform plan with selected profile(s)
    #[command(visible_alias = "p")]
    Plan(RunArgs),

    /// Run terraform apply with selected profile(s)
    #[command(visible_alias = "r")]
    Apply(RunArgs),

    /// Run terraform destroy with selected profile(s)
    #[command(visible_alias = "d")]
    Destroy(RunArgs),

    /// Manage Terraform profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Profiles to run against; interactive selection when omitted
    pub profiles: Vec<String>,

    /// Limit the run to specific resources (repeatable)
    #[arg(short, long)]
    pub target: Vec<String>,

    /// Maximum number of concurrent terraform processes
    #[arg(short, long, default_value_t = 5)]
    pub jobs: usize,

    /// Extra arguments passed through to terraform, after `--`
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List detected profiles
    #[command(visible_alias = "ls")]
    List {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}
