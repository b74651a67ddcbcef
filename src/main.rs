mod aws;
mod cli;
mod command;
mod commands;
mod engine;
mod error;
mod profile;
mod runner;
mod select;
mod ui;
mod workspace;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, ProfileCommand};
use command::Operation;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Plan(args) => commands::run::run(&ctx, Operation::Plan, &args),
        Command::Apply(args) => commands::run::run(&ctx, Operation::Apply, &args),
        Command::Destroy(args) => commands::run::run(&ctx, Operation::Destroy, &args),
        Command::Profile(cmd) => match cmd {
            ProfileCommand::List { json } => commands::profile::list(&ctx, json),
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "terramux", &mut io::stdout());
            Ok(())
        }
    }
}
