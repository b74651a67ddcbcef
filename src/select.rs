//! Interactive profile selection.
//!
//! When the caller names no profiles, an fzf multi-select is offered over
//! the discovered names. Without fzf on PATH, a numbered list accepting
//! comma-separated indices stands in.

use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use std::process::{Command, Stdio};

use crate::runner;

/// Let the operator pick one or more profiles from `names`.
pub fn select_profiles(names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        bail!("no profiles available for selection");
    }
    if names.len() == 1 {
        println!("Using the only available profile: {}", names[0]);
        return Ok(vec![names[0].clone()]);
    }

    if runner::command_exists("fzf") {
        fzf_select(names)
    } else {
        fallback_select(names)
    }
}

fn fzf_select(names: &[String]) -> Result<Vec<String>> {
    let mut child = Command::new("fzf")
        .args([
            "--multi",
            "--prompt=Select profiles (Tab to select multiple): ",
            "--header=Available profiles - Tab to select, Enter to confirm",
            "--height=40%",
            "--border",
            "--reverse",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        // fzf draws its interface on stderr, keep it on the terminal.
        .stderr(Stdio::inherit())
        .spawn()
        .context("error starting fzf")?;

    {
        let mut stdin = child.stdin.take().context("fzf stdin unavailable")?;
        for name in names {
            writeln!(stdin, "{name}")?;
        }
    }

    let output = child.wait_with_output().context("error reading fzf output")?;
    if !output.status.success() {
        bail!("fzf selection cancelled or failed");
    }

    let selected: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if selected.is_empty() {
        bail!("no profiles selected");
    }
    Ok(selected)
}

fn fallback_select(names: &[String]) -> Result<Vec<String>> {
    println!("fzf not found, using fallback selection method");
    println!("Available profiles:");
    for (i, name) in names.iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }
    print!("Select profiles (comma-separated numbers, e.g. 1,3): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("error reading selection input")?;
    parse_selection(&input, names)
}

fn parse_selection(input: &str, names: &[String]) -> Result<Vec<String>> {
    let mut selected = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let index: usize = part
            .parse()
            .with_context(|| format!("invalid selection '{part}': must be a number"))?;
        if index < 1 || index > names.len() {
            bail!("invalid selection {index}: valid range is 1-{}", names.len());
        }
        selected.push(names[index - 1].clone());
    }
    if selected.is_empty() {
        bail!("no profiles selected");
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["dev".to_string(), "staging".to_string(), "prod".to_string()]
    }

    #[test]
    fn parses_comma_separated_indices() {
        let selected = parse_selection("1,3", &names()).unwrap();
        assert_eq!(selected, ["dev", "prod"]);
    }

    #[test]
    fn tolerates_whitespace_and_trailing_commas() {
        let selected = parse_selection(" 2 , 1 ,\n", &names()).unwrap();
        assert_eq!(selected, ["staging", "dev"]);
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert!(parse_selection("0", &names()).is_err());
        assert!(parse_selection("4", &names()).is_err());
    }

    #[test]
    fn rejects_non_numeric_and_empty_input() {
        assert!(parse_selection("dev", &names()).is_err());
        assert!(parse_selection("", &names()).is_err());
        assert!(parse_selection(",,", &names()).is_err());
    }
}
