//! Operator review of dry-run results.
//!
//! Flow: every result is shown in arrival order with a per-profile yes/no
//! decision; a single-profile run stops there, while multi-profile runs
//! with at least one approval require one final batch confirmation.
//! Declining the batch discards every prior approval.

use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;

use super::executor::ExecutionResult;

/// Seam for yes/no questions so the review flow is testable without a
/// terminal.
pub trait Prompt {
    fn confirm(&mut self, message: &str) -> Result<bool>;
}

/// Terminal-backed prompt. Anything but an explicit yes is a rejection.
pub struct TermPrompt;

impl Prompt for TermPrompt {
    fn confirm(&mut self, message: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(message)
            .default(false)
            .interact()?)
    }
}

pub struct InteractionHandler<P> {
    prompt: P,
}

impl<P: Prompt> InteractionHandler<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }

    /// Review dry-run results and return the approved profile names.
    pub fn review(&mut self, results: &[ExecutionResult]) -> Result<Vec<String>> {
        let mut approved = Vec::new();

        for result in results {
            display_result(result);
            let message = format!("Approve execution for profile '{}'?", result.profile);
            if self.prompt.confirm(&message)? {
                println!("Approved: {}", result.profile);
                approved.push(result.profile.clone());
            } else {
                println!("Rejected: {}", result.profile);
            }
            println!("{}", "-".repeat(80));
        }

        if approved.is_empty() {
            println!("No profiles approved for execution.");
            return Ok(approved);
        }
        // A single reviewed profile needs no second confirmation.
        if results.len() == 1 {
            return Ok(approved);
        }
        self.confirm_batch(approved)
    }

    fn confirm_batch(&mut self, approved: Vec<String>) -> Result<Vec<String>> {
        println!("\nApproved profiles: {}", approved.join(", "));
        if self.prompt.confirm("Proceed with execution?")? {
            Ok(approved)
        } else {
            println!("Execution cancelled.");
            Ok(Vec::new())
        }
    }
}

fn display_result(result: &ExecutionResult) {
    println!("=== Profile: {} ===", result.profile.bold());
    println!("Duration: {:.2?}", result.duration);
    println!("Working directory: {}", result.workspace.display());
    match &result.error {
        Some(error) => {
            println!("Status: {}", "Failed".red());
            println!("Error: {error}");
        }
        None => println!("Status: {}", "Success".green()),
    }
    if !result.output.is_empty() {
        println!("\nComplete output:\n{}", result.output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::time::Duration;

    struct ScriptedPrompt {
        answers: VecDeque<bool>,
    }

    impl ScriptedPrompt {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
            }
        }

        fn exhausted(&self) -> bool {
            self.answers.is_empty()
        }
    }

    impl Prompt for ScriptedPrompt {
        fn confirm(&mut self, _message: &str) -> Result<bool> {
            Ok(self.answers.pop_front().expect("unexpected prompt"))
        }
    }

    fn result_for(profile: &str) -> ExecutionResult {
        ExecutionResult {
            profile: profile.to_string(),
            success: true,
            output: format!("Plan for {profile}"),
            error: None,
            duration: Duration::from_millis(1200),
            workspace: PathBuf::from("/tmp/workspace"),
        }
    }

    #[test]
    fn single_profile_approval_skips_batch_confirmation() {
        let mut handler = InteractionHandler::new(ScriptedPrompt::new(&[true]));
        let approved = handler.review(&[result_for("dev")]).unwrap();
        assert_eq!(approved, ["dev"]);
        assert!(handler.prompt.exhausted(), "no batch prompt should occur");
    }

    #[test]
    fn single_profile_rejection_is_final() {
        let mut handler = InteractionHandler::new(ScriptedPrompt::new(&[false]));
        let approved = handler.review(&[result_for("staging")]).unwrap();
        assert!(approved.is_empty());
        assert!(handler.prompt.exhausted());
    }

    #[test]
    fn batch_confirmation_finalizes_approved_subset() {
        // dev approved, prod rejected, batch confirmed.
        let mut handler = InteractionHandler::new(ScriptedPrompt::new(&[true, false, true]));
        let results = [result_for("dev"), result_for("prod")];
        let approved = handler.review(&results).unwrap();
        assert_eq!(approved, ["dev"]);
        assert!(handler.prompt.exhausted());
    }

    #[test]
    fn declined_batch_discards_all_approvals() {
        let mut handler = InteractionHandler::new(ScriptedPrompt::new(&[true, true, false]));
        let results = [result_for("dev"), result_for("prod")];
        let approved = handler.review(&results).unwrap();
        assert!(approved.is_empty());
    }

    #[test]
    fn zero_approvals_short_circuit_without_batch_prompt() {
        let mut handler = InteractionHandler::new(ScriptedPrompt::new(&[false, false]));
        let results = [result_for("dev"), result_for("prod")];
        let approved = handler.review(&results).unwrap();
        assert!(approved.is_empty());
        assert!(handler.prompt.exhausted(), "no batch prompt should occur");
    }
}
