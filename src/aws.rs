//! AWS SSO session recovery.
//!
//! Detection is a substring match against one fixed provider signature,
//! centralized here so every place that inspects captured error text uses
//! the same classifier.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

use crate::runner;

/// Error text emitted by the AWS provider when temporary SSO credentials
/// have lapsed.
pub const SSO_SESSION_EXPIRED: &str =
    "SSOProviderInvalidToken: the SSO session has expired or is invalid";

/// Does this captured output carry the session-expiry signature?
pub fn session_expired(output: &str) -> bool {
    output.contains(SSO_SESSION_EXPIRED)
}

/// Extract the `profile` value from backend config content.
///
/// The first non-comment, non-blank line starting with the `profile` key
/// wins; quoted and unquoted values are both accepted. A backend config
/// without a `profile` key is a hard error, since we cannot know which
/// identity to refresh.
pub fn extract_profile(content: &str) -> Result<String> {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with("profile")
            && let Some((_, value)) = line.split_once('=')
        {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            return Ok(value.to_string());
        }
    }
    bail!("profile parameter not found in backend config")
}

/// Run `aws sso login` for a provider profile, terminal attached so any
/// interactive confirmation is visible.
pub fn refresh_sso(profile_name: &str) -> Result<()> {
    log::info!("running AWS SSO login for profile '{profile_name}'");
    let status = runner::run("aws", &["sso", "login", "--profile", profile_name])?;
    if !status.success() {
        bail!("aws sso login failed for profile '{profile_name}'");
    }
    Ok(())
}

/// Read the backend config at `path` and refresh the SSO session for the
/// profile it names.
pub fn refresh_from_backend_config(path: &Path) -> Result<()> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("error reading backend config {}", path.display()))?;
    let profile_name =
        extract_profile(&content).context("error extracting profile from backend config")?;
    refresh_sso(&profile_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_expired_session_signature() {
        let stderr = format!("Error: {SSO_SESSION_EXPIRED}\n\n  on main.tf line 1");
        assert!(session_expired(&stderr));
        assert!(!session_expired("Error: NoSuchBucket"));
    }

    #[test]
    fn extracts_quoted_profile() {
        let content = "bucket = \"state\"\nprofile = \"dev-admin\"\nregion = \"eu-west-1\"";
        assert_eq!(extract_profile(content).unwrap(), "dev-admin");
    }

    #[test]
    fn extracts_unquoted_profile() {
        assert_eq!(extract_profile("profile = staging").unwrap(), "staging");
        assert_eq!(extract_profile("profile='ops'").unwrap(), "ops");
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let content = "# profile = \"commented-out\"\n\nprofile = \"real\"";
        assert_eq!(extract_profile(content).unwrap(), "real");
    }

    #[test]
    fn missing_profile_key_is_an_error() {
        assert!(extract_profile("bucket = \"state\"\nregion = \"us-east-1\"").is_err());
        assert!(extract_profile("").is_err());
    }
}
