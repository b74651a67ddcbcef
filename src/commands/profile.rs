use anyhow::Result;

use crate::Context;
use crate::{profile, ui};

/// List detected profiles, human-readable or as JSON.
pub fn list(ctx: &Context, json: bool) -> Result<()> {
    let profiles = profile::discover()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    if profiles.is_empty() {
        ui::info("No profiles found");
        ui::dim("add matching .tfbackend and .tfvars files under backend/ and vars/");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header("Available profiles");
    }
    for found in &profiles {
        println!(
            "- {} (backend: {}/{}, vars: {}/{})",
            found.name, found.backend_dir, found.backend_config, found.vars_dir, found.var_file
        );
    }
    Ok(())
}
