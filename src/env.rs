use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

/// Loads the layered env files. Later files override earlier ones, but a
/// variable already present in the process environment is never replaced.
pub fn load_environment() -> Result<(), anyhow::Error> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    let preset: HashSet<String> = std::env::vars().map(|(key, _)| key).collect();

    for env_file in env_files {
        load_env_file(env_file, &preset)?;
    }

    Ok(())
}

fn load_env_file(path: &str, preset: &HashSet<String>) -> Result<(), anyhow::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    for item in dotenvy::from_filename_iter(path)? {
        let (key, value) = item?;
        if !preset.contains(&key) {
            std::env::set_var(key, value);
        }
    }

    info!("Loaded environment from: {}", path);
    Ok(())
}
