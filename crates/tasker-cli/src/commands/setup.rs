use tasker_core::config::AppConfig;

use crate::error::CliError;

pub struct SetupOptions {
    pub url: Option<String>,
    pub token: Option<String>,
    pub probe_interval: Option<u64>,
    pub timeout: Option<u64>,
    pub clear: bool,
}

pub fn run_setup(mut config: AppConfig, options: SetupOptions) -> Result<(), CliError> {
    apply_setup(&mut config, options)?;
    let path = config.save()?;

    match config.remote_url.as_deref() {
        Some(url) => println!("Remote store set to {url}"),
        None => println!("Remote store cleared; working locally only"),
    }
    println!("Saved {}", path.display());
    Ok(())
}

pub fn apply_setup(config: &mut AppConfig, options: SetupOptions) -> Result<(), CliError> {
    if options.clear {
        config.remote_url = None;
        config.remote_auth_token = None;
    } else {
        let url = options
            .url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| CliError::Config("remote URL cannot be empty".into()))?;
        if !is_supported_url(&url) {
            return Err(CliError::Config(format!(
                "unsupported remote URL '{url}'; expected libsql://, https:// or http://"
            )));
        }
        config.remote_url = Some(url);
        if let Some(token) = options.token {
            config.remote_auth_token = Some(token);
        }
    }

    if let Some(secs) = options.probe_interval {
        config.probe_interval_secs = Some(secs);
    }
    if let Some(secs) = options.timeout {
        config.remote_timeout_secs = Some(secs);
    }
    Ok(())
}

fn is_supported_url(url: &str) -> bool {
    ["libsql://", "https://", "http://", "wss://", "ws://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}
