//! Config command - print the effective configuration

use crate::style::*;
use anyhow::{Context, Result};
use sign_station::Config;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    print_header("Effective Configuration");

    let mut config = Config::load_from(path)?;
    config.apply_env();

    if !path.exists() {
        print_info(&format!(
            "{} not found, showing the built-in defaults",
            path.display()
        ));
    }
    println!();
    println!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render configuration")?
    );

    println!("{}", style_bold("Secrets:"));
    println!(
        "  PROJECT_SECRET_KEY   {}",
        secret_state(&config.ledger.project_secret_key)
    );
    println!(
        "  TELEGRAM_BOT_TOKEN   {}",
        secret_state(&config.notify.bot_token)
    );

    Ok(())
}

fn secret_state(value: &str) -> String {
    if value.is_empty() {
        style_yellow("not set")
    } else {
        style_green("set")
    }
}
