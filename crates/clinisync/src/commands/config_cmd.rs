//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn read_token(label: &str) -> Result<SecretString, CliError> {
    let token = rpassword::prompt_password(label).map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(SecretString::from(token.trim().to_owned()))
}

/// Copy of the config with plaintext tokens masked, for display.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    for profile in shown.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some("********".into());
        }
    }
    shown
}

fn profile_not_found(name: String, cfg: &Config) -> CliError {
    CliError::ProfileNotFound {
        name,
        available: config::available_profiles(cfg),
    }
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init() -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("clinisync configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let mut cfg = config::load_config_or_default();

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let api_url: String = Input::new()
        .with_prompt("Back-end URL")
        .default("https://clinic.example.org".into())
        .interact_text()
        .map_err(prompt_err)?;

    let ws_url: String = Input::new()
        .with_prompt("Realtime URL (blank to poll only)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    let storage = &[
        "Store token in system keyring (recommended)",
        "Read token from an environment variable",
        "Save token to config file (plaintext)",
        "No token (local development)",
    ];
    let choice = Select::new()
        .with_prompt("Authentication")
        .items(storage)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let mut profile = Profile {
        api_url,
        ws_url: Some(ws_url).filter(|u| !u.trim().is_empty()),
        ..Profile::default()
    };
    match choice {
        0 => {
            let token = read_token("Bearer token: ")?;
            clinisync_config::store_token(&profile_name, &token)?;
            eprintln!("   Token stored in system keyring");
        }
        1 => {
            let var: String = Input::new()
                .with_prompt("Environment variable")
                .default("CLINIC_TOKEN".into())
                .interact_text()
                .map_err(prompt_err)?;
            profile.token_env = Some(var);
        }
        2 => {
            use secrecy::ExposeSecret;
            profile.token = Some(read_token("Bearer token: ")?.expose_secret().to_owned());
        }
        _ => profile.anonymous = true,
    }

    let realtime = profile.ws_url.is_some()
        && Confirm::new()
            .with_prompt("Use the realtime channel?")
            .default(true)
            .interact()
            .map_err(prompt_err)?;
    profile.realtime = Some(realtime);

    cfg.profiles.insert(profile_name.clone(), profile);
    cfg.default_profile = Some(profile_name.clone());
    config::save_config(&cfg)?;

    eprintln!("\nConfiguration written to {}", config_path.display());
    eprintln!("  Active profile: {profile_name}");
    eprintln!("\n  Test it: clinisync alerts list");
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config_or_default());
            let out = output::render_single(
                global.output,
                &cfg,
                toml_or_debug,
                |_| config::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(profile_not_found(profile_name, &cfg));
            }

            let token = read_token("Bearer token: ")?;
            clinisync_config::store_token(&profile_name, &token)?;
            output::print_status(
                &format!("Token stored in system keyring for profile '{profile_name}'"),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                output::print_status("No profiles configured. Run: clinisync config init", global.quiet);
            } else {
                for name in cfg.profiles.keys() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(profile_not_found(name, &cfg));
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            output::print_status(&format!("Default profile set to '{name}'"), global.quiet);
            Ok(())
        }
    }
}

fn toml_or_debug(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|_| format!("{cfg:#?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_tokens() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "ward".into(),
            Profile {
                api_url: "https://clinic.example.org".into(),
                token: Some("s3cret".into()),
                ..Profile::default()
            },
        );
        let shown = redacted(&cfg);
        assert_eq!(shown.profiles["ward"].token.as_deref(), Some("********"));
        assert!(!toml_or_debug(&shown).contains("s3cret"));
    }
}
