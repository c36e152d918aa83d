//! `chatforge doctor` — Diagnose configuration problems.

use chatforge_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("ChatForge Doctor — Diagnostics");
    println!("==============================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  [ok] Config file present: {}", config_path.display());
    } else {
        println!("  [--] No config file; built-in defaults apply (run `chatforge onboard` to create one)");
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  [ok] Configuration valid");

            for (label, present) in [
                ("Text backend API key", config.text.api_key.is_some()),
                ("Search backend API key", config.search.api_key.is_some()),
                ("Image backend API key", config.image.api_key.is_some()),
                ("Delivery client id", config.delivery.client_id.is_some()),
                ("Delivery client secret", config.delivery.client_secret.is_some()),
                ("Delivery bot JID", config.delivery.bot_jid.is_some()),
            ] {
                if present {
                    println!("  [ok] {label} configured");
                } else {
                    println!("  [!!] {label} missing");
                    issues += 1;
                }
            }

            if config.gateway.webhook_secret.is_none() {
                println!("  [--] No webhook secret; inbound signatures will not be validated");
            }
        }
        Err(e) => {
            println!("  [!!] Configuration invalid: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
