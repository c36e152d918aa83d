//! `chatforge onboard` — Write a starter config file.

use chatforge_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("ChatForge — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config file already exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config file: {}", config_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Export ANTHROPIC_API_KEY, EXA_API_KEY, and FLUX_API_KEY");
    println!("  2. Export CHATFORGE_CLIENT_ID, CHATFORGE_CLIENT_SECRET, and CHATFORGE_BOT_JID");
    println!("  3. Run `chatforge serve`");

    Ok(())
}
