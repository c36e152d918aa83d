//! `chatforge serve` — Start the webhook gateway and reply pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use chatforge_backends::{AnthropicText, ExaSearch, FluxImage};
use chatforge_config::AppConfig;
use chatforge_context::ContextStore;
use chatforge_core::{Clock, SystemClock};
use chatforge_gateway::delivery::ZoomDelivery;
use chatforge_gateway::GatewayState;
use chatforge_orchestrator::Orchestrator;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let text = Arc::new(
        AnthropicText::new(&config.text)
            .map_err(|e| format!("Text backend unavailable: {e}"))?,
    );
    let search = Arc::new(
        ExaSearch::new(&config.search)
            .map_err(|e| format!("Search backend unavailable: {e}"))?,
    );
    let image = Arc::new(
        FluxImage::new(&config.image)
            .map_err(|e| format!("Image backend unavailable: {e}"))?,
    );
    let delivery = Arc::new(
        ZoomDelivery::new(&config.delivery, clock.clone())
            .map_err(|e| format!("Delivery unavailable: {e}"))?,
    );

    let store = Arc::new(ContextStore::new(
        clock.clone(),
        config.context.max_history,
        config.context.expiration_hours,
    ));
    let _sweep = store.start_sweep(Duration::from_secs(config.context.sweep_interval_secs));

    let orchestrator = Arc::new(Orchestrator::new(
        text,
        search,
        image,
        delivery,
        store,
        clock,
        config.image.clone(),
    ));

    println!("ChatForge Gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!(
        "   Webhook signature validation: {}",
        if config.gateway.webhook_secret.is_some() {
            "on"
        } else {
            "off"
        }
    );

    info!(
        sweep_interval_secs = config.context.sweep_interval_secs,
        max_history = config.context.max_history,
        "Context store sweeper started"
    );

    let state = Arc::new(GatewayState {
        orchestrator,
        webhook_secret: config.gateway.webhook_secret.clone(),
    });

    chatforge_gateway::serve(state, &config.gateway.host, config.gateway.port).await?;

    Ok(())
}
