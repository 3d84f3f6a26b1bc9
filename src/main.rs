use std::sync::Arc;

use persona_widget::cli::{TerminalSurface, run_repl};
use persona_widget::config::WidgetConfig;
use persona_widget::controller::PersonaController;
use persona_widget::gateway::{HttpGateway, RequestGateway};
use persona_widget::storage::{DurableStore, FileStore, MemoryStore};
use persona_widget::surface::Surface;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the transcript on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = WidgetConfig::from_env()?;

    eprintln!("🤖 Persona Widget v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Service: {}", config.base_url);
    eprintln!("   State: {}", config.state_path.display());

    let store: Arc<dyn DurableStore> = match FileStore::open(&config.state_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!(
                "   Warning: could not open {} ({}); nothing will be remembered",
                config.state_path.display(),
                e
            );
            Arc::new(MemoryStore::new())
        }
    };

    let gateway: Arc<dyn RequestGateway> = Arc::new(HttpGateway::new(config.base_url.clone()));
    let surface: Arc<dyn Surface> = Arc::new(TerminalSurface::new());

    let controller = PersonaController::new(config, gateway, store, surface).await;
    controller.mount().await;

    run_repl(controller).await?;
    Ok(())
}
