//! `cs2hue run`: drive the lights until Ctrl-C.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cs2hue_config::{load_palette, to_orchestrator_config};
use cs2hue_core::{HueGateway, LightGateway, Orchestrator};

use super::Loaded;
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::server::{self, AppState};

pub async fn handle(args: RunArgs, ctx: &Loaded) -> Result<(), CliError> {
    let config = to_orchestrator_config(&ctx.config).map_err(|e| CliError::config(&ctx.path, e))?;
    if config.lights.is_empty() {
        return Err(CliError::NoLights {
            path: ctx.path.display().to_string(),
        });
    }

    let colors_path = ctx.colors_path();
    let palette = load_palette(&colors_path).map_err(|e| CliError::config(&ctx.path, e))?;
    let gateway: Arc<dyn LightGateway> = Arc::new(HueGateway::new(ctx.hue_client()?));
    let orchestrator = Orchestrator::new(config, palette, gateway);

    let cancel = CancellationToken::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if ctx.config.server.enabled && !args.no_server {
        let addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let state = AppState::new(orchestrator.clone(), colors_path);
        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state, token).await {
                warn!(error = %e, "HTTP server stopped");
            }
        }));
    }

    handles.push(tokio::spawn(log_presence(orchestrator.clone(), cancel.clone())));

    if let Err(e) = orchestrator.start().await {
        cancel.cancel();
        for handle in handles {
            let _ = handle.await;
        }
        return Err(e.into());
    }

    info!("running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    let stopped = orchestrator.stop().await;
    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    stopped?;
    Ok(())
}

/// Mode changes are only logged; presence integrations subscribe the same way.
async fn log_presence(orchestrator: Orchestrator, cancel: CancellationToken) {
    let mut events = orchestrator.subscribe_presence();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => debug!(change = %event.kind, at = %event.at, "presence"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "presence lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}
