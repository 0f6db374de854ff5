use anyhow::{anyhow, Context};
use course_checkout::config::AppConfig;
use course_checkout::logging::init_tracing;
use course_checkout::orders::{
    HttpOrderGateway, OrderCreateInput, OrderGateway, SessionGuardedGateway,
};
use course_checkout::payments::{MessageBus, PaymentInterfaceRegistry, SurfaceCommand};
use course_checkout::services::PaymentOrchestrator;
use course_checkout::session::{CachedSession, SessionUser};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, tearing down checkout");
}

/// Stands in for the embedding page: every stdin line is a message posted by
/// the provider surface. Lines that are not JSON are posted as plain strings.
async fn relay_stdin(bus: MessageBus) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let message = serde_json::from_str::<JsonValue>(line)
                    .unwrap_or_else(|_| JsonValue::String(line.to_string()));
                let delivered = bus.post(message);
                info!(delivered, "surface message posted");
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        }
    }
}

async fn print_surface_commands(mut commands: mpsc::UnboundedReceiver<SurfaceCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            SurfaceCommand::Open { url } => println!("open payment surface: {}", url),
            SurfaceCommand::Close => println!("close payment surface"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    let order_path = std::env::args()
        .nth(1)
        .context("usage: checkout <order.json>")?;
    let raw = tokio::fs::read_to_string(&order_path)
        .await
        .with_context(|| format!("failed to read {}", order_path))?;
    let input: OrderCreateInput =
        serde_json::from_str(&raw).with_context(|| format!("invalid order in {}", order_path))?;

    let session = Arc::new(CachedSession::new(config.order_api.token.clone().map(
        |access_token| SessionUser {
            username: "checkout".to_string(),
            access_token,
        },
    )));
    let http = HttpOrderGateway::new(&config.order_api)?.with_session(session.clone());
    let gateway: Arc<dyn OrderGateway> = Arc::new(SessionGuardedGateway::new(http, session));

    let bus = MessageBus::new();
    let (surface_tx, surface_rx) = mpsc::unbounded_channel();
    let registry =
        PaymentInterfaceRegistry::from_config(&config.provider, bus.clone(), surface_tx)?;
    info!(providers = ?registry.list_available_providers(), "payment providers ready");

    tokio::spawn(print_surface_commands(surface_rx));
    tokio::spawn(relay_stdin(bus));

    let (success_tx, mut succeeded) = mpsc::unbounded_channel();
    let orchestrator = PaymentOrchestrator::new(
        gateway,
        registry,
        config.poller.clone(),
        Arc::new(move || {
            let _ = success_tx.send(());
        }),
    );
    let mut views = orchestrator.subscribe();

    let state = orchestrator.submit(input).await?;
    info!(state = %state, "order submitted");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            Some(()) = succeeded.recv() => break Ok(()),
            changed = views.changed() => {
                if changed.is_err() {
                    break Err(anyhow!("payment orchestrator stopped"));
                }
                let view = *views.borrow_and_update();
                println!("payment state: {}", view.state);
                if let Some(status) = view.status_message() {
                    println!("{}", status);
                }
                if let Some(message) = view.error_message() {
                    break Err(anyhow!(message));
                }
            }
            _ = &mut shutdown => {
                orchestrator.teardown();
                break Err(anyhow!("checkout interrupted"));
            }
        }
    };
    drop(orchestrator);

    // stdin is read on a blocking thread the runtime would wait for.
    match outcome {
        Ok(()) => {
            println!("payment succeeded");
            std::process::exit(0);
        }
        Err(e) => {
            error!(error = %e, "checkout failed");
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
