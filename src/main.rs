use std::{net::SocketAddr, path::PathBuf};

use accessgate::{
    AppState, build_app,
    authz::AccessRequest,
    config::AccessGateConfig,
    models::RoleIdentity,
    observability::init_tracing,
};
use clap::Parser;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "accessgate.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the decision server (default)
    Serve,
    /// Load the configuration and rule set, then exit
    Validate,
    /// Evaluate a single request and print the decision
    Check {
        #[arg(long)]
        method: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        role: i32,
        #[arg(long)]
        license: Option<i32>,
        #[arg(long)]
        org: Option<Uuid>,
        #[arg(long)]
        user: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AccessGateConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Validate => run_validate(config).await,
        Command::Check {
            method,
            path,
            role,
            license,
            org,
            user,
        } => {
            let mut identity = RoleIdentity::new(role);
            identity.license_tier = license.map(Into::into);
            identity.organization_id = org;
            identity.user_id = user;
            run_check(config, &method, path, identity).await
        }
    }
}

async fn load_state(config: AccessGateConfig) -> AppState {
    match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_server(config: AccessGateConfig) {
    let state = load_state(config.clone()).await;
    let workers = state.spawn_refresh_workers();
    let app = build_app(&config, state.clone());

    let bind_addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    for worker in workers {
        let _ = worker.await;
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, stopping refresh workers");
    state.shutdown();
}

async fn run_validate(config: AccessGateConfig) {
    let state = load_state(config).await;
    println!(
        "Configuration OK: {} permission rules, {} license rules, {} roles",
        state.permissions.snapshot().len(),
        state.licenses.snapshot().len(),
        state.engine.resolver().hierarchy().len(),
    );
}

async fn run_check(config: AccessGateConfig, method: &str, path: String, identity: RoleIdentity) {
    let method = match http::Method::from_bytes(method.as_bytes()) {
        Ok(method) => method,
        Err(_) => {
            eprintln!("Error: invalid HTTP method '{method}'");
            std::process::exit(2);
        }
    };

    let state = load_state(config).await;
    let decision = state
        .engine
        .decide(&AccessRequest::new(method, path), &identity);

    match serde_json::to_string_pretty(&decision) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    if !decision.is_allowed() {
        std::process::exit(1);
    }
}
