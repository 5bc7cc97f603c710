use std::net::SocketAddr;
use std::sync::Arc;
use tradebook::{api, config::Config, CsvOperationSource, OperationSource};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let mut csv_source = CsvOperationSource::new(config.operations_path.clone());
    if let Some(positions) = config.current_positions.clone() {
        csv_source = csv_source.with_current_positions(positions);
    }
    tracing::info!(
        "Reading operations from {} ({:?} starting positions)",
        csv_source.path().display(),
        config.starting_position_mode
    );
    let source: Arc<dyn OperationSource> = Arc::new(csv_source);

    // Create router
    let app = api::create_router(api::AppState::new(source, config));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
