use studyhub_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    studyhub_observability::init();

    let config = AppConfig::load()?;

    // Dropping the worker handle stops the executor, so it lives until exit.
    let (app, workers) = studyhub_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    if let Some(workers) = workers {
        workers.shutdown().await;
    }
    Ok(())
}
