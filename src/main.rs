use room_rank_api::observability::init_logging;
use room_rank_api::{Config, RankError, RankServer};

#[tokio::main]
async fn main() -> Result<(), RankError> {
    init_logging()?;

    tracing::info!("Starting room rank API server");

    let config = Config::from_env()?;
    let server = RankServer::new(config).await?;
    server.run().await?;

    Ok(())
}
