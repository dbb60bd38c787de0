//! entrygate-server
//!
//! HTTP front for anonymous event check-in: ticket issuance rebuilds the
//! event's Merkle tree, wallets fetch their authentication path, and the door
//! submits Groth16 proofs for one-time admission.

use entrygate_backend::{config::GateConfig, serve};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entrygate_backend=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let config = GateConfig::from_env()?;

    info!("Starting entrygate-server");
    info!("Database: {}", config.db_path.display());
    info!("Verification key: {}", config.verification_key.display());

    serve(config).await
}
