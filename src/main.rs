//! pump-desk - pump.fun bonding curve desk for Solana

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = pump_desk::adapters::cli::init();
    pump_desk::adapters::cli::execute(app).await
}
