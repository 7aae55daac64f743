//! gridgate - operator CLI for a grid gateway node

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    gridgate_cli::run().await
}
