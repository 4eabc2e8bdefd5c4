//! Primary entrypoint for the `glossa` CLI binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    glossa_cli::run().await
}
