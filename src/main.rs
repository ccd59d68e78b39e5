#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scavbot::cli::run().await
}
