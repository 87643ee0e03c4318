#[tokio::main]
async fn main() -> anyhow::Result<()> {
    linkagent::run_cli().await
}
