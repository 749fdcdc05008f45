#[tokio::main]
async fn main() -> std::io::Result<()> {
    table_server::run_with_config().await
}
