#[tokio::main]
async fn main() {
    let code = cloudharvest::cli::run().await;
    std::process::exit(code);
}
