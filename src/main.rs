use std::env;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let (port, schedule) = match drawdown::api::serve_config(&raw_args[2..]) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
        if let Err(e) = drawdown::api::run_http_server(port, schedule).await {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let cli_args = raw_args
        .iter()
        .enumerate()
        .filter(|(i, arg)| !(*i == 1 && arg.as_str() == "compare"))
        .map(|(_, arg)| arg.clone());

    if let Err(e) = drawdown::api::run_cli(cli_args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
