use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

use super::{cli::try_cli_analyze, state::PikeLanguageServer};

pub async fn run() {
    init_tracing();

    match try_cli_analyze().await {
        Ok(Some(output)) => {
            println!("{}", output);
            return;
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("pike-lsp analyze error: {e:#}");
            std::process::exit(2);
        }
    }

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(PikeLanguageServer::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

// stdout carries the protocol, so logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
