use clap::Parser;
use std::sync::Arc;

mod analyzer;
mod backend;
mod command;
mod config;
mod error;
mod generator;
mod llm_manager;
mod logger;
mod providers;
mod server;
mod session;
mod shell;
mod tasks;

use backend::{Backend, DirectBackend, HttpBackend};
use config::Config;
use session::SessionState;
use shell::Shell;

#[derive(Parser)]
#[command(name = "terminus", version, about = "Adversarial task terminal for probing LLM failure modes")]
struct Args {
    /// Path to a configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Plain output: no colors, spinner or screen clearing
    #[arg(long)]
    headless: bool,
    /// Serve the analysis API instead of opening a terminal
    #[arg(long)]
    serve: bool,
    /// Address to bind with --serve
    #[arg(long)]
    host: Option<String>,
    /// Port to bind with --serve
    #[arg(short, long)]
    port: Option<u16>,
    /// Send analysis and generation to a running service at this URL
    #[arg(long, conflicts_with = "serve")]
    remote: Option<String>,
    /// Run one terminal command and exit
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logger::init(args.verbose);

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.headless, args.host.clone(), args.port);

    if args.serve {
        return server::run_server(&config).await;
    }

    let backend: Arc<dyn Backend> = match &args.remote {
        Some(url) => Arc::new(HttpBackend::new(url)),
        None => Arc::new(DirectBackend::from_config(&config.provider)),
    };
    let state = SessionState::new(&config, backend.environment());

    if !args.command.is_empty() {
        let line = args.command.join(" ");
        return shell::run_once(state, backend.as_ref(), &config.ui, &line).await;
    }

    let mut shell = Shell::new(state, backend, config.ui.clone(), args.headless);
    shell.run().await
}
