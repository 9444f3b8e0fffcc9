use anyhow::Result;
use clap::Parser;
use tracing_subscriber::FmtSubscriber;

mod blacklist;
mod cache;
mod cli;
mod config;
#[cfg(test)]
mod fake_exchanger;
mod input;
mod macros;
mod modules;
mod output;
mod question;
mod record;
mod resolver;
mod runner;
mod status;
mod transport;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    setup_tracing(&args)?;

    let modules = modules::ModuleSet::with_builtins();
    let config = cli::resolve(&args, &modules)?;
    runner::run_lookups(config).await
}

fn setup_tracing(args: &cli::Cli) -> Result<()> {
    let level = cli::verbosity_level(args.verbosity)?;
    if args.log_file.is_empty() {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&args.log_file)?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::sync::Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}
