mod app;
mod args;
mod logging;

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = args::Cli::parse();
    if let Err(err) = logging::init(&cli.log_level) {
        eprintln!("fatal: {err:#}");
        std::process::exit(2);
    }

    if let Err(err) = app::run(cli).await {
        eprintln!("fatal: {err:#}");
        std::process::exit(err.exit_code());
    }
}
