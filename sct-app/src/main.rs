mod app;
mod cli;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt().with_target(false).init();

    let app = app::App::new(args)?;
    app.run()
}
