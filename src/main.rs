mod app;
mod config;
mod console;
mod error;
mod gnss;
mod image_loader;
mod layout;
mod models;
mod scanner;
mod thumbnails;
mod tool;
mod video;

use anyhow::Result;

use app::MediaLinkApp;
use config::{Command, Config, USAGE};

fn run() -> Result<()> {
    match Config::from_env()? {
        Command::Help => println!("{USAGE}"),
        Command::Version => println!("medialink {}", env!("CARGO_PKG_VERSION")),
        Command::Run(config) => {
            config.validate()?;
            MediaLinkApp::new(config).run()?;
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medialink=info".parse().unwrap()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}
