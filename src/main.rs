use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    pressflip::logging::init().context("init logging")?;

    let cli = pressflip::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = pressflip::config::Config::from_env().context("load configuration")?;

    match cli.command {
        pressflip::cli::Command::Publish(args) => {
            pressflip::publish::command(args, config)
                .await
                .context("publish")?;
        }
        pressflip::cli::Command::Serve(args) => {
            pressflip::app::serve(args.addr, config).await.context("serve")?;
        }
    }

    Ok(())
}
