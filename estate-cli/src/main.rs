mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands, HttpMethod},
    commands::CommandExecutor,
    config::{AppConfig, Overrides},
    error::Result,
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {}", e);
        }
        if e.requires_relogin() {
            eprintln!("Run `estate login <email>` to start a new session.");
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    match args.command {
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults ({})", path.display());
            } else if show {
                let config = AppConfig::load(args.config.as_deref(), Overrides::default())?;
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let config = AppConfig::load(
        args.config.as_deref(),
        Overrides {
            api_url: args.api_url,
            timeout_secs: args.timeout,
            credentials_file: args.credentials,
        },
    )?;
    let executor = CommandExecutor::new(config, !args.quiet)?;

    match args.command {
        Commands::Login { email, password } => executor.login(&email, password).await?,
        Commands::Logout => executor.logout(),
        Commands::Status { output } => executor.status(output)?,
        Commands::Get { path, output } => {
            executor
                .request(HttpMethod::Get, &path, None, output)
                .await?
        }
        Commands::Request {
            method,
            path,
            data,
            output,
        } => {
            executor
                .request(method, &path, data.as_deref(), output)
                .await?
        }
        Commands::Completions { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
