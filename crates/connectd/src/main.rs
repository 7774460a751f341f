mod cli;
mod error;

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use connectd_api::TransportConfig;
use connectd_core::Session;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path: PathBuf = cli.config.unwrap_or_else(connectd_config::config_path);
    let config_err = |e: connectd_config::ConfigError| CliError::from_config(e, &path);

    let config = connectd_config::load_from(&path).map_err(config_err)?;
    let (profile_name, profile) = config.profile(cli.profile.as_deref()).map_err(config_err)?;
    let session_config =
        connectd_config::to_session_config(&profile, &config.defaults).map_err(config_err)?;
    let credentials =
        connectd_config::resolve_credentials(&profile, &profile_name).map_err(config_err)?;
    let transport = TransportConfig::default().with_timeout(session_config.timeout);
    let resolver = connectd_config::build_resolver(&profile, &config.defaults, &transport)
        .map_err(config_err)?;

    if cli.check {
        println!(
            "profile '{profile_name}' ok: device '{}' ({}, id {}), user '{}'",
            session_config.device_name,
            session_config.device_type,
            session_config.device_id,
            credentials.username()
        );
        return Ok(());
    }

    debug!(profile = %profile_name, credentials = credentials.kind(), "connecting");
    let session = Session::connect(&session_config, resolver.as_ref(), &credentials)
        .await
        .map_err(|e| CliError::from_core(e, &profile_name))?;
    info!(
        device = %session.device().name,
        username = session.username(),
        "device online"
    );

    let running = session.run();
    tokio::pin!(running);

    let result = tokio::select! {
        result = &mut running => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupt received, closing session");
            session.close();
            running.await
        }
    };
    session.close();

    result.map_err(|e| CliError::from_core(e, &profile_name))
}
