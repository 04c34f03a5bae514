//! CLI entry point and command dispatch

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::args::{Cli, Commands};
use super::commands;
use crate::{CliArgs, Config, ExitCode};
use uxpal_utils::error::{ConfigError, exit_code_for, report_for};
use uxpal_utils::logging::{LogFormat, init_tracing};

/// Main CLI entry point.
///
/// Handles all output, including error reports. Returns the exit code for
/// `main` to pass to `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("Warning: failed to initialise logging: {e}");
    }

    execute(cli)
}

/// Resolve configuration and run one parsed command.
pub(crate) fn execute(cli: Cli) -> Result<(), ExitCode> {
    let operation = cli.command.operation();

    let config = match cli_args_for(&cli).and_then(|args| Config::discover(&args)) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("{}", report_for(&error));
            // Unreadable or unparseable config files surface as argument errors.
            let code = exit_code_for(&error);
            return Err(if code == ExitCode::INTERNAL {
                ExitCode::CLI_ARGS
            } else {
                code
            });
        }
    };
    debug!(operation, provider = config.llm_provider(), "Configuration loaded");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        spawn_ctrl_c_handler(cancel.clone());
        dispatch(cli.command, &config, cancel).await
    });

    if let Err(error) = result {
        eprintln!("{}", report_for(&error));
        return Err(exit_code_for(&error));
    }
    Ok(())
}

async fn dispatch(command: Commands, config: &Config, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::Run {
            input,
            input_file,
            run_id,
            json,
            ..
        } => {
            let request = commands::read_request(input, input_file.as_deref())?;
            commands::execute_run_command(&request, run_id.as_deref(), json, config, cancel).await
        }
        Commands::Stage {
            stage,
            run_id,
            input,
            ..
        } => {
            commands::execute_stage_command(stage, &run_id, input.as_deref(), config, cancel).await
        }
        Commands::Qa { run_id, .. } => commands::execute_qa_command(&run_id, config, cancel).await,
        Commands::Visual { run_id, .. } => {
            commands::execute_visual_command(&run_id, config, cancel).await
        }
        Commands::Validate { file, json } => commands::execute_validate_command(&file, json),
        Commands::Config { json } => commands::execute_config_command(json, config),
    }
}

/// Map flags onto the override layer of configuration discovery.
pub(crate) fn cli_args_for(cli: &Cli) -> Result<CliArgs> {
    let config_path = cli
        .config
        .clone()
        .map(Utf8PathBuf::from_path_buf)
        .transpose()
        .map_err(|p| {
            ConfigError::InvalidValue {
                key: "config".to_string(),
                value: format!("path is not UTF-8: {}", p.display()),
            }
        })
        .context("Invalid --config path")?;

    let mut args = CliArgs {
        config_path,
        llm_provider: cli.provider.clone(),
        model: cli.model.clone(),
        output_dir: cli.output_dir.clone(),
        platform: cli.platform.clone(),
        stage_timeout_secs: cli.stage_timeout,
        ..CliArgs::default()
    };

    match &cli.command {
        Commands::Run {
            pipeline,
            qa_iterations,
            visual,
            wait_secs,
            ..
        } => {
            args.pipeline = pipeline.clone();
            args.qa_max_iterations = *qa_iterations;
            if *visual {
                args.screenshot_enabled = Some(true);
            }
            args.screenshot_timeout_secs = *wait_secs;
        }
        Commands::Stage { pipeline, .. } => args.pipeline = pipeline.clone(),
        Commands::Qa { iterations, .. } => args.qa_max_iterations = *iterations,
        Commands::Visual { wait_secs, .. } => args.screenshot_timeout_secs = *wait_secs,
        Commands::Validate { .. } | Commands::Config { .. } => {}
    }

    Ok(args)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            cancel.cancel();
        }
    });
}
