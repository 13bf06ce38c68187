//! cmdrelay - background shell command runner
//!
//! Entry point for the `cmdrelay` binary. Commands given to `run` are
//! dispatched concurrently; results are printed in delivery order.

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info};

use cmdrelay::config::{self, RelayConfig};
use cmdrelay::error::{Error, Result};
use cmdrelay::logging;
use cmdrelay::version;
use cmdrelay::{
    CallbackSink, ChannelSink, Dispatcher, ExecutionResult, Scheduler, SchedulerKind,
    ThreadScheduler, TokioScheduler,
};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch_command(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            print!("{}", version::build_info());
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Run {
            config,
            json,
            correlation_start,
            scheduler,
            shell,
            commands,
        } => {
            let mut config = RelayConfig::load(config.as_deref())?;
            if let Some(scheduler) = scheduler {
                config.executor.scheduler = scheduler;
            }
            if let Some(shell) = shell {
                config.shell.program = Some(shell);
            }
            config.validate()?;

            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
            info!(version = %version::build_info().full_version(), "Starting cmdrelay");

            let outcome = run_commands(&config, commands, correlation_start, json);
            if let Err(ref e) = outcome {
                debug!(error = %e.format_for_log(), "Run finished with error");
            }
            outcome
        }
    }
}

/// Dispatch every command and print results until all have been delivered
fn run_commands(
    config: &RelayConfig,
    commands: Vec<String>,
    correlation_start: i32,
    json: bool,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .max_blocking_threads(config.worker_threads())
        .thread_name("cmdrelay")
        .build()
        .map_err(Error::Runtime)?;

    runtime.block_on(async {
        let dispatcher_config = config.dispatcher_config();
        let scheduler: Arc<dyn Scheduler> = match dispatcher_config.scheduler {
            SchedulerKind::Thread => Arc::new(ThreadScheduler::default()),
            SchedulerKind::Tokio => Arc::new(TokioScheduler::current()),
        };
        let dispatcher = Dispatcher::new(&dispatcher_config, scheduler);

        let runner = dispatcher.runner();
        info!(
            commands = commands.len(),
            scheduler = %dispatcher_config.scheduler,
            shell = %runner.shell().program,
            chunk_size = runner.chunk_size(),
            "Dispatching commands"
        );

        let total = commands.len();
        let (sink, mut results) = ChannelSink::new(config.executor.queue_size);
        {
            let sink: Arc<dyn CallbackSink> = Arc::new(sink);
            for (offset, command) in commands.into_iter().enumerate() {
                let correlation = correlation_start.wrapping_add(offset as i32);
                dispatcher.dispatch(command, correlation, sink.clone());
            }
        }

        // The channel closes once every task has dropped its sink
        let mut failed = 0;
        let stdout = std::io::stdout();
        while let Some(result) = results.recv().await {
            if !result.succeeded() {
                failed += 1;
            }
            let mut out = stdout.lock();
            print_result(&mut out, &result, json)?;
            out.flush()?;
        }

        let stats = dispatcher.stats();
        debug!(
            dispatched = stats.dispatched,
            spawn_failures = stats.spawn_failures,
            nonzero_exits = stats.nonzero_exits,
            "All results delivered"
        );

        if failed > 0 {
            return Err(Error::CommandsFailed { failed, total });
        }
        Ok::<(), Error>(())
    })
}

/// Write one result in text or JSON-lines form
fn print_result<W: Write>(out: &mut W, result: &ExecutionResult, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, result)?;
        writeln!(out)?;
        return Ok(());
    }

    if result.spawn_failed {
        writeln!(out, "[{}] spawn failed", result.correlation_value)?;
        return Ok(());
    }

    match result.signal {
        Some(signal) => writeln!(
            out,
            "[{}] exit {} (signal {})",
            result.correlation_value, result.exit_status, signal
        )?,
        None => writeln!(out, "[{}] exit {}", result.correlation_value, result.exit_status)?,
    }
    out.write_all(result.output_text.as_bytes())?;
    if !result.output_text.is_empty() && !result.output_text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = RelayConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let path = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", path.display());
        }
        ConfigSubcommand::Validate { config } => {
            RelayConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
