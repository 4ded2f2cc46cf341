//! drover: command-line client for droverd

use clap::{Parser, Subcommand, ValueEnum};
use cli::{CliError, Client};
use schema::{ClientConfig, RestartPolicy};
use std::io::{self, Write};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "drover", version, about = "Manage processes supervised by droverd")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon host
    #[arg(long, global = true, env = "DROVER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(long, global = true, env = "DROVER_PORT", default_value_t = 50051)]
    port: u16,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch and supervise a new process
    Start {
        name: String,
        command: String,
        /// Arguments passed to the command
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Restart policy; also accepted after the command's arguments
        #[arg(long, value_enum, default_value_t = PolicyArg::Never)]
        auto_restart: PolicyArg,
    },
    /// Stop a process
    Stop {
        name: String,
        /// Kill immediately instead of SIGTERM
        #[arg(long)]
        force: bool,
    },
    /// List supervised processes
    List {
        #[arg(long, short)]
        verbose: bool,
    },
    /// Print captured output of a process
    Log {
        name: String,
        /// Keep streaming until the process ends
        #[arg(long, short)]
        follow: bool,
    },
    /// Remove a process that is no longer running
    Remove { name: String },
    /// Show daemon status
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Never,
    Always,
    OnFailure,
}

impl From<PolicyArg> for RestartPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Never => RestartPolicy::Never,
            PolicyArg::Always => RestartPolicy::Always,
            PolicyArg::OnFailure => RestartPolicy::OnFailure,
        }
    }
}

/// Take a trailing `--auto-restart` back out of the captured arguments.
///
/// Everything after `<command>` is captured verbatim, so a policy flag
/// written at the end of the line lands in `args`; it overrides `policy`.
fn split_trailing_policy(
    mut args: Vec<String>,
    policy: PolicyArg,
) -> cli::Result<(Vec<String>, PolicyArg)> {
    let value = match args.as_slice() {
        [.., last] if last.starts_with("--auto-restart=") => {
            let value = last["--auto-restart=".len()..].to_string();
            args.pop();
            value
        }
        [.., flag, value] if flag == "--auto-restart" => {
            let value = value.clone();
            args.truncate(args.len() - 2);
            value
        }
        _ => return Ok((args, policy)),
    };

    let policy = PolicyArg::from_str(&value, false).map_err(|_| {
        CliError::InvalidArgument(format!(
            "invalid restart policy '{}' (expected never, always or on-failure)",
            value
        ))
    })?;
    Ok((args, policy))
}

async fn run(cli: Cli) -> cli::Result<()> {
    let client = Client::new(ClientConfig {
        daemon_host: cli.host,
        daemon_port: cli.port,
        timeout_seconds: cli.timeout,
    });

    match cli.command {
        Commands::Start {
            name,
            command,
            args,
            auto_restart,
        } => {
            let (args, auto_restart) = split_trailing_policy(args, auto_restart)?;
            let policy = RestartPolicy::from(auto_restart);
            emit(&client.start(&name, &command, args, policy.as_str()).await?)?;
        }
        Commands::Stop { name, force } => emit(&client.stop(&name, force).await?)?,
        Commands::Remove { name } => emit(&client.remove(&name).await?)?,
        Commands::List { verbose } => {
            for row in client.list(verbose).await? {
                emit(&row)?;
            }
        }
        Commands::Log { name, follow } => {
            // stop writing after the first stdout failure, e.g. a closed pipe
            let mut write_error = None;
            client
                .logs(&name, follow, |line| {
                    if write_error.is_none() {
                        write_error = emit(&line).err();
                    }
                })
                .await?;
            if let Some(e) = write_error {
                return Err(e);
            }
        }
        Commands::Status => {
            for line in client.status().await? {
                emit(&line)?;
            }
        }
    }
    Ok(())
}

fn emit(line: &str) -> cli::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = drover_core::utils::init_tracing("warn") {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::from(1)
        }
    }
}

fn report(e: &CliError) {
    eprintln!("Error [{}]: {}", e.code(), e);
}
