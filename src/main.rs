use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dropbox_bridge::cli::{self, GlobalArgs};

#[derive(Parser)]
#[command(name = "dropbox-bridge", version, about = "Talk to the Dropbox daemon over its local sockets")]
struct Cli {
    /// Config file (default: ~/.config/dropbox-bridge/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding command_socket and iface_socket
    #[arg(long, global = true)]
    socket_dir: Option<PathBuf>,

    /// Use the development daemon's socket directory (~/.dropboxlocal)
    #[arg(long, global = true)]
    debug: bool,

    /// Log channel activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the daemon's command socket is reachable
    Status {
        /// Seconds to keep trying before giving up
        #[arg(long, default_value = "2")]
        wait_secs: u64,
    },
    /// Send a command and print the response
    Send {
        /// Command name, e.g. get_dropbox_status
        command: String,
        /// Argument as KEY=VALUE; repeat a key to send several values
        #[arg(short = 'a', long = "arg", value_parser = cli::send::parse_key_value)]
        args: Vec<(String, String)>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
    /// Show sync status, context options and folder tag of a path
    FileInfo {
        path: PathBuf,
        /// Treat the path as a directory (also fetches the folder tag)
        #[arg(long)]
        dir: bool,
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
    /// Run a context menu verb on one or more paths
    Action {
        verb: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
    /// Print hook events pushed by the daemon
    Watch {
        /// Only print this event; repeatable
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli::load_config(&GlobalArgs {
        config: cli.config,
        socket_dir: cli.socket_dir,
        debug: cli.debug,
    })?;

    let ok = match cli.command {
        Commands::Status { wait_secs } => {
            cli::status::run_status(&config, Duration::from_secs(wait_secs)).await?
        }
        Commands::Send {
            command,
            args,
            json,
            timeout_secs,
        } => {
            cli::send::run_send(&config, &command, args, json, Duration::from_secs(timeout_secs))
                .await?
        }
        Commands::FileInfo {
            path,
            dir,
            json,
            timeout_secs,
        } => {
            cli::file_info::run_file_info(
                &config,
                &path,
                dir,
                json,
                Duration::from_secs(timeout_secs),
            )
            .await?
        }
        Commands::Action {
            verb,
            paths,
            timeout_secs,
        } => {
            cli::send::run_action(&config, &verb, paths, Duration::from_secs(timeout_secs))
                .await?
        }
        Commands::Watch { events } => {
            cli::watch::run_watch(&config, events).await?;
            true
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
