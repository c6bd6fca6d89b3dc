mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Craftfleet -- run and steer a fleet of game-server agents.
#[derive(Parser, Debug)]
#[command(name = "craftfleet", version, about)]
struct Cli {
    /// Control socket of the daemon (defaults to ~/.craftfleet/craftfleet.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Daemon management subcommands
    Daemon {
        #[command(subcommand)]
        action: DaemonCommands,
    },

    /// List all agents
    Agents,

    /// Show one agent in detail
    Agent {
        /// Agent id
        id: u32,
    },

    /// Create an agent and connect it to the target server
    Create {
        /// Agent id
        id: u32,

        /// In-game name (defaults to the configured prefix plus the id)
        #[arg(long)]
        name: Option<String>,
    },

    /// Create several agents with fresh ids
    Spawn {
        /// Number of agents to create
        count: usize,
    },

    /// Disconnect and remove an agent
    Remove {
        /// Agent id
        id: u32,
    },

    /// Run a command on one agent (chat, move, follow, stop, jump, look, inventory, attack)
    Exec {
        /// Agent id
        id: u32,

        /// Command kind
        command: String,

        /// Command parameters as a JSON object, e.g. '{"x":10,"y":64,"z":-3}'
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Run a command on every agent
    Broadcast {
        /// Command kind
        command: String,

        /// Command parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Remove every agent
    StopAll,

    /// Show fleet counters
    Stats,

    /// Show recent fleet history, newest first
    History {
        /// Number of entries to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Target server configuration
    Server {
        #[command(subcommand)]
        action: ServerCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DaemonCommands {
    /// Create a default config at ~/.craftfleet/craftfleet.toml
    Init,

    /// Run the daemon in the foreground
    Run {
        /// Path to the daemon config (defaults to ~/.craftfleet/craftfleet.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Stop a running daemon
    Stop,

    /// Show daemon status
    Status,
}

#[derive(Subcommand, Debug)]
enum ServerCommands {
    /// Show the active target server
    Show,

    /// Change the target server and migrate connected agents
    Set {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Protocol version string, e.g. 1.20.4
        #[arg(long)]
        version: Option<String>,

        #[arg(long)]
        name_prefix: Option<String>,

        #[arg(long)]
        max_agents: Option<usize>,

        #[arg(long)]
        auto_reconnect: Option<bool>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let client = commands::client(cli.socket);

    match cli.command {
        Commands::Daemon { action } => match action {
            DaemonCommands::Init => commands::daemon::init(),
            DaemonCommands::Run { config } => commands::daemon::run(config),
            DaemonCommands::Stop => commands::daemon::stop(&client),
            DaemonCommands::Status => commands::daemon::status(&client),
        },
        Commands::Agents => commands::fleet::agents(&client),
        Commands::Agent { id } => commands::fleet::agent(&client, id),
        Commands::Create { id, name } => commands::fleet::create(&client, id, name),
        Commands::Spawn { count } => commands::fleet::spawn(&client, count),
        Commands::Remove { id } => commands::fleet::remove(&client, id),
        Commands::Exec {
            id,
            command,
            params,
        } => commands::fleet::exec(&client, id, &command, &params),
        Commands::Broadcast { command, params } => {
            commands::fleet::broadcast(&client, &command, &params)
        }
        Commands::StopAll => commands::fleet::stop_all(&client),
        Commands::Stats => commands::fleet::stats(&client),
        Commands::History { limit } => commands::fleet::history(&client, limit),
        Commands::Server { action } => match action {
            ServerCommands::Show => commands::server::show(&client),
            ServerCommands::Set {
                host,
                port,
                version,
                name_prefix,
                max_agents,
                auto_reconnect,
            } => commands::server::set(
                &client,
                commands::server::ServerChanges {
                    host,
                    port,
                    protocol_version: version,
                    agent_name_prefix: name_prefix,
                    max_agents,
                    auto_reconnect,
                },
            ),
        },
    }
}
