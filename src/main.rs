use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use orchestra::config;
use orchestra::core::store;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(version)]
#[command(about = "Backing services for multi-agent coding sessions")]
#[command(long_about = "\
orchestra runs the backing services that let a designer agent spawn and
coordinate executor subagents:

  - An MCP tool service (spawn_subagent, send_message_to_session)
  - A monitor service that batches agent lifecycle hooks and reports back
  - Session persistence, git worktree isolation, and pairing

Session creation, attach, and UI surfaces are out of scope for this crate;
they belong to the external controller that talks to these services.")]
#[command(after_long_help = "\
QUICK START:
    orchestra run
    orchestra sessions list --project ~/code/myproject
    orchestra config show

ENVIRONMENT VARIABLES:
    RUST_LOG                    Log level filter (default: orchestra=info)
    ORCHESTRA_HOME_DIR          Base directory override (default: ~/.orchestra)
    ORCHESTRA_MCP_PORT          MCP tool service port (default: 8765)
    ORCHESTRA_MONITOR_PORT      Monitor HTTP service port (default: 8081)
    ORCHESTRA_SESSION_ID        Override session id seen by the hook forwarder
    ANTHROPIC_API_KEY           Forwarded into containerized agent backends

FILE LOCATIONS:
    ~/.orchestra/                   Base directory for all state
    ~/.orchestra/sessions.json      Session tree store
    ~/.orchestra/messages.jsonl     Designer message queue
    ~/.orchestra/worktrees/         Executor git worktrees
    ~/.orchestra/repos/             Stable relocated .git directories
    ~/.orchestra/config/agents.yaml Custom agent descriptors (optional)
    ~/.orchestra/config/tmux.conf   Multiplexer config, written on first run
    ~/.orchestra/config/docker/     Vendored Dockerfile, written on first run
    ~/.orchestra/logs/              Log files

Use 'orchestra <command> --help' for command-specific information.
Use 'orchestra config show' to inspect current configuration and paths.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP and monitor services and block until shutdown
    ///
    /// Boots the MCP tool service, then the monitor service, then waits for
    /// SIGINT/SIGTERM. On shutdown, reverses any outstanding pairing
    /// artifacts before tearing down the services and the multiplexer
    /// server.
    #[command(after_help = "\
EXAMPLES:
    orchestra run
    RUST_LOG=orchestra=debug orchestra run")]
    Run,

    /// Inspect the session store
    #[command(subcommand)]
    Sessions(SessionsCommands),

    /// Show configuration, paths, and environment info
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum SessionsCommands {
    /// Print the session tree for a project
    #[command(after_help = "\
EXAMPLES:
    orchestra sessions list --project ~/code/myproject")]
    List {
        /// Absolute path to the project whose sessions to list
        #[arg(long)]
        project: std::path::PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show all configuration and file paths
    Show,
    /// Show resolved file paths only
    Paths,
    /// Show environment variables and their current values/defaults
    Env,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run => {
            init_daemon_logging()?;
            orchestra::supervisor::run().await
        }
        Commands::Sessions(cmd) => {
            init_console_logging();
            handle_sessions_command(cmd).await
        }
        Commands::Config(cmd) => {
            init_console_logging();
            handle_config_command(cmd);
            Ok(())
        }
    }
}

/// Bare console logging for short-lived CLI invocations.
fn init_console_logging() {
    let env_filter =
        tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "orchestra=warn".into()));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(env_filter))
        .try_init();
}

/// Full logging for the long-running supervisor: console plus a rolling
/// file under `{orchestra_home}/logs/orchestra.log`.
fn init_daemon_logging() -> anyhow::Result<()> {
    let logs_dir = config::logs_dir();
    std::fs::create_dir_all(&logs_dir)?;

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "orchestra=info".into());
    let console_filter = tracing_subscriber::EnvFilter::new(rust_log.clone());
    let file_filter = tracing_subscriber::EnvFilter::new(rust_log);

    let file_appender = tracing_appender::rolling::never(&logs_dir, "orchestra.log");

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(cfg!(debug_assertions))
        .with_line_number(cfg!(debug_assertions));

    tracing_subscriber::registry()
        .with(console_layer.with_filter(console_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "orchestra starting");
    Ok(())
}

async fn handle_sessions_command(cmd: &SessionsCommands) -> anyhow::Result<()> {
    match cmd {
        SessionsCommands::List { project } => {
            let project_key = project.to_string_lossy().into_owned();
            let roots = store::load_sessions(&config::sessions_path(), &project_key).await;
            if roots.is_empty() {
                println!("No sessions recorded for {project_key}");
                return Ok(());
            }
            for root in &roots {
                print_session_tree(root, 0);
            }
            Ok(())
        }
    }
}

fn print_session_tree(session: &orchestra::core::Session, depth: usize) {
    let indent = "  ".repeat(depth);
    let pairing = if session.paired { " [paired]" } else { "" };
    let backend = if session.use_docker { "docker" } else { "local" };
    println!(
        "{indent}- {} ({}, {:?}, {backend}){pairing}",
        session.session_name, session.agent_type, session.state
    );
    for child in &session.children {
        print_session_tree(child, depth + 1);
    }
}

fn handle_config_command(cmd: &ConfigCommands) {
    match cmd {
        ConfigCommands::Show => {
            println!("orchestra configuration\n");

            println!("VERSION:");
            println!("    {}", env!("CARGO_PKG_VERSION"));
            println!();

            print_paths();
            println!();
            print_env_vars();
        }
        ConfigCommands::Paths => {
            println!("orchestra file paths\n");
            print_paths();
        }
        ConfigCommands::Env => {
            println!("orchestra environment variables\n");
            print_env_vars();
        }
    }
}

fn print_paths() {
    println!("CORE:");
    print_path("Home directory", &config::home_dir());
    print_path("Session store", &config::sessions_path());
    print_path("Message queue", &config::messages_path());
    println!();

    println!("CONFIGURATION:");
    print_path("Config directory", &config::config_dir());
    print_path("Multiplexer config", &config::tmux_conf_path());
    print_path("Vendored Dockerfile dir", &config::dockerfile_dir());
    print_path("Agent descriptors", &config::agents_yaml_path());
    println!();

    println!("DATA:");
    print_path("Worktrees", &config::worktrees_dir());
    print_path("Custom-agent workspaces", &config::subagents_dir());
    print_path("Relocated git directories", &config::repos_dir());
    print_path("Shared agent config", &config::shared_agent_config_dir());
    print_path("Logs", &config::logs_dir());
}

fn print_env_vars() {
    println!("ENVIRONMENT:");
    print_env("RUST_LOG", Some("orchestra=info"));
    print_env("ORCHESTRA_HOME_DIR", Some("~/.orchestra"));
    print_env("ORCHESTRA_MCP_PORT", Some(&config::DEFAULT_MCP_PORT.to_string()));
    print_env("ORCHESTRA_MONITOR_PORT", Some(&config::DEFAULT_MONITOR_PORT.to_string()));
    print_env("ORCHESTRA_SESSION_ID", None);
    print_env("ANTHROPIC_API_KEY", None);
}

fn print_path(name: &str, path: &std::path::Path) {
    let exists = path.exists();
    let marker = if exists { "+" } else { "-" };
    println!("    [{marker}] {name:<28} {}", path.display());
}

fn print_env(name: &str, default: Option<&str>) {
    match std::env::var(name) {
        Ok(val) => println!("    {name:<28} {val} (set)"),
        Err(_) => match default {
            Some(def) => println!("    {name:<28} (not set, default: {def})"),
            None => println!("    {name:<28} (not set)"),
        },
    }
}
