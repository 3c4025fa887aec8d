//! onedata-ws CLI - talk to a Onezone graph-sync endpoint from a terminal.
//!
//! See the `onedata_ws` library for the client itself.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use onedata_ws::{AuthHint, Config, ConnectionEvent, GraphRequest, Gri, Operation, WebsocketClient};
use tokio::sync::broadcast::error::RecvError;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "onedata-ws")]
#[command(version)]
#[command(about = "Websocket client for the Onezone graph-sync API")]
struct Cli {
    /// Onezone origin, e.g. https://onezone.example.com
    #[arg(long, global = true)]
    server: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Access token sent with the connection request
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, handshake, and print the handshake data
    Handshake,
    /// Call a server function
    Rpc {
        /// Function name
        function: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Run a graph request
    Graph {
        /// Resource identifier, e.g. od_user.null.instance:private
        gri: String,
        /// create, get, update or delete
        #[arg(long, default_value = "get")]
        operation: Operation,
        /// Operation data as JSON
        #[arg(long)]
        data: Option<String>,
        /// Ask for pushes about later changes (keeps watching)
        #[arg(long)]
        subscribe: bool,
        /// Visibility hint, e.g. throughSpace:<space id>
        #[arg(long)]
        auth_hint: Option<AuthHint>,
    },
    /// Print server pushes until interrupted
    Watch,
    /// Print the effective configuration (token excluded)
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(server) = &cli.server {
        config.server_url.clone_from(server);
    }
    if let Some(timeout) = cli.timeout {
        config.request_timeout = timeout;
    }
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    Ok(config)
}

fn parse_json(text: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text).with_context(|| format!("--{what} is not valid JSON"))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print pushes and lifecycle events until Ctrl-C or the connection closes.
async fn watch(client: &WebsocketClient) -> Result<()> {
    let mut pushes = client.subscribe_pushes();
    let mut events = client.subscribe_events();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                return Ok(());
            }
            push = pushes.recv() => match push {
                Ok(message) => print_json(&message)?,
                Err(RecvError::Lagged(n)) => log::warn!("Push subscription lagged by {n}"),
                Err(RecvError::Closed) => return Ok(()),
            },
            event = events.recv() => match event {
                Ok(ConnectionEvent::Closed { code, reason }) => {
                    anyhow::bail!("connection closed ({code:?}): {reason}");
                }
                Ok(ConnectionEvent::Error(e)) => log::error!("Connection error: {e}"),
                Ok(ConnectionEvent::Open) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Commands::Config { save } = cli.command {
        print_json(&serde_json::to_value(&config)?)?;
        if save {
            let path = config.save()?;
            eprintln!("Saved config to {}", path.display());
        }
        return Ok(());
    }

    let mut client = WebsocketClient::new(config.client_options());

    let handshake = client.open().await?;

    let outcome = match cli.command {
        Commands::Handshake => print_json(&handshake),
        Commands::Rpc { function, args } => {
            let args = parse_json(&args, "args")?;
            let data = client.rpc(&function, args).await?;
            print_json(&data)
        }
        Commands::Graph {
            gri,
            operation,
            data,
            subscribe,
            auth_hint,
        } => {
            let gri: Gri = gri.parse()?;
            let mut request = GraphRequest::new(gri, operation).subscribe(subscribe);
            if let Some(data) = data {
                request = request.with_data(parse_json(&data, "data")?);
            }
            if let Some(hint) = auth_hint {
                request = request.with_auth_hint(hint);
            }
            let result = client.graph(&request).await?;
            print_json(&result)?;
            if subscribe {
                watch(&client).await
            } else {
                Ok(())
            }
        }
        Commands::Watch => watch(&client).await,
        Commands::Config { .. } => Ok(()),
    };

    client.close().await;
    outcome
}
