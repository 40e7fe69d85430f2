//! `vcx` - command-line control panel for a VCX agent.
//!
//! Run with:
//! ```bash
//! export VCX_AGENT_URL="http://localhost:9847"
//! vcx health
//! vcx progress
//! RUST_LOG=vcx_client=debug vcx init --follow
//! ```

use std::io::Write;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vcx_client::model::ProgressUpdate;
use vcx_client::options::{TransportOptions, DEFAULT_BASE_URL};
use vcx_client::session::{SessionEvent, SessionHandle};
use vcx_client::{project, AgentClient};

#[derive(Parser, Debug)]
#[command(name = "vcx", version, about = "Control panel for a VCX agent")]
struct Cli {
    /// Agent base URL
    #[arg(long, env = "VCX_AGENT_URL", default_value = DEFAULT_BASE_URL)]
    url: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,

    /// Request and stream timeout in seconds (0 waits forever)
    #[arg(long, env = "VCX_TIMEOUT", default_value_t = 0)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the agent's health
    Health,
    /// Ping the agent
    Ping,
    /// Initialize the project
    Init {
        /// Print each processed file as it is reported instead of waiting for the result
        #[arg(long)]
        follow: bool,
    },
    /// Initialize the project with step-by-step progress
    Progress,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    debug!("Parsed arguments: {:?}", cli);

    let timeout = (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout));
    let mut options = TransportOptions::new()
        .with_base_url(cli.url)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    if let Some(timeout) = timeout {
        options = options.with_timeout(timeout);
    }

    let client = AgentClient::new(options)?;

    match cli.command {
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Ping => {
            let ping = client.ping().await?;
            println!("{}", serde_json::to_string_pretty(&ping)?);
        }
        Command::Init { follow: false } => {
            print!("{}", client.project_init().await?);
        }
        Command::Init { follow: true } => {
            let controller = client.controller();
            follow(project::init_stream_simple(&controller, timeout)?).await?;
        }
        Command::Progress => {
            let controller = client.controller();
            follow(project::init_stream(&controller, timeout)?).await?;
        }
    }

    Ok(())
}

/// Render a session until it ends. Ctrl-C cancels it.
async fn follow(mut session: SessionHandle) -> Result<(), Box<dyn std::error::Error>> {
    let canceller = session.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let mut in_progress_line = false;

    let result = loop {
        let Some(event) = session.next().await else {
            break Ok(());
        };

        if in_progress_line && event.is_terminal() {
            writeln!(stdout)?;
        }

        match event {
            SessionEvent::Progress(ProgressUpdate::Progress(event)) => {
                // redraw the same line
                write!(
                    stdout,
                    "\r\x1b[K[{}/{}] {} ({}%)",
                    event.clamped_step(),
                    event.total,
                    event.message,
                    event.percent()
                )?;
                stdout.flush()?;
                in_progress_line = true;
            }
            SessionEvent::Progress(ProgressUpdate::Text(text)) => {
                if in_progress_line {
                    writeln!(stdout)?;
                    in_progress_line = false;
                }
                writeln!(stdout, "{}", text)?;
            }
            SessionEvent::Completed => {
                writeln!(stdout, "Project initialization completed")?;
                break Ok(());
            }
            SessionEvent::Cancelled => {
                eprintln!("Cancelled");
                break Ok(());
            }
            SessionEvent::Failed(e) => break Err(e.into()),
        }
    };

    interrupt.abort();
    result
}
