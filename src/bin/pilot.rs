//! Pilot - follow browser automation sessions and control their recordings
//!
//! # Usage
//!
//! ```bash
//! # Follow a session; view snapshots are printed as JSON lines and
//! # recording commands are read from stdin
//! pilot watch S1 --task T1
//!
//! # Follow agent reports
//! pilot agents agent-1 agent-2
//!
//! # List recordings
//! pilot recordings --session S1
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pilot_client::{
    mount, spawn_router, AgentMonitor, ClientConfig, ConnectionManager, RecordingApi,
    RoutedEvent, StreamController, StreamTarget, StreamView,
};
use pilot_core::{AgentId, PlaybackAction, RecordingId, RecordingOptions, SessionId, Topic};

const COMMAND_HELP: &str = "commands: record | stop <recording> | delete <recording> | \
                            playback <recording> | play | pause | halt | seek <seconds> | \
                            seek% <percent> | refresh | quit";

/// Pilot - live stream and recording control client
#[derive(Parser, Debug)]
#[command(name = "pilot", version, about)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow a session's stream and control its recordings from stdin
    Watch {
        session: String,
        /// Also follow a task running in the session
        #[arg(long)]
        task: Option<String>,
    },
    /// Follow status, metrics and health reports of agents
    Agents {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// List recordings, optionally for one session
    Recordings {
        #[arg(long)]
        session: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pilot=info".parse()?)
                .add_directive("pilot_client=info".parse()?),
        )
        .init();

    let config =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    run(config, args.command)
}

#[tokio::main]
async fn run(config: ClientConfig, command: Command) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        api = %config.api_base,
        ws = %config.ws_base,
        "Pilot starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        shutdown_token.cancel();
    });

    match command {
        Command::Watch { session, task } => {
            let mut target = StreamTarget::session(session);
            if let Some(task) = task {
                target = target.with_task(task);
            }
            watch(&config, target, cancel_token).await
        }
        Command::Agents { ids } => agents(&config, ids, cancel_token).await,
        Command::Recordings { session } => recordings(&config, session.map(SessionId::new)).await,
    }
}

// ============================================================================
// watch
// ============================================================================

async fn watch(config: &ClientConfig, target: StreamTarget, cancel: CancellationToken) -> Result<()> {
    let spec = config.stream_channel(&target.session_id)?;
    let router = spawn_router(ConnectionManager::websocket(config.timing));
    let api: Arc<dyn RecordingApi> = Arc::new(config.recording_api());

    info!(view = %target, "Mounting view");
    let controller = mount(target, spec, router, api).await?;

    eprintln!("{COMMAND_HELP}");
    let mut view = controller.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_view(&view.borrow_and_update().clone())?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = view.borrow_and_update().clone();
                print_view(&snapshot)?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if matches!(line, "quit" | "exit") {
                    break;
                }
                if let Err(e) = run_command(&controller, line, &mut lines).await {
                    eprintln!("error: {e:#}");
                }
            }
        }
    }

    controller.unmount().await;
    info!("View unmounted");
    Ok(())
}

fn print_view(view: &StreamView) -> Result<()> {
    println!("{}", serde_json::to_string(view)?);
    Ok(())
}

async fn run_command<R>(
    controller: &StreamController,
    line: &str,
    lines: &mut Lines<R>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(());
    };

    match (verb, words.next()) {
        ("record", None) => {
            let recording = controller
                .start_recording(RecordingOptions::default())
                .await?;
            info!(recording = %recording.id, "Recording started");
        }
        ("stop", Some(id)) => {
            let recording = controller.stop_recording(&RecordingId::new(id)).await?;
            info!(recording = %recording.id, status = recording.status.label(), "Recording stopped");
        }
        ("delete", Some(id)) => {
            let token = controller.request_delete(&RecordingId::new(id)).await?;
            eprint!("Delete recording {id}? [y/N] ");
            let answer = lines.next_line().await?.unwrap_or_default();
            if answer.trim().eq_ignore_ascii_case("y") {
                controller.confirm_delete(token).await?;
                info!(recording = id, "Recording deleted");
            }
        }
        ("playback", Some(id)) => {
            let playback = controller.start_playback(&RecordingId::new(id)).await?;
            info!(playback = %playback.id, "Playback started");
        }
        ("play", None) => control(controller, PlaybackAction::Play, None).await?,
        ("pause", None) => control(controller, PlaybackAction::Pause, None).await?,
        ("halt", None) => control(controller, PlaybackAction::Stop, None).await?,
        ("seek", Some(position)) => {
            let position: f64 = position.parse().context("seek position must be a number")?;
            control(controller, PlaybackAction::Seek, Some(position)).await?;
        }
        ("seek%", Some(percent)) => {
            let percent: f64 = percent.parse().context("seek percent must be a number")?;
            if controller.seek_to_fraction(percent / 100.0).await?.is_none() {
                warn!("Playback duration unknown; seek skipped");
            }
        }
        ("refresh", None) => {
            let recordings = controller.refresh_recordings().await?;
            info!(count = recordings.len(), "Recordings refreshed");
        }
        _ => bail!("unknown command `{line}` ({COMMAND_HELP})"),
    }
    Ok(())
}

async fn control(
    controller: &StreamController,
    action: PlaybackAction,
    value: Option<f64>,
) -> Result<()> {
    match controller.control_playback(action, value).await? {
        Some(playback) => info!(
            playback = %playback.id,
            action = %action,
            current_time = playback.current_time,
            "Playback updated"
        ),
        None => warn!(action = %action, "Nothing to send"),
    }
    Ok(())
}

// ============================================================================
// agents
// ============================================================================

async fn agents(config: &ClientConfig, ids: Vec<String>, cancel: CancellationToken) -> Result<()> {
    let spec = config.agents_channel()?;
    let router = spawn_router(ConnectionManager::websocket(config.timing));

    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in ids {
        let mut subscription = router
            .subscribe(spec.clone(), Topic::agent(&AgentId::new(id)))
            .await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.events.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut monitor = AgentMonitor::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(RoutedEvent::Message(message)) => {
                    if let Some(snapshot) = monitor.apply(&message) {
                        println!("{}", serde_json::to_string(&snapshot.combined())?);
                    }
                }
                // Every agent subscription reports the same channel state.
                Some(RoutedEvent::Connection(state)) => info!(
                    state = state.phase.label(),
                    attempt = state.reconnect_attempt,
                    error = ?state.last_error,
                    "Agents channel"
                ),
                None => break,
            },
        }
    }
    Ok(())
}

// ============================================================================
// recordings
// ============================================================================

async fn recordings(config: &ClientConfig, session: Option<SessionId>) -> Result<()> {
    let api = config.recording_api();
    let recordings = api
        .list_recordings(session.as_ref())
        .await
        .context("Failed to list recordings")?;

    for recording in recordings {
        println!(
            "{}\t{}\t{}\t{}",
            recording.id,
            recording.session_id,
            recording.status.label(),
            recording.size_label()
        );
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
