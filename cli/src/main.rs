//! Tugwar - two-player tug of war in the terminal
//!
//! Each player runs `tugwar`. One of them joins the other by address or by a
//! shared link; whoever joins plays as Player One.
//!
//! # Usage
//!
//! ```bash
//! # Wait for an opponent on the default port
//! tugwar
//!
//! # Join a waiting player
//! tugwar 192.168.1.50:7780
//! tugwar tugwar://join/192.168.1.50:7780
//!
//! # Shorter, easier matches
//! tugwar --threshold 20 --duration 10
//! ```
//!
//! Configuration is read from the platform config dir (`config.toml`), and
//! the flags above override it.

mod input;
mod link;
mod terminal;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use tugwar_core::config::{self, GameConfig};
use tugwar_core::net::TcpTransport;
use tugwar_core::{GameRunner, Transport};

use input::Command;
use terminal::TerminalPresentation;

/// Longest the loop sleeps before polling the socket again.
const POLL_INTERVAL: Duration = Duration::from_millis(15);

type Runner = GameRunner<TcpTransport, TerminalPresentation<io::Stdout>>;

/// Tugwar - two-player tug of war over a direct connection
#[derive(Parser)]
#[command(name = "tugwar")]
#[command(about = "Two-player tug of war over a direct connection")]
#[command(version)]
struct Cli {
    /// Peer to join: an address, a tugwar://join/<id> link, or a URL with ?join=<id>
    target: Option<String>,

    /// Address to listen on for an opponent
    #[arg(long)]
    listen: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Click difference that wins by push
    #[arg(long)]
    threshold: Option<u32>,

    /// Match length in seconds
    #[arg(long)]
    duration: Option<u32>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,

    /// Write the effective configuration back to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they stay out of the game output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log)),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    if cli.save_config {
        return save_config(&cli, &config);
    }

    let transport = TcpTransport::bind(&config.network)
        .with_context(|| format!("Failed to listen on {}", config.network.listen_addr))?;
    let mut runner = GameRunner::from_config(&config, transport, TerminalPresentation::new(io::stdout()));

    let mut pending_join = cli.target.as_deref().and_then(link::parse_target);
    run(&mut runner, spawn_stdin_reader(), &mut pending_join);

    if runner.session().phase().is_connected() {
        let _ = runner.leave(Instant::now());
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<GameConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::load(),
    };

    if let Some(listen) = &cli.listen {
        config.network.listen_addr = listen.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.game.push_threshold = threshold;
    }
    if let Some(duration) = cli.duration {
        config.game.match_duration_secs = duration;
    }

    config.validate().context("Invalid configuration")?;
    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

fn save_config(cli: &Cli, config: &GameConfig) -> Result<()> {
    match &cli.config {
        Some(path) => config::save_to(config, path)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => config::save(config).context("Failed to write config")?,
    }
    println!("Configuration saved.");
    Ok(())
}

/// Read stdin on its own thread so the game loop never blocks on input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn run(runner: &mut Runner, input: Receiver<String>, pending_join: &mut Option<String>) {
    let mut announced = false;

    loop {
        let now = Instant::now();
        runner.pump(now);

        if !announced && let Some(local_id) = runner.transport().local_id().map(str::to_string) {
            announced = true;
            let presentation = runner.presentation_mut();
            presentation.message(format_args!("Your id: {local_id}"));
            presentation.message(format_args!("Join link: {}", link::join_link(&local_id)));
            presentation.message(input::HELP);
        }

        if announced && let Some(remote_id) = pending_join.take() {
            let _ = runner.connect(&remote_id, now);
        }

        let timeout = runner
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .map_or(POLL_INTERVAL, |wait| wait.min(POLL_INTERVAL));

        match input.recv_timeout(timeout) {
            Ok(line) => {
                if !handle_line(runner, &line) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Input closed, exiting");
                return;
            }
        }
    }
}

/// Returns `false` when the user asked to quit.
fn handle_line(runner: &mut Runner, line: &str) -> bool {
    let now = Instant::now();
    let command = match input::parse(line) {
        Ok(command) => command,
        Err(e) => {
            runner.presentation_mut().message(e);
            return true;
        }
    };

    let result = match command {
        Command::Click(pulls) => (0..pulls).try_for_each(|_| runner.click(now)),
        Command::Ready => runner.ready(now),
        Command::PlayAgain => runner.play_again(now),
        Command::Join(remote_id) => runner.connect(&remote_id, now),
        Command::Leave => runner.leave(now),
        Command::Status => {
            print_status(runner);
            Ok(())
        }
        Command::Help => {
            runner.presentation_mut().message(input::HELP);
            Ok(())
        }
        Command::Quit => return false,
    };

    // Refused connects already came through as a connection status.
    if let Err(e) = result
        && !e.is_connect_rejection()
    {
        tracing::debug!(error = %e, "Command rejected");
        runner.presentation_mut().message(e);
    }
    true
}

fn print_status(runner: &mut Runner) {
    let session = runner.session();
    let settings = session.settings();
    let mut lines = vec![
        format!(
            "Phase: {:?}, id: {}",
            session.phase(),
            session.local_id().unwrap_or("(pending)")
        ),
        format!(
            "Rules: lead by {} within {}s",
            settings.push_threshold, settings.match_duration_secs
        ),
    ];
    if let Some(remote_id) = session.remote_id() {
        lines.push(format!("Opponent: {remote_id} ({:?})", session.role()));
        lines.push(format!(
            "Score: you {} : {} them",
            session.my_score(),
            session.opponent_score()
        ));
    }
    if let Some(result) = session.last_result() {
        lines.push(format!("Last result: {:?} ({:?})", result.outcome, result.resolved_by));
    }

    let presentation = runner.presentation_mut();
    for line in lines {
        presentation.message(line);
    }
}
