use octoloop::audio_io;
use octoloop::controller::{ControllerConfig, LoopController};
use octoloop::error::NotificationLevel;
use octoloop::looper::NUM_TRACKS;
use octoloop::metronome::{TickTimer, LOOKAHEAD_INTERVAL};
use octoloop::settings::load_settings;
use octoloop::shell::{self, ShellCommand, HELP};
use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let (backend, capture) = audio_io::open(&settings, NUM_TRACKS)?;
    let mut controller = LoopController::new(backend, capture, ControllerConfig::from(&settings));

    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    println!("{}", HELP);
    let mut ticker = TickTimer::new(LOOKAHEAD_INTERVAL, Instant::now());
    loop {
        match line_rx.recv_timeout(ticker.wait(Instant::now(), POLL_INTERVAL)) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match line.parse::<ShellCommand>() {
                Ok(ShellCommand::Quit) => break,
                Ok(ShellCommand::Status) => {
                    println!("{}", shell::status(&controller));
                    let backend = controller.backend();
                    println!(
                        "cpu {:.1}% xruns {}",
                        backend.cpu_load() * 100.0,
                        backend.xruns()
                    );
                }
                Ok(command) => {
                    // Failures surface below as notifications.
                    if let Ok(reply) = shell::execute(&mut controller, command) {
                        if !reply.is_empty() {
                            println!("{}", reply);
                        }
                    }
                }
                Err(e) => println!("{}", e),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        controller.poll();
        if ticker.poll(Instant::now()) {
            controller.metronome_tick();
        }
        for note in controller.take_notifications() {
            match note.level {
                NotificationLevel::Info => println!("{}", note.message),
                NotificationLevel::Warning => println!("warning: {}", note.message),
                NotificationLevel::Error => println!("error: {}", note.message),
            }
        }
    }

    controller.stop_all();
    info!("Shutting down");
    Ok(())
}
