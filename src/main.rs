use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn};
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod cli;
mod prefs;

use cli::Args;
use hopwatch::config::EngineOptions;
use hopwatch::export::{LocalFiles, export_buckets_csv, export_csv, generate_report, load_session, save_session};
use hopwatch::lookup::DnsLookup;
use hopwatch::probe::ProcessRunner;
use hopwatch::state::HopSnapshot;
use hopwatch::trace::{Phase, SessionController, SessionEvent};
use prefs::Prefs;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let mut prefs = Prefs::load();
    if args.save_prefs {
        prefs.update_from(&args);
        prefs.save().context("Failed to save preferences")?;
    }

    // Replay mode doesn't probe or resolve anything
    if let Some(ref replay_path) = args.replay {
        return run_replay_mode(&args, replay_path);
    }

    run_live_mode(&args, &prefs).await
}

/// Load a saved session and display/export it
fn run_replay_mode(args: &Args, replay_path: &str) -> Result<()> {
    let loaded = load_session(&LocalFiles, Path::new(replay_path))?;
    if let Some(date) = loaded.exported_at {
        debug!("session exported at {}", date);
    }

    let controller = SessionController::from_snapshot(
        ProcessRunner,
        DnsLookup::new(),
        EngineOptions::default(),
        loaded.config,
        loaded.hops,
    );
    let stdout = std::io::stdout();

    if let Some(hop) = args.hop {
        let interval = args.interval.as_deref().unwrap_or("minute");
        let buckets = controller.query_aggregated(hop, interval)?;
        if args.json {
            serde_json::to_writer_pretty(stdout.lock(), &buckets)?;
            println!();
        } else {
            export_buckets_csv(&buckets, stdout.lock())?;
        }
    } else if args.json {
        serde_json::to_writer_pretty(stdout.lock(), &controller.hops())?;
        println!();
    } else if args.csv {
        controller
            .with_session(|session| export_csv(session, stdout.lock()))
            .transpose()?;
    } else {
        controller
            .with_session(|session| generate_report(session, stdout.lock()))
            .transpose()?;
    }

    Ok(())
}

/// Run a session, streaming events until Ctrl+C or the cycle limit
async fn run_live_mode(args: &Args, prefs: &Prefs) -> Result<()> {
    let config = args.session_config(prefs);
    let options = args.engine_options(prefs);
    let target = config.target.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = SessionController::system(options);
    controller
        .start(config, tx)
        .await
        .with_context(|| format!("Failed to start session for {}", target))?;

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    let mut failed = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else {
                    break;
                };
                print_event(&event, args.json)?;
                match event {
                    SessionEvent::SessionComplete => break,
                    SessionEvent::SessionError(_) => {
                        failed = true;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if controller.is_running() {
        controller.stop()?;
    }

    if let Some(ref output) = args.output {
        match controller.export_records() {
            Some((config, hops)) => {
                save_session(&LocalFiles, Path::new(output), &config, &hops)?;
                eprintln!("Session saved to {}", output);
            }
            None => warn!("nothing to save"),
        }
    }

    if args.report {
        controller
            .with_session(|session| generate_report(session, std::io::stdout()))
            .transpose()?;
    } else if args.csv {
        controller
            .with_session(|session| export_csv(session, std::io::stdout()))
            .transpose()?;
    }

    controller.cleanup();

    if failed {
        anyhow::bail!("Session for {} failed", target);
    }
    Ok(())
}

fn print_event(event: &SessionEvent, json: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();

    if json {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
        return Ok(());
    }

    match event {
        SessionEvent::HopDiscovered(hop) => {
            writeln!(out, "hop {:2}  {}", hop.hop_number, hop.ip)?;
        }
        SessionEvent::HopUpdated(hop) => writeln!(out, "{}", format_hop(hop))?,
        SessionEvent::Progress(p) if p.phase == Phase::Probing => {
            writeln!(out, "--- probing {} hops", p.max_hops)?;
        }
        SessionEvent::Progress(p) => debug!("discovery at hop {}/{}", p.current_hop, p.max_hops),
        SessionEvent::PingResult { .. } => {}
        SessionEvent::SessionComplete => writeln!(out, "--- session complete")?,
        SessionEvent::SessionError(msg) => eprintln!("Error: {}", msg),
    }
    Ok(())
}

fn format_hop(hop: &HopSnapshot) -> String {
    let total = hop.successful_pings + hop.failed_pings;
    let loss = if total == 0 {
        0.0
    } else {
        hop.failed_pings as f64 / total as f64 * 100.0
    };
    let avg = hop
        .average_response_time
        .map_or_else(|| "-".to_string(), |v| format!("{:.1}ms", v));

    format!(
        "hop {:2}  {:15}  {:30}  {:>8}  {:>5.1}% loss",
        hop.hop_number,
        hop.ip.to_string(),
        hop.hostname.as_deref().unwrap_or(""),
        avg,
        loss
    )
}
