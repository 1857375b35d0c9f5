// ═══════════════════════════════════════════════════════════════════════
// Runner — CLI entry point for headless matches, soak runs and snapshots
// ═══════════════════════════════════════════════════════════════════════

mod driver;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use conquest_engine::map::MapDef;
use conquest_engine::setup::{create_game, PlayerSetup, MAX_PLAYERS};
use conquest_engine::snapshot;
use conquest_engine::types::*;
use driver::{run_match, MatchSummary, RandomDriver};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conquest-runner", about = "Headless driver for the conquest rules engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct MatchArgs {
    #[arg(short, long, default_value_t = 4)]
    players: usize,
    /// Settings document (JSON); missing fields take their defaults
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Map document (JSON); the built-in demo map otherwise
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long, default_value_t = 50_000)]
    max_steps: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one match with the random driver
    Play {
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        args: MatchArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Play many seeded matches in parallel and report failures
    Soak {
        #[arg(short, long, default_value_t = 200)]
        games: u64,
        #[arg(short, long, default_value_t = 1)]
        seed: u64,
        #[command(flatten)]
        args: MatchArgs,
    },
    /// Play a fixed number of steps and dump the state as a snapshot
    Snapshot {
        #[arg(short, long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 200)]
        steps: usize,
        #[command(flatten)]
        args: MatchArgs,
        /// Write here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check that a snapshot document restores cleanly
    Restore { path: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("conquest_runner=info,conquest_engine=warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play { seed, args, json } => cmd_play(seed, &args, json),
        Commands::Soak { games, seed, args } => cmd_soak(games, seed, &args),
        Commands::Snapshot { seed, steps, args, out } => {
            cmd_snapshot(seed, steps, &args, out.as_deref())
        }
        Commands::Restore { path } => cmd_restore(&path),
    }
}

// ── Setup ──────────────────────────────────────────────────────────────

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else { return Ok(Settings::default()) };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing settings in {}", path.display()))
}

fn load_map(path: Option<&Path>) -> Result<MapDef> {
    let Some(path) = path else { return Ok(MapDef::demo()) };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading map from {}", path.display()))?;
    MapDef::from_json(&text).with_context(|| format!("parsing map in {}", path.display()))
}

fn seats(count: usize) -> Vec<PlayerSetup> {
    if count > MAX_PLAYERS {
        warn!(count, max = MAX_PLAYERS, "too many players requested");
    }
    PlayerColor::ALL
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, &color)| {
            PlayerSetup::human(&format!("p{}", i + 1), &format!("{color:?}"), color)
        })
        .collect()
}

fn new_match(seed: u64, args: &MatchArgs) -> Result<GameState> {
    let settings = load_settings(args.settings.as_deref())?;
    let map = load_map(args.map.as_deref())?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    create_game(format!("match-{seed}"), settings, &map, seats(args.players), &mut rng)
        .with_context(|| format!("setting up match {seed}"))
}

// ── Commands ───────────────────────────────────────────────────────────

fn cmd_play(seed: u64, args: &MatchArgs, json: bool) -> Result<()> {
    let mut state = new_match(seed, args)?;
    let summary = run_match(&mut state, seed, args.max_steps)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &MatchSummary) {
    println!("=== Match seed {} ===", summary.seed);
    match &summary.winner {
        Some(w) => println!("  Winner: {w}"),
        None => println!("  No winner"),
    }
    println!(
        "  Rounds: {}  Steps: {}  Battles: {}  Skipped phases: {}",
        summary.rounds, summary.steps, summary.battles, summary.skipped_phases
    );
    println!();
    for p in &summary.players {
        let status = if p.eliminated { "  (eliminated)" } else { "" };
        println!(
            "    {:6} -- territories: {:>2}, cities: {:>2}{}",
            p.id.to_string(),
            p.territories,
            p.cities,
            status
        );
    }
}

fn cmd_soak(games: u64, first_seed: u64, args: &MatchArgs) -> Result<()> {
    info!(games, first_seed, players = args.players, "soak started");
    let outcomes: Vec<(u64, Result<MatchSummary>)> = (first_seed..first_seed + games)
        .into_par_iter()
        .map(|seed| {
            let outcome = new_match(seed, args).and_then(|mut state| {
                run_match(&mut state, seed, args.max_steps)
                    .with_context(|| format!("playing match {seed}"))
            });
            (seed, outcome)
        })
        .collect();

    let mut failures = 0;
    let mut rounds = 0u64;
    let mut battles = 0u64;
    for (seed, outcome) in &outcomes {
        match outcome {
            Ok(s) => {
                rounds += u64::from(s.rounds);
                battles += u64::from(s.battles);
            }
            Err(e) => {
                failures += 1;
                error!(seed, "{e:#}");
            }
        }
    }

    let finished = outcomes.len() as u64 - failures;
    println!("--- Soak: {games} matches, {failures} failures ---");
    if finished > 0 {
        println!("  Mean rounds: {:.1}", rounds as f64 / finished as f64);
        println!("  Mean battles: {:.1}", battles as f64 / finished as f64);
    }
    if failures > 0 {
        bail!("{failures} of {games} matches failed");
    }
    Ok(())
}

fn cmd_snapshot(seed: u64, steps: usize, args: &MatchArgs, out: Option<&Path>) -> Result<()> {
    let mut state = new_match(seed, args)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut driver = RandomDriver::new(seed.wrapping_add(1));

    for step in 0..steps {
        if state.winner.is_some() {
            break;
        }
        if state.production_pending {
            conquest_engine::acknowledge_production(&mut state, &mut rng)
                .with_context(|| format!("acknowledging production at step {step}"))?;
            continue;
        }
        let Some((actor, action)) = driver.choose(&state) else { break };
        conquest_engine::apply_action(&mut state, &actor, action, &mut rng)
            .with_context(|| format!("{actor} acting at step {step}"))?;
    }

    let text = snapshot::to_json_pretty(&state)?;
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(
                path = %path.display(),
                round = state.round,
                phase = %state.phase,
                "snapshot written"
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn cmd_restore(path: &Path) -> Result<()> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let state = snapshot::from_json(&text)
        .with_context(|| format!("restoring snapshot {}", path.display()))?;
    println!(
        "Restored {}: round {}, {} phase, {} to act",
        state.id, state.round, state.phase, state.current_player
    );
    Ok(())
}
