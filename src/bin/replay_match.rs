#!/usr/bin/env rust
//! Drive the kart agent offline from recorded frames.
//!
//! The tick script is a YAML file listing, for every tick, each kart's state
//! and the path of the frame its camera rendered:
//!
//! ```yaml
//! ticks:
//!   - players:
//!       - kart:
//!           front: [0.0, 0.4, 10.0]
//!           location: [0.0, 0.4, 11.0]
//!           velocity: [0.0, 0.0, -5.0]
//!         image: frames/0000_0.png
//! ```
//!
//! Image paths are relative to the script's directory. The agent's command for
//! each kart is printed, and the whole match can be saved as a recording.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kart_agent::config::{load_config, AgentConfig};
use kart_agent::kinematics::{KartState, PlayerState};
use kart_agent::recording::{write_recording_yaml, MatchRecording, RecordingMetadata};
use kart_agent::team::Team;
use kart_agent::transform::load_frame;

#[derive(Parser, Debug)]
#[command(
    name = "replay_match",
    about = "Run the kart agent on a scripted sequence of frames",
    version
)]
struct Args {
    /// YAML tick script
    #[arg(long)]
    ticks: PathBuf,

    /// Agent config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Perception weights (.npz or .onnx), overrides the config
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Team to play (0 = red, 1 = blue)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(i32).range(0..=1))]
    team: i32,

    /// Write a recording to this path (.npz plus a .yaml companion)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log per-tick diagnostics
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct TickScript {
    ticks: Vec<ScriptedTick>,
}

#[derive(Debug, Deserialize)]
struct ScriptedTick {
    players: Vec<ScriptedPlayer>,
}

#[derive(Debug, Deserialize)]
struct ScriptedPlayer {
    kart: KartState,
    image: PathBuf,
}

fn load_script(path: &Path) -> Result<TickScript> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tick script: {}", path.display()))?;
    let script: TickScript = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse tick script: {}", path.display()))?;
    anyhow::ensure!(!script.ticks.is_empty(), "Tick script has no ticks");
    let num_players = script.ticks[0].players.len();
    anyhow::ensure!(num_players > 0, "Tick script has no players");
    for (i, tick) in script.ticks.iter().enumerate() {
        anyhow::ensure!(
            tick.players.len() == num_players,
            "Tick {} has {} players, expected {}",
            i,
            tick.players.len(),
            num_players
        );
    }
    Ok(script)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => AgentConfig::default(),
    };
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    let model_name = config.model.path.display().to_string();

    let script = load_script(&args.ticks)?;
    let script_dir = args.ticks.parent().unwrap_or_else(|| Path::new("."));
    let num_players = script.ticks[0].players.len();

    let mut team = Team::from_config(config)?;
    let karts = team.new_match(args.team, num_players)?;
    info!(?karts, ticks = script.ticks.len(), "Replaying match");

    let mut recording = MatchRecording::new();
    for tick in &script.ticks {
        let states: Vec<PlayerState> = tick
            .players
            .iter()
            .map(|p| PlayerState { kart: p.kart })
            .collect();
        let frames = tick
            .players
            .iter()
            .map(|p| load_frame(script_dir.join(&p.image)))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();

        let outcome = team
            .step(&states, &views)
            .with_context(|| format!("Tick {} failed", team.global_step()))?;

        for (player, (decision, obs)) in outcome
            .decisions
            .iter()
            .zip(outcome.observations.iter())
            .enumerate()
        {
            let a = &decision.action;
            println!(
                "tick {:4} kart {} {:?}: accel {:.2} steer {:+.3} brake {} nitro {} (vis {:.2}, dist {:.3}, loc [{:+.3}, {:+.3}])",
                outcome.tick,
                player,
                decision.mode,
                a.acceleration,
                a.steer,
                a.brake,
                a.nitro,
                obs.visibility,
                obs.distance,
                obs.location[0],
                obs.location[1]
            );
        }
        recording.push_tick(&states, &outcome);
    }

    if let Some(output) = &args.output {
        recording.write_npz(output)?;
        let metadata = RecordingMetadata {
            team: args.team,
            num_players,
            num_ticks: recording.num_ticks(),
            model: model_name,
            creator: format!("replay_match-{}", std::process::id()),
        };
        write_recording_yaml(output.with_extension("yaml"), &metadata)?;
        info!(path = %output.display(), "Wrote recording");
    }

    Ok(())
}
