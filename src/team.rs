//! Team orchestration: match setup and the per-tick act loop.
//!
//! One `Team` controls every kart on our side. Each tick the frames of all
//! karts go through the perception model as a single batch, then each kart's
//! controller turns its observation into a command. Kart 0 is the striker;
//! every other kart runs the idle placeholder.

use anyhow::{Context, Result};
use ndarray::ArrayView3;
use std::path::Path;
use tracing::{debug, info};

use crate::action::KartAction;
use crate::config::AgentConfig;
use crate::field::{Goals, TeamSide};
use crate::kinematics::{direction, PlayerState};
use crate::perception::{load_perception_model, PerceptionModel, PuckObservation};
use crate::policy::{Decision, IdleController, PlayerController, StrikerPolicy};
use crate::transform::frames_to_batch;

/// Everything produced during one tick, in kart order.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub tick: u64,
    pub observations: Vec<PuckObservation>,
    pub decisions: Vec<Decision>,
}

impl TickOutcome {
    pub fn actions(&self) -> Vec<KartAction> {
        self.decisions.iter().map(|d| d.action).collect()
    }
}

/// State fixed at match start.
struct MatchSetup {
    side: TeamSide,
    goals: Goals,
    controllers: Vec<Box<dyn PlayerController>>,
}

/// Image-based agent controlling one team.
pub struct Team {
    model: Box<dyn PerceptionModel>,
    config: AgentConfig,
    setup: Option<MatchSetup>,
    global_step: u64,
}

impl Team {
    pub fn new(model: Box<dyn PerceptionModel>, config: AgentConfig) -> Self {
        Self {
            model,
            config,
            setup: None,
            global_step: 0,
        }
    }

    /// Load the perception model named in `config` and build the agent.
    ///
    /// Missing or unreadable weights are fatal.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let model = load_perception_model(&config.model.path, &config.model.channels)
            .context("Failed to initialize perception model")?;
        info!(path = %config.model.path.display(), "Loaded perception model");
        Ok(Self::new(model, config))
    }

    /// Like [`Team::from_config`], with a relative model path taken from `base_dir`.
    ///
    /// Used to find weights shipped next to the agent itself, whatever the
    /// working directory of the host process.
    pub fn from_config_in<P: AsRef<Path>>(mut config: AgentConfig, base_dir: P) -> Result<Self> {
        config.model.resolve_against(base_dir);
        Self::from_config(config)
    }

    /// Start a new match as `team` (0 = red, 1 = blue) with `num_players` karts.
    ///
    /// Returns the kart model to use for each player.
    pub fn new_match(&mut self, team: i32, num_players: usize) -> Result<Vec<String>> {
        let side = TeamSide::from_index(team)?;
        anyhow::ensure!(num_players > 0, "A team needs at least one player");

        let goals = Goals::for_team(side, self.config.team.goal_line);
        let mut controllers: Vec<Box<dyn PlayerController>> = Vec::with_capacity(num_players);
        controllers.push(Box::new(StrikerPolicy::new(self.config.policy, goals)));
        for _ in 1..num_players {
            controllers.push(Box::new(IdleController));
        }

        info!(
            team = side.index(),
            num_players,
            own_goal = ?goals.own,
            target_goal = ?goals.target,
            "New match"
        );

        self.setup = Some(MatchSetup {
            side,
            goals,
            controllers,
        });
        self.global_step = 0;
        Ok(vec![self.config.team.kart.clone(); num_players])
    }

    pub fn side(&self) -> Option<TeamSide> {
        self.setup.as_ref().map(|s| s.side)
    }

    pub fn goals(&self) -> Option<Goals> {
        self.setup.as_ref().map(|s| s.goals)
    }

    /// Ticks completed in the current match.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Decide one tick's commands for every kart.
    pub fn act(
        &mut self,
        player_states: &[PlayerState],
        player_images: &[ArrayView3<u8>],
    ) -> Result<Vec<KartAction>> {
        Ok(self.step(player_states, player_images)?.actions())
    }

    /// Like [`Team::act`], but also returns observations and the rule each kart followed.
    ///
    /// Input is fully validated before any controller runs, so a rejected tick
    /// leaves every kart's memory untouched.
    pub fn step(
        &mut self,
        player_states: &[PlayerState],
        player_images: &[ArrayView3<u8>],
    ) -> Result<TickOutcome> {
        let setup = self
            .setup
            .as_mut()
            .context("act() called before new_match()")?;
        let num_players = setup.controllers.len();
        anyhow::ensure!(
            player_states.len() == num_players,
            "Expected {} player states, got {}",
            num_players,
            player_states.len()
        );
        anyhow::ensure!(
            player_images.len() == num_players,
            "Expected {} player images, got {}",
            num_players,
            player_images.len()
        );

        let batch = frames_to_batch(player_images)?;
        let output = self
            .model
            .predict(&batch.view())
            .context("Perception model failed")?;
        anyhow::ensure!(
            output.batch_size() == num_players,
            "Perception model returned {} predictions for {} images",
            output.batch_size(),
            num_players
        );
        let observations: Vec<PuckObservation> = (0..num_players)
            .map(|i| {
                output
                    .observation(i)
                    .with_context(|| format!("Missing prediction for player {}", i))
            })
            .collect::<Result<_>>()?;

        log_field_position(self.global_step, &setup.goals, player_states);

        let decisions: Vec<Decision> = setup
            .controllers
            .iter_mut()
            .zip(player_states.iter().zip(observations.iter()))
            .map(|(controller, (state, obs))| controller.act(&state.kart, obs))
            .collect();

        let outcome = TickOutcome {
            tick: self.global_step,
            observations,
            decisions,
        };
        self.global_step += 1;
        Ok(outcome)
    }
}

/// Diagnostics only; nothing here feeds back into control.
fn log_field_position(tick: u64, goals: &Goals, player_states: &[PlayerState]) {
    if let Some(striker) = player_states.first() {
        let kart = &striker.kart;
        debug!(
            tick,
            heading = ?kart.heading(),
            goal_direction = ?direction(kart.front_planar(), goals.target),
            yaw = kart.yaw_degrees(),
            clear_attack = goals.is_clear_attack_position(kart.front_planar()),
            "striker position"
        );
    }
    if let Some(defender) = player_states.get(1) {
        debug!(
            tick,
            in_defensive_box = goals.in_defensive_box(defender.kart.front_planar()),
            "defender position"
        );
    }
}
