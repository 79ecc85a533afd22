//! Per-kart controllers.
//!
//! The striker turns the Planner's puck observation plus its own kinematic
//! state into a [`KartAction`] each tick. The rules are evaluated as an
//! explicit priority list:
//!
//! 1. **Search** - puck not visible. Deep in the target half: brake and turn
//!    right. In our own half: half throttle and turn left.
//! 2. **Stuck** - the kart has not moved and has no speed at both this tick and
//!    the previous one: reverse with full right steer.
//! 3. **Acquired** - puck straight ahead and low in the frame: nitro and full
//!    throttle.
//! 4. **Off side** - puck off to one side and very close: brake and steer
//!    toward the side that shrinks the horizontal offset.
//! 5. **Fine alignment** - additive: when the distance proxy is in the
//!    approach band, push steer further in the direction it already points.
//!
//! Rules 1 and 2 are terminal. Rules 3 and 4 are exclusive of each other and
//! fall back to chasing with the baseline command. Rule 5 is applied on top of
//! whichever of 3, 4 or the baseline fired. Steer is clamped to `[-1, 1]` last.
//!
//! Baseline: `steer = steer_gain² · x`, full throttle below the target velocity.

use tracing::debug;

use crate::action::KartAction;
use crate::config::PolicyParams;
use crate::field::Goals;
use crate::kinematics::{sign, KartState, Planar};
use crate::perception::PuckObservation;

/// Which rule produced the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveMode {
    /// Placeholder controller, no input.
    Idle,
    /// Puck lost while in the target half.
    SearchTargetHalf,
    /// Puck lost while in our own half.
    SearchOwnHalf,
    Stuck,
    Acquired,
    OffSide,
    /// Baseline steering toward the puck.
    Chase,
}

impl DriveMode {
    /// Stable numeric code used in recordings.
    pub fn code(self) -> i32 {
        match self {
            DriveMode::Idle => 0,
            DriveMode::SearchTargetHalf => 1,
            DriveMode::SearchOwnHalf => 2,
            DriveMode::Stuck => 3,
            DriveMode::Acquired => 4,
            DriveMode::OffSide => 5,
            DriveMode::Chase => 6,
        }
    }
}

/// A controller's output for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub action: KartAction,
    pub mode: DriveMode,
    /// Fine alignment was added to the steer command.
    pub aligned: bool,
}

/// Trait for per-kart controllers driven once per simulation tick.
pub trait PlayerController {
    /// Decide this tick's command from the kart's state and what its camera saw.
    fn act(&mut self, kart: &KartState, observation: &PuckObservation) -> Decision;
}

/// What the striker remembers from the previous tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyMemory {
    pub previous_position: Option<Planar>,
    pub previous_speed: Option<f32>,
    pub previous_puck_visible: bool,
    pub previous_location: Option<[f32; 2]>,
    pub ticks: u64,
}

impl Default for PolicyMemory {
    fn default() -> Self {
        Self {
            previous_position: None,
            previous_speed: None,
            previous_puck_visible: true,
            previous_location: None,
            ticks: 0,
        }
    }
}

impl PolicyMemory {
    /// True when neither position nor speed changed meaningfully since last tick.
    pub fn is_stuck(&self, position: Planar, speed: f32, epsilon: f32) -> bool {
        match (self.previous_position, self.previous_speed) {
            (Some(prev), Some(prev_speed)) => {
                (prev[0] - position[0]).abs() < epsilon
                    && (prev[1] - position[1]).abs() < epsilon
                    && prev_speed.abs() < epsilon
                    && speed.abs() < epsilon
            }
            _ => false,
        }
    }
}

/// Decide the striker's command without touching memory.
pub fn decide(
    params: &PolicyParams,
    goals: &Goals,
    memory: &PolicyMemory,
    kart: &KartState,
    observation: &PuckObservation,
) -> Decision {
    let position = kart.front_planar();
    let speed = kart.speed();
    let [x, y] = observation.location;
    let distance = observation.distance;

    // Baseline
    let mut steer = params.steer_gain * params.steer_gain * x;
    let mut acceleration = if speed < params.target_velocity { 1.0 } else { 0.0 };
    let mut brake = false;
    let mut nitro = false;
    let mut aligned = false;

    let mode = if observation.visibility < params.visibility_threshold {
        if goals.in_target_half(position) {
            brake = true;
            acceleration = 0.0;
            steer = 1.0;
            DriveMode::SearchTargetHalf
        } else {
            acceleration = params.search_acceleration;
            steer = -1.0;
            DriveMode::SearchOwnHalf
        }
    } else if memory.is_stuck(position, speed, params.stuck_epsilon) {
        brake = true;
        acceleration = 0.0;
        steer = 1.0;
        DriveMode::Stuck
    } else {
        let centered = x.abs() < params.centered_x
            && (y + params.centered_y_offset).abs() < params.centered_y_band;
        let off_side = x.abs() > params.centered_x
            && distance <= params.close_distance
            && y > params.behind_y;

        let mode = if centered {
            nitro = true;
            acceleration = 1.0;
            DriveMode::Acquired
        } else if off_side {
            brake = true;
            acceleration = 0.0;
            steer = -sign(x);
            DriveMode::OffSide
        } else {
            DriveMode::Chase
        };

        if distance >= params.alignment_min && distance < params.alignment_max {
            steer += sign(steer) * params.alignment_increment;
            aligned = true;
        }
        mode
    };

    Decision {
        action: KartAction {
            acceleration,
            brake,
            steer: steer.clamp(-1.0, 1.0),
            nitro,
            ..KartAction::default()
        },
        mode,
        aligned,
    }
}

/// Puck-chasing controller with one tick of memory.
#[derive(Debug, Clone)]
pub struct StrikerPolicy {
    params: PolicyParams,
    goals: Goals,
    memory: PolicyMemory,
}

impl StrikerPolicy {
    pub fn new(params: PolicyParams, goals: Goals) -> Self {
        Self {
            params,
            goals,
            memory: PolicyMemory::default(),
        }
    }

    pub fn memory(&self) -> &PolicyMemory {
        &self.memory
    }
}

impl PlayerController for StrikerPolicy {
    fn act(&mut self, kart: &KartState, observation: &PuckObservation) -> Decision {
        let decision = decide(&self.params, &self.goals, &self.memory, kart, observation);

        debug!(
            tick = self.memory.ticks,
            mode = ?decision.mode,
            aligned = decision.aligned,
            previously_visible = self.memory.previous_puck_visible,
            previous_location = ?self.memory.previous_location,
            visibility = observation.visibility,
            distance = observation.distance,
            x = observation.location[0],
            y = observation.location[1],
            steer = decision.action.steer,
            "striker decision"
        );

        // Memory is written once, after every rule has read last tick's values.
        let position = kart.front_planar();
        self.memory = PolicyMemory {
            previous_position: Some(position),
            previous_speed: Some(kart.speed()),
            previous_puck_visible: observation.visibility >= self.params.visibility_threshold,
            previous_location: Some(observation.location),
            ticks: self.memory.ticks + 1,
        };
        decision
    }
}

/// Controller that sends no input. Stands in for the unimplemented defender.
#[derive(Debug, Clone, Default)]
pub struct IdleController;

impl PlayerController for IdleController {
    fn act(&mut self, _kart: &KartState, _observation: &PuckObservation) -> Decision {
        Decision {
            action: KartAction::idle(),
            mode: DriveMode::Idle,
            aligned: false,
        }
    }
}
