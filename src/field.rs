//! Rink geometry: which end each team defends and field-zone predicates.
//!
//! Goals sit on the `z` axis. Team 0 (red) defends the positive end and attacks
//! the negative end; team 1 (blue) is the mirror image.

use anyhow::Result;

use crate::kinematics::{sign, Planar};

/// Distance from the rink center to each goal line.
pub const DEFAULT_GOAL_LINE: f32 = 64.0;

/// Half-width of the central lane in front of each goal.
const CENTER_LANE_HALF_WIDTH: f32 = 10.0;
/// Distance from center beyond which a kart is deep in one end.
const DEEP_ZONE: f32 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamSide {
    Red,
    Blue,
}

impl TeamSide {
    /// Team from the simulator's index (0 = red, 1 = blue).
    pub fn from_index(team: i32) -> Result<Self> {
        match team {
            0 => Ok(TeamSide::Red),
            1 => Ok(TeamSide::Blue),
            other => anyhow::bail!("Invalid team index {}, expected 0 or 1", other),
        }
    }

    pub fn index(self) -> i32 {
        match self {
            TeamSide::Red => 0,
            TeamSide::Blue => 1,
        }
    }
}

/// Own and target goal centers on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Goals {
    pub own: Planar,
    pub target: Planar,
}

impl Goals {
    pub fn for_team(side: TeamSide, goal_line: f32) -> Self {
        match side {
            TeamSide::Red => Goals {
                own: [0.0, goal_line],
                target: [0.0, -goal_line],
            },
            TeamSide::Blue => Goals {
                own: [0.0, -goal_line],
                target: [0.0, goal_line],
            },
        }
    }

    /// True when `position` lies in the half of the rink containing the target goal.
    ///
    /// A kart exactly on the center line belongs to neither half.
    pub fn in_target_half(&self, position: Planar) -> bool {
        sign(position[1]) == sign(self.target[1])
    }

    /// Whether driving straight at the target goal from `position` is reasonable.
    ///
    /// The outer corners of the opponent's end (outside the center lane and deep
    /// in their half) are the only unsafe zone.
    pub fn is_clear_attack_position(&self, position: Planar) -> bool {
        !(position[0].abs() > CENTER_LANE_HALF_WIDTH
            && self.in_target_half(position)
            && position[1].abs() > DEEP_ZONE)
    }

    /// Whether `position` is inside the box in front of the own goal.
    pub fn in_defensive_box(&self, position: Planar) -> bool {
        position[0].abs() <= CENTER_LANE_HALF_WIDTH
            && sign(position[1]) == sign(self.own[1])
            && position[1].abs() > DEEP_ZONE
    }
}
