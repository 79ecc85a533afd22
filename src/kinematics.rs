//! Kart kinematic state projected onto the ground plane.
//!
//! The simulator reports 3D vectors with `y` pointing up. Everything the
//! controller reasons about lives on the `(x, z)` plane, so the vertical
//! component is dropped before any geometry is done.

use serde::{Deserialize, Serialize};

/// 2D point or direction on the ground plane, `[x, z]`.
pub type Planar = [f32; 2];

/// Per-kart state for one tick, as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KartState {
    /// Point at the front of the kart.
    pub front: [f32; 3],
    /// Center of the kart.
    pub location: [f32; 3],
    /// Velocity in world coordinates.
    pub velocity: [f32; 3],
    /// Orientation quaternion.
    #[serde(default = "identity_rotation")]
    pub rotation: [f32; 4],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// One entry of the per-tick player state list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub kart: KartState,
}

/// Drop the vertical axis of a world-space vector.
pub fn planar(v: [f32; 3]) -> Planar {
    [v[0], v[2]]
}

pub fn norm(v: Planar) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// Unit vector pointing from `from` to `to`, or zero if the points coincide.
pub fn direction(from: Planar, to: Planar) -> Planar {
    let delta = [to[0] - from[0], to[1] - from[1]];
    let length = norm(delta);
    if length <= f32::EPSILON {
        return [0.0, 0.0];
    }
    [delta[0] / length, delta[1] / length]
}

/// Sign with `sign(0) == 0`, unlike `f32::signum`.
pub fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

impl KartState {
    pub fn front_planar(&self) -> Planar {
        planar(self.front)
    }

    pub fn center_planar(&self) -> Planar {
        planar(self.location)
    }

    /// Direction the kart is facing on the ground plane.
    pub fn heading(&self) -> Planar {
        direction(self.center_planar(), self.front_planar())
    }

    /// Ground-plane speed.
    pub fn speed(&self) -> f32 {
        norm(planar(self.velocity))
    }

    /// Yaw angle in degrees from the rotation quaternion.
    pub fn yaw_degrees(&self) -> f32 {
        let q = self.rotation;
        let yaw = (2.0 * (q[2] * q[3] + q[0] * q[1]))
            .atan2(q[0] * q[0] - q[1] * q[1] - q[2] * q[2] + q[3] * q[3]);
        yaw.to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kart(front: [f32; 3], location: [f32; 3], velocity: [f32; 3]) -> KartState {
        KartState {
            front,
            location,
            velocity,
            rotation: identity_rotation(),
        }
    }

    #[test]
    fn test_planar_drops_vertical_axis() {
        assert_eq!(planar([1.0, 5.0, -2.0]), [1.0, -2.0]);
    }

    #[test]
    fn test_heading_is_unit_length() {
        let k = kart([3.0, 0.5, 4.0], [0.0, 0.3, 0.0], [0.0; 3]);
        let h = k.heading();
        assert!((h[0] - 0.6).abs() < 1e-6);
        assert!((h[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_heading_degenerate_is_zero() {
        let k = kart([1.0, 2.0, 1.0], [1.0, 0.0, 1.0], [0.0; 3]);
        assert_eq!(k.heading(), [0.0, 0.0]);
    }

    #[test]
    fn test_speed_ignores_vertical_velocity() {
        let k = kart([0.0; 3], [0.0; 3], [3.0, 100.0, 4.0]);
        assert!((k.speed() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_sign_of_zero_is_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(2.5), 1.0);
        assert_eq!(sign(-1e-9), -1.0);
    }

    #[test]
    fn test_yaw_from_quaternion() {
        let half = std::f32::consts::FRAC_PI_4 / 2.0;
        let mut k = kart([0.0; 3], [0.0; 3], [0.0; 3]);
        k.rotation = [0.0, 0.0, half.sin(), half.cos()];
        assert!((k.yaw_degrees() - 45.0).abs() < 1e-3);

        k.rotation = identity_rotation();
        assert!(k.yaw_degrees().abs() < 1e-6);
    }

    #[test]
    fn test_player_state_from_yaml() {
        let yaml = r#"
kart:
  front: [1.0, 0.0, 2.0]
  location: [1.0, 0.0, 1.0]
  velocity: [0.0, 0.0, 3.0]
"#;
        let state: PlayerState = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(state.kart.front_planar(), [1.0, 2.0]);
        assert_eq!(state.kart.rotation, identity_rotation());
    }
}
