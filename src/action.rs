//! Control command sent to the simulator every tick.

use serde::{Deserialize, Serialize};

/// One kart's controls for a single tick.
///
/// `acceleration` is expected in `[0, 1]` and `steer` in `[-1, 1]`; the
/// simulator clamps anything outside those ranges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KartAction {
    pub acceleration: f32,
    /// Brake reverses the kart if it is not accelerating.
    pub brake: bool,
    pub steer: f32,
    #[serde(default)]
    pub drift: bool,
    #[serde(default)]
    pub fire: bool,
    #[serde(default)]
    pub nitro: bool,
    #[serde(default)]
    pub rescue: bool,
}

impl KartAction {
    /// No throttle, no steering, no flags.
    pub fn idle() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_action_is_all_zero() {
        let action = KartAction::idle();
        assert_eq!(action.acceleration, 0.0);
        assert_eq!(action.steer, 0.0);
        assert!(!action.brake && !action.drift && !action.fire && !action.nitro && !action.rescue);
    }

    #[test]
    fn test_optional_flags_default_when_missing() {
        let action: KartAction =
            serde_yaml::from_str("acceleration: 0.5\nbrake: true\nsteer: -0.25\n").unwrap();
        assert_eq!(action.acceleration, 0.5);
        assert!(action.brake);
        assert_eq!(action.steer, -0.25);
        assert!(!action.nitro);
    }
}
