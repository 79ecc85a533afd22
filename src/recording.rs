//! Writing match recordings to disk.
//!
//! Each recorded match produces two files:
//! - A `.npz` file with numpy-compatible per-tick arrays, one row per kart per tick.
//! - A `.yaml` companion file with match metadata.
//!
//! The `.npz` format is a zip archive of `.npy` files, readable by `numpy.load()`.

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzWriter;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::action::KartAction;
use crate::kinematics::{Planar, PlayerState};
use crate::perception::PuckObservation;
use crate::policy::DriveMode;
use crate::team::TickOutcome;

/// One kart during one tick.
#[derive(Debug, Clone)]
pub struct TickRecord {
    pub tick: u64,
    pub player: usize,
    pub observation: PuckObservation,
    pub position: Planar,
    pub speed: f32,
    pub action: KartAction,
    pub mode: DriveMode,
}

/// Metadata written as a companion YAML file for each recording.
#[derive(Debug, Serialize)]
pub struct RecordingMetadata {
    /// Team index played (0 = red, 1 = blue).
    pub team: i32,
    pub num_players: usize,
    /// Number of ticks in the recording.
    pub num_ticks: usize,
    /// Perception weights used.
    pub model: String,
    /// Identifier of the process that generated this recording.
    pub creator: String,
}

/// Tick records accumulated over a match.
#[derive(Debug, Default)]
pub struct MatchRecording {
    records: Vec<TickRecord>,
}

impl MatchRecording {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every kart's row for one tick.
    pub fn push_tick(&mut self, player_states: &[PlayerState], outcome: &TickOutcome) {
        for (player, ((state, obs), decision)) in player_states
            .iter()
            .zip(outcome.observations.iter())
            .zip(outcome.decisions.iter())
            .enumerate()
        {
            self.records.push(TickRecord {
                tick: outcome.tick,
                player,
                observation: *obs,
                position: state.kart.front_planar(),
                speed: state.kart.speed(),
                action: decision.action,
                mode: decision.mode,
            });
        }
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct ticks recorded.
    pub fn num_ticks(&self) -> usize {
        let mut ticks: Vec<u64> = self.records.iter().map(|r| r.tick).collect();
        ticks.dedup();
        ticks.len()
    }

    /// Write the recording as a `.npz` file.
    ///
    /// Arrays saved (N = ticks × karts):
    /// - `ticks`, `players`, `modes`: shape `(N,)` int64/int32
    /// - `puck`: shape `(N, 2)` float32, visibility then distance
    /// - `locations`, `positions`: shape `(N, 2)` float32
    /// - `speeds`: shape `(N,)` float32
    /// - `controls`: shape `(N, 4)` float32, acceleration/steer/brake/nitro (0/1 flags)
    pub fn write_npz<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if self.records.is_empty() {
            anyhow::bail!("Cannot write an empty recording");
        }

        let ticks = Array1::<i64>::from_iter(self.records.iter().map(|r| r.tick as i64));
        let players = Array1::<i32>::from_iter(self.records.iter().map(|r| r.player as i32));
        let modes = Array1::<i32>::from_iter(self.records.iter().map(|r| r.mode.code()));
        let speeds = Array1::<f32>::from_iter(self.records.iter().map(|r| r.speed));

        let puck = stack_rows(&self.records, 2, |r| {
            vec![r.observation.visibility, r.observation.distance]
        })
        .context("puck")?;
        let locations =
            stack_rows(&self.records, 2, |r| r.observation.location.to_vec()).context("locations")?;
        let positions = stack_rows(&self.records, 2, |r| r.position.to_vec()).context("positions")?;
        let controls = stack_rows(&self.records, 4, |r| {
            vec![
                r.action.acceleration,
                r.action.steer,
                flag(r.action.brake),
                flag(r.action.nitro),
            ]
        })
        .context("controls")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
        let mut npz = NpzWriter::new(BufWriter::new(file));
        npz.add_array("ticks", &ticks)?;
        npz.add_array("players", &players)?;
        npz.add_array("modes", &modes)?;
        npz.add_array("puck", &puck)?;
        npz.add_array("locations", &locations)?;
        npz.add_array("positions", &positions)?;
        npz.add_array("speeds", &speeds)?;
        npz.add_array("controls", &controls)?;
        npz.finish()?;

        Ok(())
    }
}

fn flag(b: bool) -> f32 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Stack one fixed-width row per record into an `(N, width)` array.
fn stack_rows<F>(records: &[TickRecord], width: usize, row: F) -> Result<Array2<f32>>
where
    F: Fn(&TickRecord) -> Vec<f32>,
{
    let n = records.len();
    let mut data = Vec::with_capacity(n * width);
    for record in records {
        data.extend(row(record));
    }
    Ok(Array2::from_shape_vec((n, width), data)?)
}

/// Write companion YAML metadata for a recording.
pub fn write_recording_yaml<P: AsRef<Path>>(path: P, metadata: &RecordingMetadata) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_yaml::to_string(metadata).context("Failed to serialize metadata")?;
    fs::write(path.as_ref(), contents)
        .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::KartState;
    use crate::policy::Decision;
    use ndarray_npy::NpzReader;
    use tempfile::TempDir;

    fn state(x: f32, z: f32) -> PlayerState {
        PlayerState {
            kart: KartState {
                front: [x, 0.0, z],
                location: [x, 0.0, z + 1.0],
                velocity: [3.0, 0.0, 4.0],
                rotation: [0.0, 0.0, 0.0, 1.0],
            },
        }
    }

    fn outcome(tick: u64) -> TickOutcome {
        let striker = Decision {
            action: KartAction {
                acceleration: 1.0,
                steer: 0.25,
                nitro: true,
                ..KartAction::default()
            },
            mode: DriveMode::Acquired,
            aligned: false,
        };
        let idle = Decision {
            action: KartAction::idle(),
            mode: DriveMode::Idle,
            aligned: false,
        };
        let obs = PuckObservation {
            visibility: 8.0,
            distance: 0.2,
            location: [0.01, -0.02],
        };
        TickOutcome {
            tick,
            observations: vec![obs, obs],
            decisions: vec![striker, idle],
        }
    }

    fn make_recording(num_ticks: u64) -> MatchRecording {
        let mut recording = MatchRecording::new();
        let states = [state(1.0, -2.0), state(5.0, 40.0)];
        for tick in 0..num_ticks {
            recording.push_tick(&states, &outcome(tick));
        }
        recording
    }

    #[test]
    fn test_push_tick_records_every_kart() {
        let recording = make_recording(3);
        assert_eq!(recording.records().len(), 6);
        assert_eq!(recording.num_ticks(), 3);
        let first = &recording.records()[0];
        assert_eq!(first.player, 0);
        assert_eq!(first.position, [1.0, -2.0]);
        assert_eq!(first.speed, 5.0);
        assert_eq!(recording.records()[1].mode, DriveMode::Idle);
    }

    #[test]
    fn test_write_npz_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match.npz");
        make_recording(4).write_npz(&path).unwrap();

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let modes: Array1<i32> = npz.by_name("modes.npy").unwrap();
        assert_eq!(modes.len(), 8);
        assert_eq!(modes[0], DriveMode::Acquired.code());
        assert_eq!(modes[1], DriveMode::Idle.code());

        let controls: Array2<f32> = npz.by_name("controls.npy").unwrap();
        assert_eq!(controls.shape(), &[8, 4]);
        assert_eq!(controls.row(0).to_vec(), vec![1.0, 0.25, 0.0, 1.0]);

        let ticks: Array1<i64> = npz.by_name("ticks.npy").unwrap();
        assert_eq!(ticks[7], 3);
    }

    #[test]
    fn test_write_yaml_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("match.yaml");
        let meta = RecordingMetadata {
            team: 1,
            num_players: 2,
            num_ticks: 10,
            model: "planner.npz".to_string(),
            creator: "test_pid".to_string(),
        };
        write_recording_yaml(&path, &meta).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("team: 1"));
        assert!(contents.contains("num_ticks: 10"));
        assert!(contents.contains("creator: test_pid"));
    }

    #[test]
    fn test_write_empty_recording_fails() {
        let dir = TempDir::new().unwrap();
        assert!(MatchRecording::new()
            .write_npz(dir.path().join("empty.npz"))
            .is_err());
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b").join("match.npz");
        make_recording(1).write_npz(&nested).unwrap();
        assert!(nested.exists());
    }
}
