#[cfg(feature = "python")]
use numpy::PyReadonlyArray3;
#[cfg(feature = "python")]
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyDict;

pub mod action;
pub mod config;
pub mod field;
pub mod kinematics;
pub mod localizer;
pub mod perception;
pub mod policy;
pub mod recording;
pub mod team;
pub mod transform;

#[cfg(feature = "python")]
fn runtime_error(e: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", e))
}

/// Directory containing the loaded `kart_agent` extension module.
#[cfg(feature = "python")]
fn module_dir(py: Python<'_>) -> PyResult<std::path::PathBuf> {
    let filename: String = PyModule::import_bound(py, "kart_agent")?
        .filename()?
        .extract()?;
    std::path::Path::new(&filename)
        .parent()
        .map(|dir| dir.to_path_buf())
        .ok_or_else(|| PyRuntimeError::new_err(format!("No parent directory for {}", filename)))
}

/// Read a fixed-size float vector from a simulator state dict.
#[cfg(feature = "python")]
fn read_vector<const N: usize>(dict: &Bound<'_, PyDict>, key: &str) -> PyResult<[f32; N]> {
    let value = dict
        .get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(key.to_string()))?;
    let values: Vec<f32> = value.extract()?;
    values.try_into().map_err(|v: Vec<f32>| {
        PyValueError::new_err(format!("'{}' has {} components, expected {}", key, v.len(), N))
    })
}

/// Convert one entry of the simulator's `player_state` list.
#[cfg(feature = "python")]
fn player_state_from_dict(state: &Bound<'_, PyDict>) -> PyResult<kinematics::PlayerState> {
    let kart = state
        .get_item("kart")?
        .ok_or_else(|| PyKeyError::new_err("kart"))?;
    let kart = kart.downcast::<PyDict>()?;
    let rotation = match kart.get_item("rotation")? {
        Some(_) => read_vector::<4>(kart, "rotation")?,
        None => [0.0, 0.0, 0.0, 1.0],
    };
    Ok(kinematics::PlayerState {
        kart: kinematics::KartState {
            front: read_vector::<3>(kart, "front")?,
            location: read_vector::<3>(kart, "location")?,
            velocity: read_vector::<3>(kart, "velocity")?,
            rotation,
        },
    })
}

#[cfg(feature = "python")]
fn action_to_dict<'py>(
    py: Python<'py>,
    action: &action::KartAction,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("acceleration", action.acceleration)?;
    dict.set_item("brake", action.brake)?;
    dict.set_item("steer", action.steer)?;
    dict.set_item("drift", action.drift)?;
    dict.set_item("fire", action.fire)?;
    dict.set_item("nitro", action.nitro)?;
    dict.set_item("rescue", action.rescue)?;
    Ok(dict)
}

/// Image agent exposed to the simulator's Python match runner.
#[cfg(feature = "python")]
#[pyclass(name = "Team", unsendable)]
struct PyTeam {
    inner: team::Team,
}

#[cfg(feature = "python")]
#[pymethods]
impl PyTeam {
    /// Build the agent from an optional YAML config and/or weights file.
    ///
    /// `model_path` overrides `model.path` from the config. With neither, the
    /// default weights are read from the directory holding this extension module.
    #[new]
    #[pyo3(signature = (model_path=None, config_path=None))]
    fn new(py: Python<'_>, model_path: Option<String>, config_path: Option<String>) -> PyResult<Self> {
        let use_module_dir = model_path.is_none() && config_path.is_none();
        let mut config = match config_path {
            Some(path) => config::load_config(path).map_err(runtime_error)?,
            None => config::AgentConfig::default(),
        };
        if let Some(path) = model_path {
            config.model.path = path.into();
        }
        let inner = if use_module_dir {
            team::Team::from_config_in(config, module_dir(py)?)
        } else {
            team::Team::from_config(config)
        }
        .map_err(runtime_error)?;
        Ok(Self { inner })
    }

    /// The simulator feeds this agent rendered frames.
    #[getter]
    fn agent_type(&self) -> &'static str {
        "image"
    }

    fn new_match(&mut self, team: i32, num_players: usize) -> PyResult<Vec<String>> {
        self.inner.new_match(team, num_players).map_err(runtime_error)
    }

    /// One command dict per kart, from the per-kart state dicts and `(H, W, 3)` uint8 frames.
    fn act<'py>(
        &mut self,
        py: Python<'py>,
        player_state: Vec<Bound<'py, PyDict>>,
        player_image: Vec<PyReadonlyArray3<'py, u8>>,
    ) -> PyResult<Vec<Bound<'py, PyDict>>> {
        let states = player_state
            .iter()
            .map(player_state_from_dict)
            .collect::<PyResult<Vec<_>>>()?;
        let frames: Vec<_> = player_image.iter().map(|img| img.as_array()).collect();

        let actions = self.inner.act(&states, &frames).map_err(runtime_error)?;
        actions.iter().map(|a| action_to_dict(py, a)).collect()
    }
}

#[cfg(feature = "python")]
#[pymodule]
fn kart_agent(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTeam>()?;
    Ok(())
}
