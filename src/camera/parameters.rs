use super::interface::CameraControl;
use crate::error::CameraError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Camera parameters reachable through [`CameraControl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Width,
    Height,
    Focus,
    Shutter,
    Gain,
    WhiteBalanceRed,
    WhiteBalanceBlue,
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Width => "width",
            Parameter::Height => "height",
            Parameter::Focus => "focus",
            Parameter::Shutter => "shutter",
            Parameter::Gain => "gain",
            Parameter::WhiteBalanceRed => "white_balance_red",
            Parameter::WhiteBalanceBlue => "white_balance_blue",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Range, current value and control mode of one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub min: f64,
    pub max: f64,
    pub now: f64,
    pub is_auto: bool,
}

impl ParameterState {
    pub fn manual(min: f64, max: f64, now: f64) -> Self {
        Self {
            min,
            max,
            now,
            is_auto: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A change requested through [`CameraControl::set_parameter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// Set a manual value; rejected while automatic control is on
    Manual(f64),
    /// Switch automatic control on or off
    Auto(bool),
    /// Flip automatic control
    ToggleAuto,
}

/// Startup override as written in the config file: a number or `auto = bool`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSetting {
    Auto(bool),
    Value(f64),
}

impl From<ParameterSetting> for ParameterValue {
    fn from(setting: ParameterSetting) -> Self {
        match setting {
            ParameterSetting::Auto(on) => ParameterValue::Auto(on),
            ParameterSetting::Value(v) => ParameterValue::Manual(v),
        }
    }
}

/// Apply configured overrides. Rejected overrides are logged and skipped;
/// returns how many were applied.
pub fn apply_parameter_overrides(
    camera: &mut dyn CameraControl,
    overrides: &BTreeMap<Parameter, ParameterSetting>,
) -> usize {
    let mut applied = 0;

    for (&parameter, &setting) in overrides {
        match camera.set_parameter(parameter, setting.into()) {
            Ok(state) => {
                info!(
                    "Camera {} set: now {} ({})",
                    parameter,
                    state.now,
                    if state.is_auto { "auto" } else { "manual" }
                );
                applied += 1;
            }
            Err(e) => warn!("Skipping camera override for {}: {}", parameter, e),
        }
    }

    applied
}

/// Shared set-semantics for parameter tables kept in software
pub(crate) fn apply_to_state(
    parameter: Parameter,
    state: &mut ParameterState,
    value: ParameterValue,
) -> Result<ParameterState, CameraError> {
    match value {
        ParameterValue::ToggleAuto => state.is_auto = !state.is_auto,
        ParameterValue::Auto(on) => state.is_auto = on,
        ParameterValue::Manual(v) => {
            if state.is_auto {
                return Err(CameraError::AutoControlled { parameter });
            }
            if !state.contains(v) {
                return Err(CameraError::OutOfRange {
                    parameter,
                    value: v,
                    min: state.min,
                    max: state.max,
                });
            }
            state.now = v;
        }
    }
    Ok(*state)
}
