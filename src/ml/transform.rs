//! Target-space transform applied before fitting and undone after inference.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Tag recorded in the artifact telling serving which inverse to apply
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetTransform {
    /// Raw watts in, raw watts out
    #[default]
    None,
    /// `ln(1 + watts)` in, `exp(y) - 1` out
    Log1p,
}

impl TargetTransform {
    /// Map a watt value into fit space
    pub fn apply(&self, watts: f64) -> f64 {
        match self {
            TargetTransform::None => watts,
            TargetTransform::Log1p => watts.ln_1p(),
        }
    }

    /// Map a model output back into watts
    pub fn invert(&self, value: f64) -> f64 {
        match self {
            TargetTransform::None => value,
            TargetTransform::Log1p => value.exp_m1(),
        }
    }
}

/// Floor at zero watts. NaN and negative zero map to `0.0` as well.
pub fn clamp_non_negative(watts: f64) -> f64 {
    if watts > 0.0 {
        watts
    } else {
        0.0
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
