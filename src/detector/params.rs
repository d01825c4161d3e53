//! Detection parameters and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::{mask_size, MAX_SIZE_MASK_2};

/// Polarity of the lines to detect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RidgeMode {
    /// Lines brighter than their surroundings.
    #[default]
    Light,
    /// Lines darker than their surroundings.
    Dark,
}

/// Strategy for resolving overlapping lines at junction clusters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapMode {
    /// Leave crossing lines split into their fragments.
    #[default]
    None,
    /// Merge fragments across crossings so that the straightest
    /// continuation wins.
    Slope,
}

/// Parameters of one detection run.
///
/// `sigma` is the scale of the Gaussian derivatives and should be at least
/// `width / (2 * sqrt(3))` for lines of the expected width. `low` and `high`
/// are the hysteresis thresholds on the second-derivative response. Lines
/// shorter than `min_length` or, when `max_length > 0`, longer than
/// `max_length` are discarded.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeParams {
    pub sigma: f64,
    pub low: f64,
    pub high: f64,
    pub min_length: f64,
    pub max_length: f64,
    pub mode: RidgeMode,
    pub estimate_width: bool,
    pub correct_position: bool,
    pub extend_lines: bool,
    pub overlap: OverlapMode,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            low: 3.0,
            high: 7.0,
            min_length: 0.0,
            max_length: 0.0,
            mode: RidgeMode::Light,
            estimate_width: true,
            correct_position: false,
            extend_lines: true,
            overlap: OverlapMode::None,
        }
    }
}

/// Rejected parameter combinations.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("sigma must be at least 0.4, got {0}")]
    InvalidSigma(f64),
    #[error("thresholds must satisfy 0 <= low <= high, got low {low}, high {high}")]
    InvalidThresholds { low: f64, high: f64 },
    #[error("derivative mask radius {mask} does not fit the smaller image dimension {min_dim}")]
    MaskTooLarge { mask: usize, min_dim: usize },
}

impl RidgeParams {
    /// Check the parameters against an image of `width x height` pixels.
    pub fn validate(&self, width: usize, height: usize) -> Result<(), ParamError> {
        if !(self.sigma >= 0.4) {
            return Err(ParamError::InvalidSigma(self.sigma));
        }
        if !(self.low >= 0.0) || !(self.high >= self.low) {
            return Err(ParamError::InvalidThresholds {
                low: self.low,
                high: self.high,
            });
        }
        let min_dim = width.min(height);
        let mask = mask_size(MAX_SIZE_MASK_2, self.sigma);
        if mask >= min_dim {
            return Err(ParamError::MaskTooLarge { mask, min_dim });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_pass_validation() {
        assert_eq!(RidgeParams::default().validate(64, 64), Ok(()));
    }

    #[test]
    fn small_sigma_is_rejected() {
        let params = RidgeParams {
            sigma: 0.3,
            ..Default::default()
        };
        assert_eq!(params.validate(64, 64), Err(ParamError::InvalidSigma(0.3)));
    }

    #[test]
    fn nan_sigma_is_rejected() {
        let params = RidgeParams {
            sigma: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(64, 64),
            Err(ParamError::InvalidSigma(_))
        ));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let params = RidgeParams {
            low: 5.0,
            high: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(64, 64),
            Err(ParamError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn oversized_mask_is_rejected() {
        let params = RidgeParams {
            sigma: 10.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(16, 64),
            Err(ParamError::MaskTooLarge { .. })
        ));
    }
}
