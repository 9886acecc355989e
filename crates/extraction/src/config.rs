// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Extraction configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! wavelength = "6000.0,6100.0,0.8"
//! specmin = 0
//! nspec = 500
//! bundlesize = 25
//! nsubbundles = 5
//! nwavestep = 50
//! wavepad = 10
//! solver = "host"
//! model = false
//! regularize = 0.0
//!
//! [accel]
//! requested = false
//! visible_devices = 0
//! ```

use crate::ExtractError;
use solver_api::{BatchedSolver, HostSolver, OpticsModel, PatchSolver};
use std::path::Path;
use topology::{AcceleratorConfig, DeviceBinding};

/// Configuration for one frame extraction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExtractionConfig {
    /// Wavelength range to extract as `"wmin,wmax,dw"`; defaults to the
    /// optics model's coverage with the instrument's native step.
    pub wavelength: Option<String>,
    /// Index of the first spectrum to extract (must start a bundle).
    pub specmin: usize,
    /// Number of spectra to extract.
    pub nspec: usize,
    /// Spectra per bundle.
    #[serde(default = "default_bundlesize")]
    pub bundlesize: usize,
    /// Sub-bundles per bundle (spectrum-axis split of each patch).
    #[serde(default = "default_nsubbundles")]
    pub nsubbundles: usize,
    /// Wavelength bins per patch.
    #[serde(default = "default_nwavestep")]
    pub nwavestep: usize,
    /// Wavelength padding bins carried on each patch edge.
    #[serde(default = "default_wavepad")]
    pub wavepad: usize,
    /// Solver selection: `"host"` or `"batched"`.
    #[serde(default = "default_solver")]
    pub solver: String,
    /// Override for how many workers cooperate per bundle.
    pub ranks_per_bundle: Option<usize>,
    /// Whether to compute the pixel model image.
    #[serde(default)]
    pub model: bool,
    /// Regularization strength for the patch solves.
    #[serde(default)]
    pub regularize: f64,
    /// Outlier-clipping scale (0 disables clipping).
    #[serde(default)]
    pub clip_scale: f64,
    /// Fractional PSF model error; defaults to the value in the optics
    /// model.
    pub psferr: Option<f64>,
    /// Accelerator availability.
    #[serde(default)]
    pub accel: AcceleratorConfig,
}

fn default_bundlesize() -> usize {
    25
}
fn default_nsubbundles() -> usize {
    5
}
fn default_nwavestep() -> usize {
    50
}
fn default_wavepad() -> usize {
    10
}
fn default_solver() -> String {
    "host".into()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            wavelength: None,
            specmin: 0,
            nspec: 500,
            bundlesize: default_bundlesize(),
            nsubbundles: default_nsubbundles(),
            nwavestep: default_nwavestep(),
            wavepad: default_wavepad(),
            solver: default_solver(),
            ranks_per_bundle: None,
            model: false,
            regularize: 0.0,
            clip_scale: 0.0,
            psferr: None,
            accel: AcceleratorConfig::default(),
        }
    }
}

impl ExtractionConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ExtractError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ExtractError> {
        toml::from_str(toml_str)
            .map_err(|e| ExtractError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ExtractError> {
        toml::to_string_pretty(self)
            .map_err(|e| ExtractError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Preflight checks.
    ///
    /// Every violation here is fatal and is reported before any
    /// expensive computation or collective operation; a precondition
    /// failure discovered on only one worker mid-pipeline would deadlock
    /// the others inside a blocking collective.
    pub fn validate(&self, workers: usize) -> Result<(), ExtractError> {
        if self.nsubbundles == 0 {
            return Err(ExtractError::ConfigError("nsubbundles must be at least 1".into()));
        }
        if self.bundlesize % self.nsubbundles != 0 {
            return Err(ExtractError::ConfigError(format!(
                "bundlesize ({}) must be evenly divisible by nsubbundles ({})",
                self.bundlesize, self.nsubbundles
            )));
        }
        if self.nspec % self.bundlesize != 0 {
            return Err(ExtractError::ConfigError(format!(
                "nspec ({}) must be evenly divisible by bundlesize ({})",
                self.nspec, self.bundlesize
            )));
        }
        if self.specmin % self.bundlesize != 0 {
            return Err(ExtractError::ConfigError(format!(
                "specmin ({}) must begin at a bundle boundary",
                self.specmin
            )));
        }
        if self.nwavestep == 0 {
            return Err(ExtractError::ConfigError("nwavestep must be at least 1".into()));
        }
        if self.accel.requested {
            if self.accel.visible_devices == 0 {
                return Err(ExtractError::ConfigError(
                    "accelerators requested but no device is visible".into(),
                ));
            }
            if self.accel.visible_devices > 1 && workers == 1 {
                return Err(ExtractError::ConfigError(format!(
                    "multiple workers are required to run with {} devices",
                    self.accel.visible_devices
                )));
            }
        }
        Ok(())
    }

    /// Parses the wavelength range, falling back to the optics model's
    /// coverage with the instrument's native step.
    pub fn wavelength_range(&self, optics: &OpticsModel) -> Result<(f64, f64, f64), ExtractError> {
        match &self.wavelength {
            None => Ok((optics.wavemin, optics.wavemax, 0.8)),
            Some(spec) => {
                let parts: Vec<&str> = spec.split(',').collect();
                if parts.len() != 3 {
                    return Err(ExtractError::ConfigError(format!(
                        "wavelength '{spec}' must be formatted as 'wmin,wmax,dw'"
                    )));
                }
                let parse = |s: &str| {
                    s.trim().parse::<f64>().map_err(|_| {
                        ExtractError::ConfigError(format!(
                            "wavelength '{spec}' has a non-numeric component '{s}'"
                        ))
                    })
                };
                Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
            }
        }
    }

    /// Creates the solver selected by this configuration.
    ///
    /// The device binding comes from topology planning and is threaded
    /// through explicitly; solvers never read ambient device state.
    pub fn create_solver(
        &self,
        optics: OpticsModel,
        device: Option<DeviceBinding>,
    ) -> Result<Box<dyn PatchSolver>, ExtractError> {
        match self.solver.to_lowercase().as_str() {
            "host" => Ok(Box::new(HostSolver::new(optics))),
            "batched" => Ok(Box::new(BatchedSolver::new(optics, device.map(|d| d.0)))),
            other => Err(ExtractError::ConfigError(format!(
                "unknown solver '{other}'; expected 'host' or 'batched'"
            ))),
        }
    }
}
