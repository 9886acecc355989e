// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared CLI plumbing.

pub mod check;
pub mod plan;
pub mod run;

use extraction::ExtractionConfig;
use patch_planner::WavelengthGrid;
use solver_api::OpticsModel;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber from the `-v` count.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ExtractionConfig> {
    match path {
        Some(p) => {
            let config = ExtractionConfig::from_file(p)?;
            tracing::info!("loaded config from {}", p.display());
            Ok(config)
        }
        None => Ok(ExtractionConfig::default()),
    }
}

/// Default wavelength range for the synthetic demo frame.
const DEMO_WAVELENGTH: &str = "0,99,1.0";

fn parse_wavelength(spec: &str) -> anyhow::Result<(f64, f64, f64)> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("wavelength '{spec}' must be formatted as 'wmin,wmax,dw'");
    }
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("wavelength '{spec}' has a non-numeric component '{s}'"))
    };
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

/// Builds the wavelength grid and a synthetic optics model sized so
/// every requested spectrum and padded wavelength bin lands on the
/// detector.
pub(crate) fn demo_setup(
    config: &mut ExtractionConfig,
) -> anyhow::Result<(OpticsModel, WavelengthGrid)> {
    if config.wavelength.is_none() {
        config.wavelength = Some(DEMO_WAVELENGTH.to_string());
    }
    let (wmin, wmax, dw) = parse_wavelength(config.wavelength.as_deref().unwrap())?;
    let grid = WavelengthGrid::new(wmin, wmax, dw, config.wavepad, config.nwavestep)?;

    let mut optics = OpticsModel::synthetic(config.specmin + config.nspec, grid.fullwave().len());
    optics.wavemin = wmin;
    optics.wavemax = wmax;
    Ok((optics, grid))
}
