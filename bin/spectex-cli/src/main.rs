// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # spectex
//!
//! Command-line interface for the spectex extraction pipeline.
//!
//! ## Usage
//! ```bash
//! # Extract a synthetic demo frame with 4 in-process workers
//! spectex run --nspec 50 --workers 4 --model
//!
//! # Preview the patch partition and worker topology for a config
//! spectex plan --config extract.toml --workers 8
//!
//! # Preflight-check a configuration
//! spectex check --config extract.toml --workers 8
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "spectex",
    about = "Divide-and-conquer spectral extraction pipeline",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (CLI arguments override it).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a synthetic demo frame and print a summary.
    Run {
        /// First spectrum to extract (must start a bundle).
        #[arg(short = 's', long)]
        specmin: Option<usize>,

        /// Number of spectra to extract.
        #[arg(short = 'n', long)]
        nspec: Option<usize>,

        /// Spectra per bundle.
        #[arg(long)]
        bundlesize: Option<usize>,

        /// Sub-bundles per extraction patch group.
        #[arg(long)]
        nsubbundles: Option<usize>,

        /// Wavelength bins per divide-and-conquer step.
        #[arg(long)]
        nwavestep: Option<usize>,

        /// Wavelength range as "wmin,wmax,dw".
        #[arg(short = 'w', long)]
        wavelength: Option<String>,

        /// Solver selection: host or batched.
        #[arg(long)]
        solver: Option<String>,

        /// Number of in-process workers.
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Workers cooperating per bundle.
        #[arg(long)]
        ranks_per_bundle: Option<usize>,

        /// Also compute the 2D pixel model image.
        #[arg(short = 'm', long)]
        model: bool,

        /// Regularization amount.
        #[arg(short = 'r', long)]
        regularize: Option<f64>,

        /// Fractional PSF model error override.
        #[arg(long)]
        psferr: Option<f64>,
    },

    /// Print the patch partition and worker topology without extracting.
    Plan {
        /// Number of workers to plan for.
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Workers cooperating per bundle.
        #[arg(long)]
        ranks_per_bundle: Option<usize>,
    },

    /// Run the preflight checks on a configuration.
    Check {
        /// Number of workers to check against.
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            specmin,
            nspec,
            bundlesize,
            nsubbundles,
            nwavestep,
            wavelength,
            solver,
            workers,
            ranks_per_bundle,
            model,
            regularize,
            psferr,
        } => {
            let mut config = config;
            if let Some(v) = specmin {
                config.specmin = v;
            }
            if let Some(v) = nspec {
                config.nspec = v;
            }
            if let Some(v) = bundlesize {
                config.bundlesize = v;
            }
            if let Some(v) = nsubbundles {
                config.nsubbundles = v;
            }
            if let Some(v) = nwavestep {
                config.nwavestep = v;
            }
            if wavelength.is_some() {
                config.wavelength = wavelength;
            }
            if let Some(v) = solver {
                config.solver = v;
            }
            if ranks_per_bundle.is_some() {
                config.ranks_per_bundle = ranks_per_bundle;
            }
            if model {
                config.model = true;
            }
            if let Some(v) = regularize {
                config.regularize = v;
            }
            if psferr.is_some() {
                config.psferr = psferr;
            }
            commands::run::execute(config, workers)
        }
        Commands::Plan {
            workers,
            ranks_per_bundle,
        } => {
            let mut config = config;
            if ranks_per_bundle.is_some() {
                config.ranks_per_bundle = ranks_per_bundle;
            }
            commands::plan::execute(config, workers)
        }
        Commands::Check { workers } => commands::check::execute(config, workers),
    }
}
