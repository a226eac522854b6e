//! Run input loading.
//!
//! A run input is one JSON document holding the cube and the averaging-region
//! hierarchy (coarse to fine) with each region's seed model:
//!
//! ```json
//! {
//!   "cube": { "meta": {...}, "spectral_axis": [...], "shape": {...}, "data": [...] },
//!   "regions": [ { "width": 4, "regions": [ { "index": 0, "indices": [[0, 0]], "to_be_fit": true, "model": {...} } ] } ]
//! }
//! ```
//!
//! Seed parameters are in km/s, matching the spectral template.
//!
//! Structural checks happen here so that a bad file fails before any fitting
//! starts.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::cube::{CubeSource, DataCube};
use crate::domain::{FitKind, RegionContainer};
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct RunInput {
    pub cube: DataCube,
    pub regions: Vec<RegionContainer>,
}

impl RunInput {
    /// Check region membership and seed models against the cube.
    pub fn validate(&self, kind: FitKind) -> Result<(), AppError> {
        let spatial = self.cube.shape().spatial();
        let npc = kind.params_per_component();

        for (c, container) in self.regions.iter().enumerate() {
            for region in &container.regions {
                region.indices_flat(spatial).map_err(|e| {
                    AppError::invalid_input(format!("Region {} of container {c}: {}", region.index, e.message()))
                })?;

                if !region.to_be_fit {
                    continue;
                }
                let Some(model) = region.model() else {
                    return Err(AppError::invalid_input(format!(
                        "Region {} of container {c} is flagged for fitting but has no model.",
                        region.index
                    )));
                };
                if model.kind != kind {
                    return Err(AppError::invalid_input(format!(
                        "Region {} of container {c} was seeded with a {} model; this run fits {}.",
                        region.index,
                        model.kind.display_name(),
                        kind.display_name()
                    )));
                }
                if model.params.is_empty() || model.params.len() % npc != 0 {
                    return Err(AppError::invalid_input(format!(
                        "Region {} of container {c} has {} seed parameters; expected a non-zero multiple of {npc}.",
                        region.index,
                        model.params.len()
                    )));
                }
                if model.params.iter().any(|v| !v.is_finite()) {
                    return Err(AppError::invalid_input(format!(
                        "Region {} of container {c} has non-finite seed parameters.",
                        region.index
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Read and validate a run input file.
pub fn load_run_input(path: &Path, kind: FitKind) -> Result<RunInput, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::invalid_input(format!("Failed to open run input '{}': {e}", path.display())))?;
    let input: RunInput = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::invalid_input(format!("Invalid run input JSON '{}': {e}", path.display())))?;
    input.validate(kind)?;
    Ok(input)
}
