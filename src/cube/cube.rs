//! Read-only spectral cube access.
//!
//! Data is stored channel-major (`[channel][row][col]`), matching the usual
//! `(spectral, y, x)` ordering of radio cubes.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::domain::{PixelCoord, SpectralUnit, TrimWindow};
use crate::error::AppError;

/// Cube dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeShape {
    pub nchan: usize,
    pub ny: usize,
    pub nx: usize,
}

impl CubeShape {
    pub fn spatial(&self) -> (usize, usize) {
        (self.ny, self.nx)
    }
}

/// Header metadata needed to describe the spectral axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CubeMeta {
    /// Flux unit (`BUNIT`).
    #[serde(default)]
    pub bunit: Option<String>,
    /// Spectral axis unit, e.g. `km/s`.
    #[serde(default)]
    pub spectral_unit: Option<String>,
    #[serde(default)]
    pub rest_frequency_hz: Option<f64>,
    /// Channel spacing (`CDELT3`) in spectral-axis units; derived from the
    /// axis when absent.
    #[serde(default)]
    pub cdelt3: Option<f64>,
}

/// What the decomposition core needs from a cube.
pub trait CubeSource {
    fn shape(&self) -> CubeShape;

    fn meta(&self) -> &CubeMeta;

    /// Full (untrimmed) spectral axis, in the unit named by the metadata.
    fn spectral_axis(&self) -> &[f64];

    /// Channels retained for fitting.
    fn trim_ids(&self) -> Range<usize>;

    /// Full spectrum of one pixel.
    fn spectrum(&self, coord: PixelCoord) -> Result<Vec<f64>, AppError>;

    /// Channel spacing in spectral-axis units.
    fn channel_spacing(&self) -> f64;

    fn trimmed_axis(&self) -> &[f64] {
        let axis = self.spectral_axis();
        let ids = self.trim_ids();
        axis.get(ids).unwrap_or(&[])
    }
}

/// Serialized form of a cube, validated into a [`DataCube`].
#[derive(Debug, Clone, Deserialize)]
struct RawCube {
    meta: CubeMeta,
    spectral_axis: Vec<f64>,
    shape: CubeShape,
    data: Vec<f64>,
}

/// In-memory cube.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawCube")]
pub struct DataCube {
    meta: CubeMeta,
    spectral_axis: Vec<f64>,
    shape: CubeShape,
    data: Vec<f64>,
    trim: Range<usize>,
}

impl TryFrom<RawCube> for DataCube {
    type Error = AppError;

    fn try_from(raw: RawCube) -> Result<Self, Self::Error> {
        DataCube::new(raw.meta, raw.spectral_axis, raw.shape, raw.data)
    }
}

impl DataCube {
    pub fn new(
        meta: CubeMeta,
        spectral_axis: Vec<f64>,
        shape: CubeShape,
        data: Vec<f64>,
    ) -> Result<Self, AppError> {
        if shape.nchan == 0 || shape.ny == 0 || shape.nx == 0 {
            return Err(AppError::invalid_input(format!(
                "Cube shape must be non-empty, got {}x{}x{}.",
                shape.nchan, shape.ny, shape.nx
            )));
        }
        if spectral_axis.len() != shape.nchan {
            return Err(AppError::invalid_input(format!(
                "Spectral axis has {} channels but the cube has {}.",
                spectral_axis.len(),
                shape.nchan
            )));
        }
        if spectral_axis.iter().any(|v| !v.is_finite()) {
            return Err(AppError::invalid_input("Spectral axis contains non-finite values."));
        }
        let expected = shape.nchan * shape.ny * shape.nx;
        if data.len() != expected {
            return Err(AppError::invalid_input(format!(
                "Cube data has {} values, expected {expected}.",
                data.len()
            )));
        }

        let trim = 0..shape.nchan;
        Ok(Self {
            meta,
            spectral_axis,
            shape,
            data,
            trim,
        })
    }

    /// Restrict fitting to the channels whose velocity lies in `window` (km/s).
    pub fn set_trim(&mut self, window: TrimWindow) -> Result<(), AppError> {
        let to_kms = self
            .meta
            .spectral_unit
            .as_deref()
            .and_then(SpectralUnit::parse)
            .map(SpectralUnit::to_kms)
            .unwrap_or(1.0);

        let inside: Vec<usize> = self
            .spectral_axis
            .iter()
            .enumerate()
            .filter(|(_, v)| {
                let v = **v * to_kms;
                v >= window.vmin && v <= window.vmax
            })
            .map(|(i, _)| i)
            .collect();

        let (Some(&first), Some(&last)) = (inside.first(), inside.last()) else {
            return Err(AppError::invalid_input(format!(
                "No channels fall inside the spectral window [{}, {}] km/s.",
                window.vmin, window.vmax
            )));
        };
        self.trim = first..last + 1;
        Ok(())
    }
}

impl CubeSource for DataCube {
    fn shape(&self) -> CubeShape {
        self.shape
    }

    fn meta(&self) -> &CubeMeta {
        &self.meta
    }

    fn spectral_axis(&self) -> &[f64] {
        &self.spectral_axis
    }

    fn trim_ids(&self) -> Range<usize> {
        self.trim.clone()
    }

    fn spectrum(&self, coord: PixelCoord) -> Result<Vec<f64>, AppError> {
        let CubeShape { nchan, ny, nx } = self.shape;
        if coord.x >= nx || coord.y >= ny {
            return Err(AppError::invalid_input(format!(
                "Pixel (x={}, y={}) lies outside the {ny}x{nx} spatial grid.",
                coord.x, coord.y
            )));
        }
        let plane = ny * nx;
        let offset = coord.y * nx + coord.x;
        Ok((0..nchan).map(|c| self.data[c * plane + offset]).collect())
    }

    fn channel_spacing(&self) -> f64 {
        match self.meta.cdelt3 {
            Some(d) => d,
            None if self.spectral_axis.len() > 1 => self.spectral_axis[1] - self.spectral_axis[0],
            None => 0.0,
        }
    }
}
