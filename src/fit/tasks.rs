//! Individual-spectrum task generation.
//!
//! Every averaging region flagged for fitting contributes one task per member
//! pixel, seeded with the region's own fitted parameters. A pixel covered by
//! regions at several scales therefore yields several tasks; the compiler
//! reconciles them later.
//!
//! Order is containers first, then regions within a container, then pixels
//! within a region. Provenance lists downstream inherit this order.

use std::sync::Arc;

use crate::cube::{CubeSource, estimate_rms};
use crate::domain::{
    DecompositionConfig, Provenance, RegionContainer, SpectralTemplate, SpectrumTask, TaskState,
};
use crate::error::AppError;
use crate::report::{ProgressEvent, ProgressSink};

/// Create one `SpectrumTask` per (pixel, region) pair marked for fitting.
pub fn initialise_fitting<C: CubeSource + ?Sized>(
    cube: &C,
    hierarchy: &[RegionContainer],
    template: Arc<SpectralTemplate>,
    config: &DecompositionConfig,
    progress: &dyn ProgressSink,
) -> Result<Vec<SpectrumTask>, AppError> {
    let shape = cube.shape();
    let n_regions = hierarchy.iter().map(|c| c.regions.len()).sum();
    progress.notify(&ProgressEvent::GenerationStarted { regions: n_regions });

    let mut tasks = Vec::new();

    for (container_idx, container) in hierarchy.iter().enumerate() {
        for region in container.regions.iter().filter(|r| r.to_be_fit) {
            let model = region.model().ok_or_else(|| {
                AppError::invalid_input(format!(
                    "Averaging region {} (container {container_idx}) is flagged for fitting but has no model.",
                    region.index
                ))
            })?;

            let flat = region.indices_flat(shape.spatial())?;
            for (index, coordinates) in flat.into_iter().zip(region.coordinates()) {
                let spectrum = cube.spectrum(coordinates)?;
                let rms = estimate_rms(&spectrum, config.rms_approx);

                tasks.push(SpectrumTask {
                    index,
                    coordinates,
                    spectrum,
                    rms,
                    provenance: Provenance {
                        container: container_idx,
                        region: region.index,
                    },
                    guesses_from_parent: model.params.clone(),
                    guesses_updated: None,
                    template: Some(Arc::clone(&template)),
                    model: None,
                    state: TaskState::Pending,
                });
                progress.notify(&ProgressEvent::TaskGenerated { total: tasks.len() });
            }
        }
    }

    progress.notify(&ProgressEvent::GenerationFinished { tasks: tasks.len() });
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{CubeMeta, CubeShape, DataCube};
    use crate::domain::{AveragingRegion, FitKind, FitResult, PixelCoord};
    use crate::fit::template::gen_template;
    use crate::report::NoProgress;
    use crate::report::progress::testing::RecordingProgress;

    fn cube(nx: usize, ny: usize) -> DataCube {
        let nchan = 8;
        let data: Vec<f64> = (0..nchan * ny * nx).map(|i| (i % 5) as f64 - 2.0).collect();
        let meta = CubeMeta {
            spectral_unit: Some("km/s".to_string()),
            rest_frequency_hz: Some(1.0e11),
            ..CubeMeta::default()
        };
        let axis: Vec<f64> = (0..nchan).map(|i| i as f64).collect();
        DataCube::new(meta, axis, CubeShape { nchan, ny, nx }, data).unwrap()
    }

    fn seed(params: Vec<f64>) -> FitResult {
        FitResult {
            kind: FitKind::Gaussian,
            ncomps: params.len() / 3,
            errors: vec![0.0; params.len()],
            params,
            aic: 10.0,
            chisq: 0.0,
            redchisq: 0.0,
            rms: 0.1,
            residual_rms: 0.1,
        }
    }

    fn region(index: usize, indices: Vec<[usize; 2]>, to_be_fit: bool, params: Vec<f64>) -> AveragingRegion {
        let mut r = AveragingRegion::new(index, indices, to_be_fit);
        r.set_model(seed(params)).unwrap();
        r
    }

    #[test]
    fn one_task_per_pixel_and_region_in_stable_order() {
        let cube = cube(4, 4);
        let template = Arc::new(gen_template(&cube).unwrap());
        let hierarchy = vec![
            RegionContainer {
                width: 2,
                regions: vec![
                    region(0, vec![[0, 0], [0, 1], [1, 1]], true, vec![1.0, 3.0, 1.0]),
                    region(1, vec![[3, 3]], false, vec![9.0, 9.0, 9.0]),
                ],
            },
            RegionContainer {
                width: 1,
                regions: vec![region(5, vec![[1, 1]], true, vec![2.0, 4.0, 0.5])],
            },
        ];

        let tasks = initialise_fitting(&cube, &hierarchy, template.clone(), &DecompositionConfig::default(), &NoProgress).unwrap();

        let summary: Vec<(usize, usize, usize)> = tasks
            .iter()
            .map(|t| (t.index, t.provenance.container, t.provenance.region))
            .collect();
        assert_eq!(summary, vec![(0, 0, 0), (1, 0, 0), (5, 0, 0), (5, 1, 5)]);

        assert_eq!(tasks[1].coordinates, PixelCoord { x: 1, y: 0 });
        assert_eq!(tasks[3].guesses_from_parent, vec![2.0, 4.0, 0.5]);
        assert!(tasks.iter().all(|t| t.state == TaskState::Pending));
        assert!(tasks.iter().all(|t| t.guesses_updated.is_none()));
        assert!(tasks.iter().all(|t| t.spectrum.len() == 8 && t.rms > 0.0));
        // One shared template plus the local handle.
        assert_eq!(Arc::strong_count(&template), tasks.len() + 1);
    }

    #[test]
    fn region_without_model_is_rejected() {
        let cube = cube(2, 2);
        let template = Arc::new(gen_template(&cube).unwrap());
        let hierarchy = vec![RegionContainer {
            width: 2,
            regions: vec![AveragingRegion::new(0, vec![[0, 0]], true)],
        }];
        let err = initialise_fitting(&cube, &hierarchy, template, &DecompositionConfig::default(), &NoProgress).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn reports_generation_milestones() {
        let cube = cube(2, 2);
        let template = Arc::new(gen_template(&cube).unwrap());
        let hierarchy = vec![RegionContainer {
            width: 2,
            regions: vec![region(0, vec![[0, 0], [1, 1]], true, vec![1.0, 3.0, 1.0])],
        }];
        let progress = RecordingProgress::default();
        initialise_fitting(&cube, &hierarchy, template, &DecompositionConfig::default(), &progress).unwrap();

        let events = progress.take();
        assert_eq!(events.first(), Some(&ProgressEvent::GenerationStarted { regions: 1 }));
        assert_eq!(events.last(), Some(&ProgressEvent::GenerationFinished { tasks: 2 }));
    }
}
