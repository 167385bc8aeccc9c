#![cfg(feature = "rayon")]

use braggdisk::{Image, Pipeline, PipelineConfig, SymmetryConfig};

fn lattice_frame(shift: (f64, f64)) -> Image<f32> {
    let mut centers = Vec::new();
    for j in 0..3 {
        for i in 0..3 {
            centers.push((
                30.0 + 22.0 * i as f64 - 3.0 * j as f64 + shift.0,
                28.0 + 4.0 * i as f64 + 21.0 * j as f64 + shift.1,
            ));
        }
    }
    Image::from_fn(112, 104, |x, y| {
        centers
            .iter()
            .map(|&(cx, cy)| {
                let d = (x as f64 - cx).hypot(y as f64 - cy);
                (5.5 - d).clamp(0.0, 1.0) as f32
            })
            .sum()
    })
    .unwrap()
}

#[test]
fn parallel_pipeline_matches_sequential() {
    let images: Vec<Image<f32>> = [(0.0, 0.0), (2.0, 1.0), (-3.0, 2.0), (1.0, -2.0)]
        .iter()
        .map(|&s| lattice_frame(s))
        .collect();
    let cfg = PipelineConfig {
        symmetry: Some(SymmetryConfig {
            target_size: 32,
            angle_steps: 36,
            ..SymmetryConfig::default()
        }),
        spot_map_radius: Some(6),
        ..PipelineConfig::default()
    };

    let sequential = Pipeline::new(cfg.clone().parallel(false)).run(&images).unwrap();
    let parallel = Pipeline::new(cfg.parallel(true)).run(&images).unwrap();

    assert_eq!(sequential.registration.pairs, parallel.registration.pairs);
    assert_eq!(sequential.registration.rejected, parallel.registration.rejected);
    assert_eq!(
        sequential.registration.positions,
        parallel.registration.positions
    );
    assert_eq!(sequential.accumulator, parallel.accumulator);
    assert_eq!(sequential.detection.cut, parallel.detection.cut);
    assert_eq!(sequential.detection.spots, parallel.detection.spots);
    // non-ellipse fits carry NaN fields, so compare their debug form
    assert_eq!(
        format!("{:?}", sequential.accumulator_ellipses),
        format!("{:?}", parallel.accumulator_ellipses)
    );
    assert_eq!(sequential.image_ellipses.len(), parallel.image_ellipses.len());
    for (a, b) in sequential.image_ellipses.iter().zip(&parallel.image_ellipses) {
        assert_eq!(a.image, b.image);
        assert_eq!(format!("{:?}", a.spots), format!("{:?}", b.spots));
    }
    let (sa, pa) = (
        sequential.symmetry.as_ref().unwrap(),
        parallel.symmetry.as_ref().unwrap(),
    );
    assert_eq!(sa.axes, pa.axes);
    assert_eq!(sequential.spot_maps.len(), parallel.spot_maps.len());
    for (a, b) in sequential.spot_maps.iter().zip(&parallel.spot_maps) {
        assert_eq!(a.map, b.map);
    }
}
