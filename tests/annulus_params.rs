use braggdisk::lowlevel::{radius_upper_bound, refine_annulus_params};
use braggdisk::{AnnulusSearch, Image, RadiusBoundConfig, SpectralContext};

const PERIOD: usize = 16;
const DISK: f64 = 4.0;

fn disk_lattice(size: usize, shift: (usize, usize)) -> Image<f32> {
    Image::from_fn(size, size, |x, y| {
        let dx = ((x + shift.0) % PERIOD) as f64 - 8.0;
        let dy = ((y + shift.1) % PERIOD) as f64 - 8.0;
        if dx * dx + dy * dy <= DISK * DISK {
            1.0f32
        } else {
            0.0
        }
    })
    .unwrap()
}

/// Disk of radius `radius` centred in a `size` square whose edge falls off
/// over `softness` pixels (zero for a supersampled sharp edge).
fn soft_disk(size: usize, radius: f64, softness: f64) -> Image<f32> {
    let c = size as f64 / 2.0;
    Image::from_fn(size, size, |x, y| {
        if softness > 0.0 {
            let d = (x as f64 - c).hypot(y as f64 - c);
            return (1.0 / (1.0 + ((d - radius) / softness).exp())) as f32;
        }
        let mut hits = 0u32;
        for sy in 0..4 {
            for sx in 0..4 {
                let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5 - c;
                let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5 - c;
                if px * px + py * py <= radius * radius {
                    hits += 1;
                }
            }
        }
        hits as f32 / 16.0
    })
    .unwrap()
}

#[test]
fn radius_bound_is_half_the_spot_spacing() {
    let images = vec![disk_lattice(128, (0, 0))];
    let ctx = SpectralContext::new(128, 128).unwrap();
    let cfg = RadiusBoundConfig {
        min_radius: 2,
        ..RadiusBoundConfig::default()
    };
    let bound = radius_upper_bound(&ctx, &images, &cfg).unwrap();
    assert!(bound >= DISK, "bound {bound}");
    assert!((bound - PERIOD as f64 / 2.0).abs() < 1.0, "bound {bound}");
}

#[test]
fn radius_bound_folds_in_shifted_frames() {
    let images: Vec<Image<f32>> = [(0, 0), (3, 5), (11, 2), (7, 7)]
        .iter()
        .map(|&s| disk_lattice(128, s))
        .collect();
    let ctx = SpectralContext::new(128, 128).unwrap();
    let cfg = RadiusBoundConfig {
        min_radius: 2,
        max_images: 3,
        ..RadiusBoundConfig::default()
    };
    let bound = radius_upper_bound(&ctx, &images, &cfg).unwrap();
    assert!((bound - PERIOD as f64 / 2.0).abs() < 1.0, "bound {bound}");
}

#[test]
fn radius_bound_needs_a_repeat() {
    let ctx = SpectralContext::new(64, 64).unwrap();
    let lone = vec![soft_disk(64, 6.0, 0.0)];
    assert!(radius_upper_bound(&ctx, &lone, &RadiusBoundConfig::default()).is_err());
    assert!(radius_upper_bound(&ctx, &[], &RadiusBoundConfig::default()).is_err());
    let wide = RadiusBoundConfig {
        min_radius: 20,
        ..RadiusBoundConfig::default()
    };
    assert!(radius_upper_bound(&ctx, &lone, &wide).is_err());
}

#[test]
fn annulus_refinement_matches_a_sharp_edge() {
    let ctx = SpectralContext::new(64, 64).unwrap();
    let image = soft_disk(64, 6.0, 0.0);
    let params = refine_annulus_params(&ctx, &image, 5.0, &AnnulusSearch::default()).unwrap();
    assert!((params.radius - 6.0).abs() < 0.75, "{params:?}");
    assert!(params.thickness >= 1.0 && params.thickness <= 4.0, "{params:?}");
}

#[test]
fn soft_edges_widen_the_annulus() {
    let ctx = SpectralContext::new(64, 64).unwrap();
    let search = AnnulusSearch {
        range: 2,
        max_thickness: 9,
    };
    let sharp = refine_annulus_params(&ctx, &soft_disk(64, 6.0, 0.0), 6.0, &search).unwrap();
    let soft = refine_annulus_params(&ctx, &soft_disk(64, 6.0, 1.5), 6.0, &search).unwrap();
    assert!(soft.thickness > sharp.thickness + 1.0, "{sharp:?} vs {soft:?}");
    assert!((soft.radius - 6.0).abs() < 1.0, "{soft:?}");
}

#[test]
fn annulus_refinement_rejects_bad_input() {
    let ctx = SpectralContext::new(32, 32).unwrap();
    let image = soft_disk(32, 5.0, 0.0);
    assert!(refine_annulus_params(&ctx, &image, 0.2, &AnnulusSearch::default()).is_err());
    let none = AnnulusSearch {
        range: 1,
        max_thickness: 0,
    };
    assert!(refine_annulus_params(&ctx, &image, 5.0, &none).is_err());
}
