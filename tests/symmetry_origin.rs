use braggdisk::lowlevel::{
    average_intersection, mirror_score, periodic_symmetry_axes, refine_mirror_lines,
    symmetry_axes, top_symmetry_axes,
};
use braggdisk::{Image, MirrorLine, SymmetryConfig};
use std::f64::consts::{FRAC_PI_4, PI};

const CENTER: (f64, f64) = (43.0, 38.0);

fn cross_pattern() -> Image<f32> {
    let (cx, cy) = CENTER;
    let disks = [
        (cx, cy),
        (cx + 14.0, cy),
        (cx - 14.0, cy),
        (cx, cy + 14.0),
        (cx, cy - 14.0),
    ];
    Image::from_fn(80, 80, |x, y| {
        disks
            .iter()
            .map(|&(dx, dy)| {
                let d = (x as f64 - dx).hypot(y as f64 - dy);
                (4.5 - d).clamp(0.0, 1.0) as f32
            })
            .sum()
    })
    .unwrap()
}

fn config() -> SymmetryConfig {
    SymmetryConfig {
        target_size: 32,
        ..SymmetryConfig::default()
    }
}

#[test]
fn mirror_axes_meet_at_the_pattern_center() {
    let image = cross_pattern();
    let cfg = config();

    let axes = symmetry_axes(&image, &cfg).unwrap();
    assert_eq!(axes.len(), cfg.angle_steps);
    let top = top_symmetry_axes(&axes, cfg.top, cfg.min_separation);
    assert_eq!(top.len(), 4);
    for line in &top {
        let nearest = (0..4)
            .map(|k| {
                let d = (line.angle - k as f64 * FRAC_PI_4).rem_euclid(PI);
                d.min(PI - d)
            })
            .fold(f64::INFINITY, f64::min);
        assert!(nearest < 2f64.to_radians(), "{line:?}");
    }

    let refined = refine_mirror_lines(&image, &top, &cfg);
    assert!(refined.iter().all(|l| l.score > 0.9), "{refined:?}");
    let origin = average_intersection(&refined).unwrap();
    assert!((origin[0] - CENTER.0).abs() < 1.5, "{origin:?}");
    assert!((origin[1] - CENTER.1).abs() < 1.5, "{origin:?}");
}

#[test]
fn periodic_selection_finds_the_four_mirrors() {
    let image = cross_pattern();
    let cfg = config();
    let axes = symmetry_axes(&image, &cfg).unwrap();
    let picked = periodic_symmetry_axes(&axes, cfg.angle_steps, &[2, 3, 4, 6]);
    assert_eq!(picked.len(), 4, "{picked:?}");
    for k in 0..4 {
        let target = k as f64 * FRAC_PI_4;
        let hit = picked.iter().any(|line| {
            let d = (line.angle - target).rem_euclid(PI);
            d.min(PI - d) < 3f64.to_radians()
        });
        assert!(hit, "no axis near {target}: {picked:?}");
    }
    let origin = average_intersection(&refine_mirror_lines(&image, &picked, &cfg)).unwrap();
    assert!((origin[0] - CENTER.0).abs() < 1.5, "{origin:?}");
    assert!((origin[1] - CENTER.1).abs() < 1.5, "{origin:?}");
}

#[test]
fn true_axis_outscores_a_shifted_one() {
    let image = cross_pattern();
    let exact = MirrorLine {
        point: [CENTER.0, CENTER.1],
        angle: 0.0,
        score: 0.0,
    };
    let shifted = MirrorLine {
        point: [CENTER.0, CENTER.1 + 3.0],
        ..exact
    };
    let a = mirror_score(&image, &exact, 0.25).unwrap();
    let b = mirror_score(&image, &shifted, 0.25).unwrap();
    assert!(a > 0.99, "{a}");
    assert!(a > b);
}

#[test]
fn flat_image_has_no_score() {
    let image = Image::filled(16, 16, 1.0f32).unwrap();
    let line = MirrorLine {
        point: [8.0, 8.0],
        angle: 0.3,
        score: 0.0,
    };
    assert!(mirror_score(&image, &line, 0.25).is_none());
}
