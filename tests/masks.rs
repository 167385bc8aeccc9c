use braggdisk::lowlevel::{blacken_circle, circular_mask};
use braggdisk::{annular_mask, extract_masked_region, hann_window, BraggError, Image};
use std::f64::consts::PI;

#[test]
fn annular_mask_is_invariant_under_quarter_turns() {
    for &(size, inner, outer) in &[(21usize, 3.0, 7.5), (41, 8.0, 16.0), (33, 0.0, 11.2)] {
        let mask = annular_mask(size, inner, outer).unwrap();
        for y in 0..size {
            for x in 0..size {
                let rotated = mask.is_set(size - 1 - y, x);
                assert_eq!(mask.is_set(x, y), rotated, "size {size} at ({x}, {y})");
            }
        }
    }
}

#[test]
fn annular_mask_area_scales_with_radius() {
    let small = annular_mask(41, 8.0, 16.0).unwrap();
    let large = annular_mask(81, 16.0, 32.0).unwrap();

    let expected = PI * (16.0 * 16.0 - 8.0 * 8.0);
    let area = small.count_set() as f64;
    assert!((area / expected - 1.0).abs() < 0.05, "area {area} vs {expected}");

    let ratio = large.count_set() as f64 / area;
    assert!((ratio - 4.0).abs() < 4.0 * 0.05, "ratio {ratio}");
}

#[test]
fn annular_mask_rejects_bad_geometry() {
    assert!(matches!(
        annular_mask(10, 1.0, 3.0),
        Err(BraggError::InvalidInput { .. })
    ));
    assert!(matches!(
        annular_mask(11, 4.0, 3.0),
        Err(BraggError::InvalidInput { .. })
    ));
}

#[test]
fn masked_extraction_clips_at_the_border() {
    let image = Image::from_fn(16, 16, |x, y| (y * 16 + x) as f32).unwrap();
    let mask = circular_mask(5, 2.0).unwrap();

    let inside = extract_masked_region(&image, &mask, (4, 4)).unwrap();
    assert_eq!(inside.len(), mask.count_set());
    for (p, v) in inside.points.iter().zip(inside.values()) {
        assert_eq!(*v, (p[1] * 16.0 + p[0]) as f32);
    }

    let corner = extract_masked_region(&image, &mask, (-2, -2)).unwrap();
    assert!(corner.len() < mask.count_set());
    assert!(corner.points.iter().all(|p| p[0] >= 0.0 && p[1] >= 0.0));

    assert_eq!(
        extract_masked_region(&image, &mask, (40, 3)).err().unwrap(),
        BraggError::RegionEmpty { x: 40, y: 3 }
    );
}

#[test]
fn blackened_circle_only_touches_its_disc() {
    let mut image = Image::filled(20, 20, 1.0f32).unwrap();
    blacken_circle(&mut image, 5.0, 6.0, 3.0);
    for y in 0..20 {
        for x in 0..20 {
            let inside = (x as f64 - 5.0).hypot(y as f64 - 6.0) <= 3.0;
            let expected = if inside { 0.0 } else { 1.0 };
            assert_eq!(*image.get(x, y).unwrap(), expected, "({x}, {y})");
        }
    }

    blacken_circle(&mut image, -50.0, -50.0, 3.0);
    blacken_circle(&mut image, 100.0, 5.0, 3.0);
}

#[test]
fn hann_window_is_separable() {
    let win = hann_window(9, 5).unwrap();
    let wx = *win.get(2, 2).unwrap();
    let wy = *win.get(4, 1).unwrap();
    assert!((win.get(2, 1).unwrap() - wx * wy).abs() < 1e-6);
}
