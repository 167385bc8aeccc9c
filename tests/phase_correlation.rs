use braggdisk::lowlevel::{locate_peak, phase_correlate, prime_image, FilterBank, FrequencyFilter};
use braggdisk::{FilterConfig, Image, Registrar, RegistrationConfig, SpectralContext};

const SIZE: usize = 96;

fn disk_frame(centers: &[(f64, f64)], radius: f64) -> Image<f32> {
    Image::from_fn(SIZE, SIZE, |x, y| {
        let mut value = 0.0f32;
        for &(cx, cy) in centers {
            let mut hits = 0u32;
            for sy in 0..4 {
                for sx in 0..4 {
                    let px = x as f64 + (sx as f64 + 0.5) / 4.0 - 0.5 - cx;
                    let py = y as f64 + (sy as f64 + 0.5) / 4.0 - 0.5 - cy;
                    if px * px + py * py <= radius * radius {
                        hits += 1;
                    }
                }
            }
            value += hits as f32 / 16.0;
        }
        value
    })
    .unwrap()
}

fn pattern(dx: f64, dy: f64) -> Image<f32> {
    let base = [(40.0, 38.0), (58.0, 44.0), (47.0, 60.0)];
    let centers: Vec<(f64, f64)> = base.iter().map(|&(x, y)| (x + dx, y + dy)).collect();
    disk_frame(&centers, 5.0)
}

fn filter_config() -> FilterConfig {
    FilterConfig {
        radius: 5.0,
        ..FilterConfig::default()
    }
}

#[test]
fn recovers_shift_across_the_wrap() {
    let ctx = SpectralContext::new(SIZE, SIZE).unwrap();
    let bank = FilterBank::new(&ctx, &filter_config()).unwrap();
    let a = prime_image(&ctx, &bank, &pattern(0.0, 0.0), None, 0).unwrap();
    let b = prime_image(&ctx, &bank, &pattern(-7.0, 5.0), None, 1).unwrap();
    let lowpass = FrequencyFilter::gaussian(SIZE, SIZE, 2.0).unwrap();

    let rp = phase_correlate(&ctx, &a, &b, &lowpass, 1e-4, false)
        .unwrap()
        .unwrap();
    assert_eq!((rp.dx, rp.dy), (-7.0, 5.0));
    assert!(rp.confidence > 0.5, "confidence {}", rp.confidence);
    assert_eq!((rp.index_a, rp.index_b), (0, 1));

    let back = phase_correlate(&ctx, &b, &a, &lowpass, 1e-4, false)
        .unwrap()
        .unwrap();
    assert_eq!((back.dx, back.dy), (7.0, -5.0));
}

#[test]
fn self_correlation_peaks_at_zero_with_unit_confidence() {
    let ctx = SpectralContext::new(SIZE, SIZE).unwrap();
    let bank = FilterBank::new(&ctx, &filter_config()).unwrap();
    let a = prime_image(&ctx, &bank, &pattern(0.0, 0.0), None, 0).unwrap();
    let lowpass = FrequencyFilter::gaussian(SIZE, SIZE, 2.0).unwrap();

    let rp = phase_correlate(&ctx, &a, &a, &lowpass, 1e-4, true)
        .unwrap()
        .unwrap();
    assert!(rp.dx.abs() < 1e-3 && rp.dy.abs() < 1e-3, "{rp:?}");
    assert!(rp.confidence > 0.9, "confidence {}", rp.confidence);
}

#[test]
fn registrar_reports_offsets_of_each_image() {
    let images = vec![pattern(0.0, 0.0), pattern(3.0, -2.0), pattern(-4.0, 6.0)];
    let ctx = SpectralContext::new(SIZE, SIZE).unwrap();
    let registrar = Registrar::new(
        &ctx,
        RegistrationConfig {
            filter: filter_config(),
            ..RegistrationConfig::default()
        },
    )
    .unwrap();

    let registration = registrar.register(&images).unwrap();
    assert!(registration.rejected.is_empty());
    assert_eq!(registration.pairs.len(), 3);
    let expected = [(0.0, 0.0), (3.0, -2.0), (-4.0, 6.0)];
    for (i, &(ex, ey)) in expected.iter().enumerate() {
        let offset = registration.positions.get(i).unwrap();
        assert!((offset.dx - ex).abs() < 1e-6, "image {i}: {offset:?}");
        assert!((offset.dy - ey).abs() < 1e-6, "image {i}: {offset:?}");
    }
    assert!(registration.positions.residual() < 1e-9);
}

#[test]
fn ties_resolve_towards_zero_displacement() {
    let mut surface = Image::filled(32, 32, 0.0f32).unwrap();
    *surface.get_mut(10, 10).unwrap() = 1.0;
    *surface.get_mut(31, 1).unwrap() = 0.99995;
    *surface.get_mut(20, 20).unwrap() = 0.5;

    let peak = locate_peak(&surface, 1e-4).unwrap();
    assert_eq!((peak.x, peak.y), (31, 1));

    let strict = locate_peak(&surface, 0.0).unwrap();
    assert_eq!((strict.x, strict.y), (10, 10));
    assert_eq!(strict.value, 1.0);
}

#[test]
fn surface_without_finite_values_has_no_peak() {
    let surface = Image::filled(8, 8, f32::NAN).unwrap();
    assert!(locate_peak(&surface, 1e-4).is_none());
}
