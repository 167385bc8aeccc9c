use braggdisk::lowlevel::{align_and_average, refine_positions};
use braggdisk::{AlignedAccumulator, BraggError, Image, RelativePosition};

const OFFSETS: [(f64, f64); 5] = [(0.0, 0.0), (3.0, -2.0), (-4.0, 1.0), (2.0, 5.0), (-1.0, -3.0)];

fn pair(a: usize, b: usize, confidence: f32) -> RelativePosition {
    RelativePosition {
        dx: OFFSETS[b].0 - OFFSETS[a].0,
        dy: OFFSETS[b].1 - OFFSETS[a].1,
        confidence,
        index_a: a,
        index_b: b,
    }
}

fn assert_offsets(table: &braggdisk::PositionTable, reference: usize) {
    let (rx, ry) = OFFSETS[reference];
    for (i, &(ex, ey)) in OFFSETS.iter().enumerate() {
        let o = table.get(i).unwrap();
        assert!((o.dx - (ex - rx)).abs() < 1e-9, "image {i}: {o:?}");
        assert!((o.dy - (ey - ry)).abs() < 1e-9, "image {i}: {o:?}");
    }
}

#[test]
fn consistent_pairs_are_reproduced_exactly() {
    let mut pairs = Vec::new();
    for a in 0..OFFSETS.len() {
        for b in (a + 1)..OFFSETS.len() {
            pairs.push(pair(a, b, 0.5 + 0.1 * (a + b) as f32));
        }
    }
    let table = refine_positions(OFFSETS.len(), 0, &pairs).unwrap();
    assert_offsets(&table, 0);
    assert!(table.residual() < 1e-12);
    assert!(table.require_connected().is_ok());
    assert_eq!(table.connected().count(), OFFSETS.len());
}

#[test]
fn chain_of_neighbours_is_enough() {
    let pairs: Vec<_> = (1..OFFSETS.len()).map(|i| pair(i - 1, i, 1.0)).collect();
    let table = refine_positions(OFFSETS.len(), 0, &pairs).unwrap();
    assert_offsets(&table, 0);
}

#[test]
fn reference_image_is_the_zero_point() {
    let pairs: Vec<_> = (1..OFFSETS.len()).map(|i| pair(0, i, 1.0)).collect();
    let table = refine_positions(OFFSETS.len(), 2, &pairs).unwrap();
    assert_eq!(table.reference(), 2);
    let o = table.get(2).unwrap();
    assert_eq!((o.dx, o.dy), (0.0, 0.0));
    assert_offsets(&table, 2);
}

#[test]
fn confidence_weights_resolve_conflicts() {
    let mut strong = pair(0, 1, 1.0);
    strong.confidence = 0.9;
    let mut weak = pair(0, 1, 0.1);
    weak.dx += 10.0;
    let table = refine_positions(2, 0, &[strong, weak]).unwrap();
    let o = table.get(1).unwrap();
    assert!((o.dx - (OFFSETS[1].0 + 1.0)).abs() < 1e-9, "{o:?}");
    assert!(table.residual() > 0.0);
}

#[test]
fn zero_confidence_pairs_are_ignored() {
    let pairs = [pair(0, 1, 1.0), pair(1, 2, 0.0)];
    let table = refine_positions(3, 0, &pairs).unwrap();
    assert!(table.get(1).is_ok());
    assert_eq!(
        table.get(2).err().unwrap(),
        BraggError::DisconnectedStack { image: 2 }
    );
}

#[test]
fn out_of_range_indices_are_errors() {
    assert!(matches!(
        refine_positions(2, 5, &[]),
        Err(BraggError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        refine_positions(2, 0, &[pair(0, 3, 1.0)]),
        Err(BraggError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn accumulator_aligns_shifted_copies() {
    let base = |x: i64, y: i64| ((x * 5 + y * 3).rem_euclid(17)) as f32;
    let images: Vec<Image<f32>> = OFFSETS
        .iter()
        .map(|&(ox, oy)| {
            Image::from_fn(20, 16, |x, y| base(x as i64 - ox as i64, y as i64 - oy as i64)).unwrap()
        })
        .collect();
    let pairs: Vec<_> = (1..OFFSETS.len()).map(|i| pair(0, i, 1.0)).collect();
    let table = refine_positions(OFFSETS.len(), 0, &pairs).unwrap();
    let acc: AlignedAccumulator = align_and_average(&images, &table).unwrap();

    assert_eq!(acc.width(), 20 + 7);
    assert_eq!(acc.height(), 16 + 8);
    assert_eq!(acc.origin(), (3, 5));

    for v in 0..acc.height() {
        for u in 0..acc.width() {
            if let Some(value) = acc.value(u, v) {
                let expected = base(u as i64 - 3, v as i64 - 5);
                assert_eq!(value, expected, "({u}, {v})");
            }
        }
    }
    assert_eq!(*acc.counts().get(3 + 4, 5 + 3).unwrap(), 5);

    let (x, y) = acc.to_image_coords(1, 10.0, 12.0).unwrap();
    assert_eq!((x, y), (10.0 - 3.0 + 3.0, 12.0 - 5.0 - 2.0));
}

#[test]
fn accumulator_skips_disconnected_images() {
    let images = vec![Image::filled(8, 8, 1.0f32).unwrap(); 3];
    let table = refine_positions(3, 0, &[pair(0, 1, 1.0)]).unwrap();
    let acc = align_and_average(&images, &table).unwrap();
    assert_eq!(acc.image_offset(2), None);
    assert_eq!(
        acc.to_image_coords(2, 0.0, 0.0).err().unwrap(),
        BraggError::DisconnectedStack { image: 2 }
    );
    let filled = acc.filled();
    assert!(filled.data().iter().all(|&v| v == 1.0));
}
