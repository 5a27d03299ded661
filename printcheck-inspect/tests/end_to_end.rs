use image::{Rgb, RgbImage};
use printcheck_core::{DetectionConfig, MASK_ON};
use printcheck_inspect::{inspect, AlignmentError, InspectError, Inspector, DEFECT_HIGHLIGHT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SQUARE: (u32, u32, u32) = (90, 80, 20);

/// Random gray 8x8 blocks: plenty of corners, no chroma
fn golden_sample(width: u32, height: u32) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(2024);
    let cols = width / 8 + 1;
    let cells: Vec<u8> = (0..cols * (height / 8 + 1)).map(|_| rng.random()).collect();
    RgbImage::from_fn(width, height, |x, y| {
        let v = cells[((y / 8) * cols + x / 8) as usize];
        Rgb([v, v, v])
    })
}

fn with_red_square(golden: &RgbImage) -> RgbImage {
    let (x0, y0, side) = SQUARE;
    let mut test = golden.clone();
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            test.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    test
}

fn in_square(x: u32, y: u32, margin: u32) -> bool {
    let (x0, y0, side) = SQUARE;
    x + margin >= x0 && x < x0 + side + margin && y + margin >= y0 && y < y0 + side + margin
}

#[test]
fn red_square_is_reported_as_defect() {
    let golden = golden_sample(200, 200);
    let test = with_red_square(&golden);

    let report = Inspector::new(DetectionConfig::default())
        .unwrap()
        .inspect(&golden, &test)
        .unwrap();
    let art = &report.artifacts;
    let (cx, cy) = (SQUARE.0 + SQUARE.2 / 2, SQUARE.1 + SQUARE.2 / 2);

    assert!(report.summary.is_defect);
    assert!(report.summary.max_diff > 50.0);
    assert!(report.alignment.inliers >= 4);
    assert_eq!(art.aligned.dimensions(), golden.dimensions());
    assert_eq!(art.distance_map.dimensions(), golden.dimensions());
    assert_eq!(art.filtered_mask.dimensions(), golden.dimensions());

    assert!(art.distance_map.get_pixel(cx, cy)[0] > 50.0);
    assert_eq!(art.unfiltered_mask.get_pixel(cx, cy)[0], MASK_ON);
    assert_eq!(art.filtered_mask.get_pixel(cx, cy)[0], MASK_ON);
    assert_eq!(*art.overlay.get_pixel(cx, cy), DEFECT_HIGHLIGHT);

    let mut inside = 0;
    let mut outside = 0;
    for (x, y, p) in art.filtered_mask.enumerate_pixels() {
        if p[0] == MASK_ON {
            if in_square(x, y, 0) {
                inside += 1;
            } else if !in_square(x, y, 3) {
                outside += 1;
            }
        }
    }
    assert!(inside >= 300, "only {inside} square pixels kept");
    assert!(outside < 100, "{outside} stray pixels outside the square");

    let expected_pct = 100.0 * (inside + outside) as f64 / (200.0 * 200.0);
    assert!(report.summary.filtered_percent >= expected_pct - 1e-9);
    assert!(report.summary.filtered_percent <= 100.0);
}

#[test]
fn identical_images_are_clean() {
    let golden = golden_sample(200, 200);
    let report = inspect(&golden, &golden, &DetectionConfig::default()).unwrap();

    assert!(!report.summary.is_defect);
    assert!(report.summary.mean_diff < 1.0);
    assert!(report.summary.filtered_percent < 0.01);
    assert!(report.artifacts.filtered_mask.pixels().all(|p| p[0] == 0));
}

#[test]
fn solid_color_test_image_fails_alignment() {
    let golden = golden_sample(200, 200);
    let solid = RgbImage::from_pixel(200, 200, Rgb([40, 90, 160]));

    let err = inspect(&golden, &solid, &DetectionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        InspectError::Alignment(AlignmentError::InsufficientKeypoints { .. })
    ));
}

#[test]
fn differently_sized_test_image_is_warped_to_golden_frame() {
    let golden = golden_sample(200, 180);
    // Larger canvas with the golden content offset by (10, 6)
    let mut test = RgbImage::from_pixel(230, 200, Rgb([0, 0, 0]));
    for (x, y, p) in golden.enumerate_pixels() {
        test.put_pixel(x + 10, y + 6, *p);
    }

    let report = inspect(&golden, &test, &DetectionConfig::default()).unwrap();
    assert_eq!(report.artifacts.aligned.dimensions(), (200, 180));
    assert_eq!(report.artifacts.heatmap.dimensions(), (200, 180));
    assert!(report.alignment.inliers >= 4);
    assert!(report.summary.mean_diff < 10.0);
}
