//! Round-trip contract: emit a program, parse it back, and compare the
//! reconstruction against the geometry prediction and the power matrix.

use rasterkit_raster::{
    emit, resolve, EngravingConfig, FramingConfig, Geometry, Origin, PowerMatrix, PowerMode,
    RasterMode,
};
use rasterkit_trajectory::parse;

fn config() -> EngravingConfig {
    EngravingConfig {
        ui_dimension: 8.0,
        dpi: 127,
        line_step: 0.2,
        premove: 1.0,
        feedrate: 1200.0,
        gray_steps: 16,
        min_p: 0.0,
        max_p: 1000.0,
        ctrl_max: 1000.0,
        m67_delay: 0.0,
        ..Default::default()
    }
}

/// Diagonal gradient with more than 16 distinct power levels before
/// quantization; rich enough that the duration bound is meaningful.
fn gradient(geometry: &Geometry) -> PowerMatrix {
    let w = geometry.w_px as f64;
    let h = geometry.h_px as f64;
    PowerMatrix::from_fn(geometry.w_px, geometry.h_px, |x, y| {
        let t = (x as f64 / w + y as f64 / h) / 2.0;
        (t * 1000.0 / 62.5).round() * 62.5
    })
}

#[test]
fn final_time_matches_prediction() {
    let cfg = config();
    let geometry = resolve(&cfg, 1.0).unwrap();
    let matrix = gradient(&geometry);
    let program = emit(&matrix, &geometry, &cfg).unwrap();

    let trajectory = parse(&program, &geometry);
    assert!(trajectory.warnings.is_empty(), "{:?}", trajectory.warnings);

    let predicted_s = geometry.est_min * 60.0;
    let final_s = trajectory.final_time();
    assert!(
        final_s >= predicted_s * 0.9 && final_s <= predicted_s * 1.2,
        "parsed {final_s:.2}s, predicted {predicted_s:.2}s"
    );
    assert!(trajectory.agrees_with(&geometry));
}

#[test]
fn bounding_box_matches_rect_full() {
    let cfg = EngravingConfig {
        origin: Origin::Center,
        ..config()
    };
    let geometry = resolve(&cfg, 1.0).unwrap();
    let matrix = gradient(&geometry);
    let program = emit(&matrix, &geometry, &cfg).unwrap();

    let trajectory = parse(&program, &geometry);
    let bounds = trajectory.bounds().unwrap();

    let tol = cfg.premove + 1e-6;
    assert!((bounds.min_x - geometry.rect_full.min_x).abs() <= tol);
    assert!((bounds.max_x - geometry.rect_full.max_x).abs() <= tol);
    assert!((bounds.min_y - geometry.rect_full.min_y).abs() <= tol);
    assert!((bounds.max_y - geometry.rect_full.max_y).abs() <= tol);
}

#[test]
fn every_burned_pixel_is_visited_in_serpentine_order() {
    let cfg = config();
    let geometry = resolve(&cfg, 1.0).unwrap();
    let matrix = PowerMatrix::from_fn(geometry.w_px, geometry.h_px, |x, y| {
        if (x / 3 + y / 3) % 2 == 0 {
            1000.0
        } else {
            0.0
        }
    });
    let program = emit(&matrix, &geometry, &cfg).unwrap();
    let trajectory = parse(&program, &geometry);

    // For every burned pixel there must be a powered segment at the pixel's
    // row that sweeps across its scan coordinate.
    for py in 0..geometry.h_px {
        let row_y = geometry.offset_y + (geometry.h_px - 1 - py) as f64 * geometry.line_step;
        for px in 0..geometry.w_px {
            let power = matrix.value(px, py);
            if power <= 0.0 {
                continue;
            }
            let pixel_x = geometry.offset_x + px as f64 * geometry.scan_step;
            let covered = trajectory.points.windows(2).any(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                b.power > 0.0
                    && (a.y_mm - row_y).abs() < 1e-6
                    && (b.y_mm - row_y).abs() < 1e-6
                    && pixel_x >= a.x_mm.min(b.x_mm) - 1e-6
                    && pixel_x <= a.x_mm.max(b.x_mm) + 1e-6
            });
            assert!(covered, "pixel ({px}, {py}) at power {power} was never burned");
        }
    }

    // Serpentine: the first in-image X alternates between the left and right
    // entry across consecutive rows.
    let mut row_entries: Vec<f64> = Vec::new();
    let mut last_y = f64::NAN;
    for p in &trajectory.points {
        if (p.y_mm - last_y).abs() > 1e-9 {
            last_y = p.y_mm;
            row_entries.push(p.x_mm);
        }
    }
    let mut alternations = 0;
    for pair in row_entries.windows(2) {
        if (pair[0] - pair[1]).abs() > geometry.real_w / 2.0 {
            alternations += 1;
        }
    }
    assert!(alternations >= row_entries.len() / 2);
}

#[test]
fn framing_trace_precedes_the_body_and_stays_on_the_rectangle() {
    let cfg = EngravingConfig {
        framing: Some(FramingConfig {
            power: 5.0,
            feed_fraction: 0.5,
            pause: None,
        }),
        ..config()
    };
    let geometry = resolve(&cfg, 1.0).unwrap();
    let matrix = gradient(&geometry);
    let program = emit(&matrix, &geometry, &cfg).unwrap();
    let trajectory = parse(&program, &geometry);

    // The first parsed points trace the burn rectangle's corners.
    let burn = geometry.rect_burn;
    let first = &trajectory.points[0];
    let on_edge = |x: f64, y: f64| {
        ((x - burn.min_x).abs() < 1e-6 || (x - burn.max_x).abs() < 1e-6)
            || ((y - burn.min_y).abs() < 1e-6 || (y - burn.max_y).abs() < 1e-6)
    };
    assert!(on_edge(first.x_mm, first.y_mm));

    // Each corner of the rectangle is visited during framing.
    let framed: Vec<_> = trajectory
        .points
        .iter()
        .take_while(|p| p.power != 0.0 || p.time_s < 1e-9 || on_edge(p.x_mm, p.y_mm))
        .collect();
    for (cx, cy) in burn.corners_ccw() {
        assert!(
            framed
                .iter()
                .any(|p| (p.x_mm - cx).abs() < 1e-6 && (p.y_mm - cy).abs() < 1e-6),
            "corner ({cx}, {cy}) was not traced"
        );
    }

    // Everything stays within the overscan rectangle (plus a micron).
    for p in &trajectory.points {
        assert!(
            geometry.rect_full.contains(p.x_mm, p.y_mm, 1e-3),
            "point ({}, {}) escaped the work area",
            p.x_mm,
            p.y_mm
        );
    }
}

#[test]
fn gated_mode_round_trip_matches_inline() {
    let inline_cfg = config();
    let gated_cfg = EngravingConfig {
        power_mode: PowerMode::Gated,
        ..config()
    };
    let geometry = resolve(&inline_cfg, 1.0).unwrap();
    let matrix = gradient(&geometry);

    let inline_traj = parse(&emit(&matrix, &geometry, &inline_cfg).unwrap(), &geometry);
    let gated_traj = parse(&emit(&matrix, &geometry, &gated_cfg).unwrap(), &geometry);

    // Identical motion; the gated init-safety sequence adds one extra
    // 0.5 s dwell, otherwise the timing matches exactly.
    assert!((gated_traj.final_time() - inline_traj.final_time() - 0.5).abs() < 1e-6);
    assert_eq!(inline_traj.bounds(), gated_traj.bounds());
}

#[test]
fn vertical_mode_round_trip() {
    let cfg = EngravingConfig {
        raster_mode: RasterMode::Vertical,
        ..config()
    };
    let geometry = resolve(&cfg, 1.0).unwrap();
    let matrix = gradient(&geometry);
    let program = emit(&matrix, &geometry, &cfg).unwrap();
    let trajectory = parse(&program, &geometry);

    assert!(trajectory.warnings.is_empty());
    let bounds = trajectory.bounds().unwrap();
    let tol = cfg.premove + 1e-6;
    assert!((bounds.min_y - geometry.rect_full.min_y).abs() <= tol);
    assert!((bounds.max_y - geometry.rect_full.max_y).abs() <= tol);
    assert!(trajectory.agrees_with(&geometry));
}
