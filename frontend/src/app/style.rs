//! Paint tables for the reflectivity layer, plus the default camera.
//!
//! All ramps are piecewise-linear over sorted control points and clamp at
//! both ends, the same evaluation the circle layer paint spec defines.

/// Default camera: continental US
pub const DEFAULT_CENTER: (f64, f64) = (-95.7129, 37.0902);
pub const DEFAULT_ZOOM: f64 = 4.0;
pub const MIN_ZOOM: f64 = 2.0;
pub const MAX_ZOOM: f64 = 10.0;

/// Circle color over reflectivity in dBZ, light blue through purple
pub const RADAR_COLORS: [(f64, [u8; 4]); 16] = [
    (-10.0, [0, 50, 200, 51]),
    (0.0, [0, 0, 255, 77]),
    (5.0, [0, 100, 255, 128]),
    (10.0, [0, 150, 255, 179]),
    (15.0, [0, 200, 255, 204]),
    (20.0, [100, 255, 255, 230]),
    (25.0, [150, 255, 200, 230]),
    (30.0, [200, 255, 150, 230]),
    (35.0, [255, 255, 100, 255]),
    (40.0, [255, 200, 0, 255]),
    (45.0, [255, 150, 0, 255]),
    (50.0, [255, 100, 0, 255]),
    (55.0, [255, 50, 0, 255]),
    (60.0, [255, 0, 0, 255]),
    (65.0, [200, 0, 100, 255]),
    (70.0, [150, 0, 150, 255]),
];

/// Circle opacity over reflectivity in dBZ
pub const OPACITY_STOPS: [(f64, f64); 8] = [
    (-10.0, 0.3),
    (0.0, 0.4),
    (10.0, 0.5),
    (20.0, 0.6),
    (30.0, 0.7),
    (40.0, 0.8),
    (50.0, 0.9),
    (60.0, 1.0),
];

/// Circle radius in pixels over zoom level
pub const RADIUS_STOPS: [(f64, f64); 3] = [(0.0, 2.0), (5.0, 4.0), (10.0, 8.0)];

/// Circle blur over zoom level; 1.0 feathers out to twice the radius
pub const BLUR_STOPS: [(f64, f64); 3] = [(0.0, 0.5), (5.0, 1.0), (10.0, 2.0)];

/// Legend rows, strongest last. Swatches are the ramp colors at the lower
/// bound of each range, fully opaque for display.
pub const DBZ_RANGES: [(&str, [u8; 4]); 14] = [
    ("< 5", [0, 0, 255, 255]),
    ("5-10", [0, 100, 255, 255]),
    ("10-15", [0, 150, 255, 255]),
    ("15-20", [0, 200, 255, 255]),
    ("20-25", [100, 255, 255, 255]),
    ("25-30", [150, 255, 200, 255]),
    ("30-35", [200, 255, 150, 255]),
    ("35-40", [255, 255, 100, 255]),
    ("40-45", [255, 200, 0, 255]),
    ("45-50", [255, 150, 0, 255]),
    ("50-55", [255, 100, 0, 255]),
    ("55-60", [255, 50, 0, 255]),
    ("60-65", [255, 0, 0, 255]),
    ("65+", [200, 0, 100, 255]),
];

/// Evaluate a scalar ramp at `x`. Inputs beyond the first or last stop
/// clamp to that stop's output.
pub fn interpolate(stops: &[(f64, f64)], x: f64) -> f64 {
    match stops.iter().position(|(stop, _)| x < *stop) {
        Some(0) => stops[0].1,
        Some(i) => {
            let (x0, y0) = stops[i - 1];
            let (x1, y1) = stops[i];
            let t = (x - x0) / (x1 - x0);
            y0 + (y1 - y0) * t
        }
        None => stops[stops.len() - 1].1,
    }
}

/// Evaluate a color ramp at `x`, interpolating each RGBA channel
pub fn interpolate_color(stops: &[(f64, [u8; 4])], x: f64) -> [u8; 4] {
    match stops.iter().position(|(stop, _)| x < *stop) {
        Some(0) => stops[0].1,
        Some(i) => {
            let (x0, c0) = stops[i - 1];
            let (x1, c1) = stops[i];
            let t = (x - x0) / (x1 - x0);
            let mut color = [0u8; 4];
            for ch in 0..4 {
                let v = c0[ch] as f64 + (c1[ch] as f64 - c0[ch] as f64) * t;
                color[ch] = v.round() as u8;
            }
            color
        }
        None => stops[stops.len() - 1].1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_at_a_stop_is_exact() {
        assert_eq!(interpolate_color(&RADAR_COLORS, 35.0), [255, 255, 100, 255]);
        assert_eq!(interpolate_color(&RADAR_COLORS, -10.0), [0, 50, 200, 51]);
        assert_eq!(interpolate_color(&RADAR_COLORS, 70.0), [150, 0, 150, 255]);
    }

    #[test]
    fn test_color_clamps_beyond_the_ramp() {
        assert_eq!(interpolate_color(&RADAR_COLORS, -50.0), [0, 50, 200, 51]);
        assert_eq!(interpolate_color(&RADAR_COLORS, 200.0), [150, 0, 150, 255]);
    }

    #[test]
    fn test_color_interpolates_between_stops() {
        // Halfway between 60 dBZ [255,0,0] and 65 dBZ [200,0,100]
        assert_eq!(interpolate_color(&RADAR_COLORS, 62.5), [228, 0, 50, 255]);
    }

    #[test]
    fn test_opacity_ramp() {
        assert_eq!(interpolate(&OPACITY_STOPS, -10.0), 0.3);
        assert_eq!(interpolate(&OPACITY_STOPS, 60.0), 1.0);
        assert_eq!(interpolate(&OPACITY_STOPS, 75.0), 1.0);
        assert!((interpolate(&OPACITY_STOPS, 35.0) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_radius_and_blur_over_zoom() {
        assert_eq!(interpolate(&RADIUS_STOPS, 0.0), 2.0);
        assert_eq!(interpolate(&RADIUS_STOPS, 5.0), 4.0);
        assert_eq!(interpolate(&RADIUS_STOPS, 10.0), 8.0);
        assert!((interpolate(&RADIUS_STOPS, 2.5) - 3.0).abs() < 1e-9);
        assert!((interpolate(&BLUR_STOPS, 7.5) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_legend_covers_the_ramp() {
        assert_eq!(DBZ_RANGES.len(), 14);
        assert_eq!(DBZ_RANGES[0].0, "< 5");
        assert_eq!(DBZ_RANGES[13].0, "65+");
    }
}
