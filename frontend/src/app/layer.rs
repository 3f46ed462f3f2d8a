//! Radar layer management: projects the latest feature collection onto the
//! map engine, replacing any prior radar state, then fits the viewport.

use std::time::Duration;

use anyhow::{anyhow, Result};
use mapbox::BoundingBox;
use radarapi::RadarData;

use crate::app::engine::{CircleLayer, CirclePaint, FitOptions, MapEngine};
use crate::app::style;

/// Well-known ids, stable across upserts
pub const RADAR_SOURCE_ID: &str = "radar-data";
pub const RADAR_LAYER_ID: &str = "radar-heatmap";

/// Viewport fit: margin around the data and the zoom-in ceiling
pub const FIT_PADDING: u32 = 50;
pub const FIT_MAX_ZOOM: f64 = 8.0;

/// Wait between the style loaded signal and the first layer mutation. The
/// engine can still be settling right after the signal; this delay is a
/// known fragility, not a contract.
pub const STYLE_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Bounding box over every feature, None for an empty collection
pub fn data_bounds(data: &RadarData) -> Option<BoundingBox> {
    let mut bounds: Option<BoundingBox> = None;
    for feature in &data.features {
        let (lon, lat) = (feature.lon(), feature.lat());
        bounds = Some(match bounds {
            None => BoundingBox::new(lon, lat, lon, lat),
            Some(b) => BoundingBox::new(
                b.min_lon.min(lon),
                b.min_lat.min(lat),
                b.max_lon.max(lon),
                b.max_lat.max(lat),
            ),
        });
    }
    bounds
}

fn radar_layer() -> CircleLayer {
    CircleLayer {
        id: RADAR_LAYER_ID.to_string(),
        source: RADAR_SOURCE_ID.to_string(),
        paint: CirclePaint {
            color_stops: &style::RADAR_COLORS,
            opacity_stops: &style::OPACITY_STOPS,
            radius_stops: &style::RADIUS_STOPS,
            blur_stops: &style::BLUR_STOPS,
        },
    }
}

/// Upsert the radar source and layer and fit the viewport to the data.
///
/// Returns Ok(false) when the guard turns this into a no-op: the style is
/// not loaded yet or the collection is empty. On any error the caller keeps
/// whatever layer state was already on the map.
pub fn update_radar_layer(engine: &mut MapEngine, data: &RadarData) -> Result<bool> {
    if !engine.is_style_loaded() {
        debug!("Radar layer update skipped: style not loaded yet");
        return Ok(false);
    }
    if data.is_empty() {
        debug!("Radar layer update skipped: no features");
        return Ok(false);
    }

    // Compute bounds first so malformed geometry fails before any mutation
    let bounds = data_bounds(data).ok_or_else(|| anyhow!("no coordinates in radar data"))?;
    if !bounds.is_finite() {
        return Err(anyhow!("radar data bounds are not finite: {}", bounds));
    }

    if engine.has_source(RADAR_SOURCE_ID) {
        engine.set_source_data(RADAR_SOURCE_ID, data.clone())?;
    } else {
        engine.add_source(RADAR_SOURCE_ID, data.clone())?;
    }

    // The engine cannot restyle a live layer; replace it
    if engine.has_layer(RADAR_LAYER_ID) {
        engine.remove_layer(RADAR_LAYER_ID);
    }
    engine.add_layer(radar_layer())?;

    engine.fit_bounds(bounds, FitOptions { padding: FIT_PADDING, max_zoom: FIT_MAX_ZOOM })?;

    debug!("Radar layer updated with {} features", data.features.len());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::engine::{MapEngine, MapOptions};
    use image::RgbaImage;
    use radarapi::RadarPoint;

    fn ready_engine() -> MapEngine {
        let mut engine = MapEngine::new(MapOptions {
            center: (-95.7129, 37.0902),
            zoom: 4.0,
            min_zoom: 2.0,
            max_zoom: 10.0,
            width: 400,
            height: 400,
        });
        engine.set_basemap(RgbaImage::new(400, 400));
        engine
    }

    fn storm_line() -> RadarData {
        RadarData::new(vec![
            RadarPoint::new(-104.5, 39.7, 20.0),
            RadarPoint::new(-97.5, 35.4, 45.0),
            RadarPoint::new(-90.2, 38.6, 60.0),
        ])
    }

    #[test]
    fn test_data_bounds_contains_every_feature() {
        let data = storm_line();
        let bounds = data_bounds(&data).unwrap();
        for feature in &data.features {
            assert!(bounds.min_lon <= feature.lon() && feature.lon() <= bounds.max_lon);
            assert!(bounds.min_lat <= feature.lat() && feature.lat() <= bounds.max_lat);
        }
        assert_eq!(bounds.min_lon, -104.5);
        assert_eq!(bounds.max_lon, -90.2);
    }

    #[test]
    fn test_data_bounds_single_feature_is_degenerate() {
        let data = RadarData::new(vec![RadarPoint::new(-100.0, 40.0, 35.0)]);
        let bounds = data_bounds(&data).unwrap();
        assert_eq!(bounds.min_lon, -100.0);
        assert_eq!(bounds.max_lon, -100.0);
        assert_eq!(bounds.min_lat, 40.0);
        assert_eq!(bounds.max_lat, 40.0);
        assert!(bounds.is_degenerate());
    }

    #[test]
    fn test_data_bounds_empty_is_none() {
        assert!(data_bounds(&RadarData::new(vec![])).is_none());
    }

    #[test]
    fn test_update_skipped_before_style_loaded() {
        let mut engine = MapEngine::new(MapOptions::default());
        let updated = update_radar_layer(&mut engine, &storm_line()).unwrap();
        assert!(!updated);
        assert!(!engine.has_source(RADAR_SOURCE_ID));
        assert!(!engine.has_layer(RADAR_LAYER_ID));
    }

    #[test]
    fn test_update_skipped_for_empty_data() {
        let mut engine = ready_engine();
        let viewport_before = engine.viewport().clone();

        let updated = update_radar_layer(&mut engine, &RadarData::new(vec![])).unwrap();
        assert!(!updated);
        assert!(!engine.has_source(RADAR_SOURCE_ID));
        assert_eq!(engine.viewport(), &viewport_before);
    }

    #[test]
    fn test_update_twice_keeps_one_source_and_one_layer() {
        let mut engine = ready_engine();

        assert!(update_radar_layer(&mut engine, &storm_line()).unwrap());
        let replacement = RadarData::new(vec![RadarPoint::new(-100.0, 40.0, 35.0)]);
        assert!(update_radar_layer(&mut engine, &replacement).unwrap());

        assert_eq!(engine.layer_count(), 1);
        assert_eq!(engine.source(RADAR_SOURCE_ID).unwrap().features.len(), 1);
    }

    #[test]
    fn test_single_point_fit_does_not_error() {
        let mut engine = ready_engine();
        let single = RadarData::new(vec![RadarPoint::new(-100.0, 40.0, 35.0)]);

        assert!(update_radar_layer(&mut engine, &single).unwrap());
        let vp = engine.viewport();
        assert!((vp.zoom - FIT_MAX_ZOOM).abs() < 1e-9);
        assert!((vp.center_lon - -100.0).abs() < 1e-9);
        assert!((vp.center_lat - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_zoom_never_exceeds_cap() {
        let mut engine = ready_engine();
        // Two features close together would fit far past the cap
        let tight = RadarData::new(vec![
            RadarPoint::new(-100.0, 40.0, 35.0),
            RadarPoint::new(-100.001, 40.001, 40.0),
        ]);

        assert!(update_radar_layer(&mut engine, &tight).unwrap());
        assert!(engine.viewport().zoom <= FIT_MAX_ZOOM);
    }

    #[test]
    fn test_non_finite_coordinates_leave_map_untouched() {
        let mut engine = ready_engine();
        assert!(update_radar_layer(&mut engine, &storm_line()).unwrap());
        let viewport_before = engine.viewport().clone();

        let bad = RadarData::new(vec![RadarPoint::new(f64::NAN, 40.0, 35.0)]);
        assert!(update_radar_layer(&mut engine, &bad).is_err());

        // Prior layer state survives the failed update
        assert!(engine.has_source(RADAR_SOURCE_ID));
        assert!(engine.has_layer(RADAR_LAYER_ID));
        assert_eq!(engine.source(RADAR_SOURCE_ID).unwrap().features.len(), 3);
        assert_eq!(engine.viewport(), &viewport_before);
    }
}
