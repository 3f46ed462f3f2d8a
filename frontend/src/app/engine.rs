//! In-process raster map engine.
//!
//! Owns the camera, named GeoJSON sources and circle layers, and composites
//! radar circles over a basemap snapshot. Mirrors the behavior of a GL style
//! engine where the rest of the app depends on it: sources and layers are
//! addressed by id and rejected on duplicate add, paint ramps are
//! piecewise-linear, and bounds fitting honors padding and a zoom cap.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use mapbox::BoundingBox;
use radarapi::RadarData;
use thiserror::Error;

use crate::app::style;

const TILE_SIZE: f64 = 256.0;

/// Mercator projection limit; beyond this latitude y diverges
const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Fill used until the first basemap snapshot arrives, same as the window chrome
const STYLE_BACKGROUND: [u8; 4] = [17, 24, 39, 255];

/// Default rendered frame size; the UI scales the frame to the window
pub const FRAME_WIDTH: u32 = 1280;
pub const FRAME_HEIGHT: u32 = 720;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("source {0} already exists")]
    DuplicateSource(String),
    #[error("layer {0} already exists")]
    DuplicateLayer(String),
    #[error("source {0} does not exist")]
    UnknownSource(String),
    #[error("bounds are not finite")]
    InvalidBounds,
}

/// Camera state: geographic center, fractional zoom, frame size in pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub center_lon: f64,
    pub center_lat: f64,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// World size in pixels at the current zoom
    fn world_size(&self) -> f64 {
        TILE_SIZE * self.zoom.exp2()
    }

    /// Project lon/lat to world pixel coordinates at the current zoom
    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let world = self.world_size();
        let x = (lon + 180.0) / 360.0 * world;
        let y = mercator_y(lat) * world;
        (x, y)
    }

    /// Inverse of project
    fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let world = self.world_size();
        let lon = x / world * 360.0 - 180.0;
        let lat = inverse_mercator_y(y / world);
        (lon, lat)
    }

    /// Frame pixel position of a geographic point
    pub fn geo_to_screen(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = self.project(lon, lat);
        let (cx, cy) = self.project(self.center_lon, self.center_lat);
        (
            x - cx + self.width as f64 / 2.0,
            y - cy + self.height as f64 / 2.0,
        )
    }

    /// Geographic box currently covered by the frame, clamped to the
    /// projection's valid range
    pub fn visible_bounds(&self) -> BoundingBox {
        let (cx, cy) = self.project(self.center_lon, self.center_lat);
        let half_w = self.width as f64 / 2.0;
        let half_h = self.height as f64 / 2.0;
        let (min_lon, max_lat) = self.unproject(cx - half_w, cy - half_h);
        let (max_lon, min_lat) = self.unproject(cx + half_w, cy + half_h);
        BoundingBox::new(
            min_lon.max(-180.0),
            min_lat.max(-MAX_MERCATOR_LAT),
            max_lon.min(180.0),
            max_lat.min(MAX_MERCATOR_LAT),
        )
    }
}

/// Mercator y in [0, 1] for a latitude
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.to_radians();
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
}

/// Latitude for a mercator y in [0, 1]
fn inverse_mercator_y(y: f64) -> f64 {
    (std::f64::consts::PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}

/// Paint for a circle layer, evaluated per feature at render time.
/// Reflectivity drives color and opacity; zoom drives radius and blur.
#[derive(Debug, Clone)]
pub struct CirclePaint {
    pub color_stops: &'static [(f64, [u8; 4])],
    pub opacity_stops: &'static [(f64, f64)],
    pub radius_stops: &'static [(f64, f64)],
    pub blur_stops: &'static [(f64, f64)],
}

/// A styled circle layer bound to a named source
#[derive(Debug, Clone)]
pub struct CircleLayer {
    pub id: String,
    pub source: String,
    pub paint: CirclePaint,
}

/// Initial camera and frame size for a new engine
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub center: (f64, f64),
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: style::DEFAULT_CENTER,
            zoom: style::DEFAULT_ZOOM,
            min_zoom: style::MIN_ZOOM,
            max_zoom: style::MAX_ZOOM,
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
        }
    }
}

/// Fit parameters for [`MapEngine::fit_bounds`]
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Pixel margin kept clear on every side of the fitted bounds
    pub padding: u32,
    /// Fitting never zooms in past this, so sparse data keeps context
    pub max_zoom: f64,
}

/// The map instance. Created once per window, mutated only from the UI
/// event loop, destroyed on teardown.
pub struct MapEngine {
    viewport: Viewport,
    sources: HashMap<String, RadarData>,
    layers: Vec<CircleLayer>,
    basemap: Option<RgbaImage>,
    style_loaded: bool,
    basemap_synced: bool,
}

impl MapEngine {
    pub fn new(options: MapOptions) -> Self {
        let mut engine = Self {
            viewport: Viewport {
                center_lon: options.center.0,
                center_lat: options.center.1,
                zoom: options.zoom,
                min_zoom: options.min_zoom,
                max_zoom: options.max_zoom,
                width: options.width.max(1),
                height: options.height.max(1),
            },
            sources: HashMap::new(),
            layers: Vec::new(),
            basemap: None,
            style_loaded: false,
            basemap_synced: false,
        };
        engine.viewport.zoom = engine.clamp_zoom(options.zoom);
        engine
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn visible_bounds(&self) -> BoundingBox {
        self.viewport.visible_bounds()
    }

    /// True once the first basemap snapshot has been installed
    pub fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    /// True while the installed basemap matches the current camera. Frames
    /// should only be pushed while synced so circles and basemap line up.
    pub fn is_basemap_synced(&self) -> bool {
        self.basemap_synced
    }

    /// Install a basemap snapshot rendered for the current camera. The
    /// first snapshot doubles as the style loaded signal.
    pub fn set_basemap(&mut self, image: RgbaImage) {
        self.basemap = Some(image);
        self.style_loaded = true;
        self.basemap_synced = true;
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn source(&self, id: &str) -> Option<&RadarData> {
        self.sources.get(id)
    }

    pub fn add_source(&mut self, id: impl Into<String>, data: RadarData) -> Result<(), EngineError> {
        let id = id.into();
        if self.sources.contains_key(&id) {
            return Err(EngineError::DuplicateSource(id));
        }
        self.sources.insert(id, data);
        Ok(())
    }

    /// Replace the data of an existing source
    pub fn set_source_data(&mut self, id: &str, data: RadarData) -> Result<(), EngineError> {
        match self.sources.get_mut(id) {
            Some(slot) => {
                *slot = data;
                Ok(())
            }
            None => Err(EngineError::UnknownSource(id.to_string())),
        }
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|layer| layer.id == id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn add_layer(&mut self, layer: CircleLayer) -> Result<(), EngineError> {
        if self.has_layer(&layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id));
        }
        self.layers.push(layer);
        Ok(())
    }

    /// Remove a layer; returns whether it existed
    pub fn remove_layer(&mut self, id: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|layer| layer.id != id);
        self.layers.len() < before
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.set_camera(self.viewport.center_lon, self.viewport.center_lat, zoom);
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.set_zoom(self.viewport.zoom + delta);
    }

    /// Move the camera so `bounds` fits inside the frame with `padding`
    /// pixels clear on every side, never exceeding the zoom cap. A
    /// degenerate box (single point) centers on the point at the cap.
    pub fn fit_bounds(&mut self, bounds: BoundingBox, options: FitOptions) -> Result<(), EngineError> {
        if !bounds.is_finite() {
            return Err(EngineError::InvalidBounds);
        }

        // Spans in world pixels at zoom 0
        let span_x = (bounds.max_lon - bounds.min_lon) / 360.0 * TILE_SIZE;
        let y_north = mercator_y(bounds.max_lat.min(MAX_MERCATOR_LAT));
        let y_south = mercator_y(bounds.min_lat.max(-MAX_MERCATOR_LAT));
        let span_y = (y_south - y_north) * TILE_SIZE;

        let avail_w = self.viewport.width.saturating_sub(options.padding * 2).max(1) as f64;
        let avail_h = self.viewport.height.saturating_sub(options.padding * 2).max(1) as f64;

        let zoom_x = if span_x > 0.0 { (avail_w / span_x).log2() } else { f64::INFINITY };
        let zoom_y = if span_y > 0.0 { (avail_h / span_y).log2() } else { f64::INFINITY };
        let zoom = zoom_x.min(zoom_y).min(options.max_zoom);

        let center_lon = (bounds.min_lon + bounds.max_lon) / 2.0;
        let center_lat = inverse_mercator_y((y_north + y_south) / 2.0);

        self.set_camera(center_lon, center_lat, zoom);
        Ok(())
    }

    fn set_camera(&mut self, lon: f64, lat: f64, zoom: f64) {
        let zoom = self.clamp_zoom(zoom);
        let unchanged = (lon - self.viewport.center_lon).abs() < 1e-9
            && (lat - self.viewport.center_lat).abs() < 1e-9
            && (zoom - self.viewport.zoom).abs() < 1e-9;
        if unchanged {
            return;
        }
        self.viewport.center_lon = lon;
        self.viewport.center_lat = lat;
        self.viewport.zoom = zoom;
        // The installed basemap no longer matches the camera
        self.basemap_synced = false;
    }

    /// Clamp zoom to the configured range, raised so the world always
    /// covers the frame and circles stay aligned with the basemap
    fn clamp_zoom(&self, zoom: f64) -> f64 {
        let larger_side = self.viewport.width.max(self.viewport.height) as f64;
        let floor = self.viewport.min_zoom.max((larger_side / TILE_SIZE).log2());
        zoom.clamp(floor, self.viewport.max_zoom)
    }

    /// Composite the current frame: basemap, then every layer in order
    pub fn render(&self) -> RgbaImage {
        let mut frame = match &self.basemap {
            Some(base) if base.width() == self.viewport.width && base.height() == self.viewport.height => {
                base.clone()
            }
            _ => RgbaImage::from_pixel(self.viewport.width, self.viewport.height, Rgba(STYLE_BACKGROUND)),
        };

        for layer in &self.layers {
            let data = match self.sources.get(&layer.source) {
                Some(data) => data,
                None => continue,
            };
            self.draw_circle_layer(&mut frame, layer, data);
        }

        frame
    }

    fn draw_circle_layer(&self, frame: &mut RgbaImage, layer: &CircleLayer, data: &RadarData) {
        let zoom = self.viewport.zoom;
        let radius = style::interpolate(layer.paint.radius_stops, zoom).max(0.5);
        let blur = style::interpolate(layer.paint.blur_stops, zoom).max(0.0);
        // Blur feathers the edge out beyond the core radius
        let edge = radius * (1.0 + blur);

        for feature in &data.features {
            let (sx, sy) = self.viewport.geo_to_screen(feature.lon(), feature.lat());
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            if sx < -edge
                || sy < -edge
                || sx > self.viewport.width as f64 + edge
                || sy > self.viewport.height as f64 + edge
            {
                continue;
            }

            let dbz = feature.reflectivity();
            let color = style::interpolate_color(layer.paint.color_stops, dbz);
            let opacity = style::interpolate(layer.paint.opacity_stops, dbz);
            let alpha = color[3] as f64 / 255.0 * opacity;

            draw_circle(frame, sx, sy, radius, edge, [color[0], color[1], color[2]], alpha);
        }
    }
}

/// Paint one feathered circle with source-over blending. Coverage is 1
/// inside `radius`, falls off linearly to 0 at `edge`.
fn draw_circle(frame: &mut RgbaImage, cx: f64, cy: f64, radius: f64, edge: f64, rgb: [u8; 3], alpha: f64) {
    let x_min = (cx - edge).floor().max(0.0) as u32;
    let x_max = (cx + edge).ceil().min(frame.width() as f64 - 1.0) as u32;
    let y_min = (cy - edge).floor().max(0.0) as u32;
    let y_max = (cy + edge).ceil().min(frame.height() as f64 - 1.0) as u32;

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            let coverage = if dist <= radius {
                1.0
            } else if dist >= edge {
                0.0
            } else {
                (edge - dist) / (edge - radius)
            };
            if coverage <= 0.0 {
                continue;
            }

            let a = (alpha * coverage).clamp(0.0, 1.0);
            let px = frame.get_pixel_mut(x, y);
            for ch in 0..3 {
                px.0[ch] = (rgb[ch] as f64 * a + px.0[ch] as f64 * (1.0 - a)).round() as u8;
            }
            px.0[3] = px.0[3].max((a * 255.0).round() as u8);
        }
    }
}
