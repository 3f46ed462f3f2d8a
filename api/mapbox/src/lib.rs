use futures::future::try_join_all;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImage, RgbaImage};
use log::debug;
use reqwest::{Client, StatusCode};
use std::fmt;
use thiserror::Error;

/// Raster tiles are requested at the classic 256px size.
pub const TILE_SIZE: u32 = 256;

/// Style used for the radar basemap.
pub const DEFAULT_STYLE: &str = "dark-v11";

const STYLES_BASE_URL: &str = "https://api.mapbox.com/styles/v1/mapbox";

/// Mapbox raster tile client. Downloads style tiles and assembles basemap
/// snapshots for a bounding box. Requires an access token.
#[derive(Clone)]
pub struct MapboxApi {
    client: Client,
    access_token: String,
    style: String,
}

#[derive(Debug, Error)]
pub enum TileError {
    /// The access token was rejected (HTTP 401/403). Reported separately so
    /// callers can flag token problems distinctly in diagnostics.
    #[error("access token rejected: {0}")]
    Unauthorized(StatusCode),
    #[error("tile request failed: {0}")]
    Http(StatusCode),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tile decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("snapshot viewport is empty")]
    EmptyViewport,
}

/// Geographic bounding box in GeoJSON order: west, south, east, north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// A single-point dataset collapses to a zero-area box.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.min_lon.is_finite()
            && self.min_lat.is_finite()
            && self.max_lon.is_finite()
            && self.max_lat.is_finite()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl MapboxApi {
    /// Create a new client for the default radar basemap style
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_style(access_token, DEFAULT_STYLE)
    }

    /// Create a new client for a specific Mapbox style
    pub fn with_style(access_token: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            style: style.into(),
        }
    }

    /// Builds the tile URL: `{base}/{style}/tiles/256/{z}/{x}/{y}?access_token={token}`
    fn tile_url(&self, zoom: u32, x: u32, y: u32) -> String {
        format!(
            "{}/{}/tiles/{}/{}/{}/{}?access_token={}",
            STYLES_BASE_URL, self.style, TILE_SIZE, zoom, x, y, self.access_token
        )
    }

    /// Convert lat/lon to XYZ tile number at zoom z (pure function)
    pub fn lat_lon_to_tile(lat_deg: f64, lon_deg: f64, zoom: u32) -> (u32, u32) {
        let lat_rad = lat_deg.to_radians();
        let n = 2u32.pow(zoom);
        let x = ((lon_deg + 180.0) / 360.0 * n as f64).floor() as u32;
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0
            * n as f64)
            .floor() as u32;
        (x.min(n - 1), y.min(n - 1))
    }

    /// Convert lat/lon to world pixel coordinates at zoom z (pure function)
    pub fn lat_lon_to_pixel(lat_deg: f64, lon_deg: f64, zoom: u32) -> (f64, f64) {
        let lat_rad = lat_deg.to_radians();
        let n = TILE_SIZE as f64 * 2u32.pow(zoom) as f64;
        let x = ((lon_deg + 180.0) / 360.0) * n;
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0) * n;
        (x, y)
    }

    /// Download a single style tile as an image (async)
    pub async fn download_tile(&self, zoom: u32, x: u32, y: u32) -> Result<DynamicImage, TileError> {
        let url = self.tile_url(zoom, x, y);
        debug!("Downloading tile {}/{}/{}", zoom, x, y);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TileError::Unauthorized(status));
        }
        if !status.is_success() {
            return Err(TileError::Http(status));
        }

        let bytes = resp.bytes().await?;
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Download all tiles covering a bounding box and return them as rows
    pub async fn download_tiles(
        &self,
        bbox: BoundingBox,
        zoom: u32,
    ) -> Result<Vec<Vec<DynamicImage>>, TileError> {
        let (x0, y0) = Self::lat_lon_to_tile(bbox.max_lat, bbox.min_lon, zoom);
        let (x1, y1) = Self::lat_lon_to_tile(bbox.min_lat, bbox.max_lon, zoom);

        let x_start = x0.min(x1);
        let x_end = x0.max(x1);
        let y_start = y0.min(y1);
        let y_end = y0.max(y1);

        // Flat future list so the whole mosaic downloads in parallel
        let mut all_futures = Vec::new();
        for y in y_start..=y_end {
            for x in x_start..=x_end {
                all_futures.push(self.download_tile(zoom, x, y));
            }
        }

        let tiles_flat: Vec<DynamicImage> = try_join_all(all_futures).await?;

        let mut tiles = Vec::new();
        let mut idx = 0;
        for _ in y_start..=y_end {
            let mut row = Vec::new();
            for _ in x_start..=x_end {
                row.push(tiles_flat[idx].clone());
                idx += 1;
            }
            tiles.push(row);
        }

        Ok(tiles)
    }

    /// Stitch tile rows into a single mosaic image
    pub fn stitch_tiles(tiles: &[Vec<DynamicImage>]) -> DynamicImage {
        let width = tiles[0].len() as u32 * TILE_SIZE;
        let height = tiles.len() as u32 * TILE_SIZE;

        let mut mosaic = DynamicImage::new_rgba8(width, height);

        tiles.iter().enumerate().for_each(|(row_idx, row)| {
            row.iter().enumerate().for_each(|(col_idx, tile)| {
                let _ = mosaic.copy_from(tile, col_idx as u32 * TILE_SIZE, row_idx as u32 * TILE_SIZE);
            });
        });

        mosaic
    }

    /// Assemble a basemap snapshot covering `bbox` at tile zoom `zoom`,
    /// cropped to the exact box and rescaled to `width` x `height` pixels.
    pub async fn snapshot(
        &self,
        bbox: BoundingBox,
        zoom: u32,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, TileError> {
        if width == 0 || height == 0 || !bbox.is_finite() || bbox.is_degenerate() {
            return Err(TileError::EmptyViewport);
        }

        let tiles = self.download_tiles(bbox, zoom).await?;
        let mut mosaic = Self::stitch_tiles(&tiles);

        // Pixel offsets of the box corners within the mosaic
        let (tile_x_min, tile_y_min) = Self::lat_lon_to_tile(bbox.max_lat, bbox.min_lon, zoom);
        let (left, top) = Self::lat_lon_to_pixel(bbox.max_lat, bbox.min_lon, zoom);
        let (right, _) = Self::lat_lon_to_pixel(bbox.max_lat, bbox.max_lon, zoom);
        let (_, bottom) = Self::lat_lon_to_pixel(bbox.min_lat, bbox.min_lon, zoom);

        let offset_x = left - tile_x_min as f64 * TILE_SIZE as f64;
        let offset_y = top - tile_y_min as f64 * TILE_SIZE as f64;
        let crop_w = (right - left).max(1.0) as u32;
        let crop_h = (bottom - top).max(1.0) as u32;

        let cropped = mosaic.crop(offset_x as u32, offset_y as u32, crop_w, crop_h);
        Ok(image::imageops::resize(
            &cropped.to_rgba8(),
            width,
            height,
            FilterType::Triangle,
        ))
    }
}
