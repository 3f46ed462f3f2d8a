//! Single-owner handle for the map engine.
//!
//! The engine is created once per window, mutated only from the UI event
//! loop, and destroyed on teardown. Basemap snapshots are fetched on worker
//! threads and applied back on the UI thread; an epoch counter discards
//! snapshots that arrive for a stale camera or after teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use mapbox::{MapboxApi, TileError};
use once_cell::sync::Lazy;
use slint::ComponentHandle;

use crate::app::engine::{MapEngine, MapOptions};
use crate::app::{layer, radar, utils};
use crate::MainWindow;

struct MapHost {
    engine: Option<MapEngine>,
    basemap: Option<MapboxApi>,
    /// Bumped on every camera change and on teardown
    epoch: u64,
}

static MAP_HOST: Lazy<Mutex<MapHost>> = Lazy::new(|| {
    Mutex::new(MapHost {
        engine: None,
        basemap: None,
        epoch: 0,
    })
});

static FULLSCREEN: AtomicBool = AtomicBool::new(false);

/// Create the engine with the default camera and request the first basemap
/// snapshot. A second call while an instance is live is a no-op.
pub fn init(main_window: &MainWindow, access_token: &str) {
    {
        let mut host = MAP_HOST.lock().unwrap();
        if host.engine.is_some() {
            debug!("Map already initialized, ignoring");
            return;
        }
        host.engine = Some(MapEngine::new(MapOptions::default()));
        host.basemap = Some(MapboxApi::new(access_token));
        info!("Map engine initialized");
    }
    refresh_basemap(main_window);
}

/// Tear down the engine and orphan any in-flight snapshot
pub fn destroy() {
    let mut host = MAP_HOST.lock().unwrap();
    host.epoch = host.epoch.wrapping_add(1);
    host.basemap = None;
    if host.engine.take().is_some() {
        info!("Map engine destroyed");
    }
}

pub fn setup_map_callbacks(main_window: &MainWindow) {
    let window_weak = main_window.as_weak();
    main_window.on_zoom_in_clicked(move || {
        let window_weak = window_weak.clone();
        slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                nudge_zoom(&window, 1.0);
            }
        })
        .unwrap();
    });

    let window_weak = main_window.as_weak();
    main_window.on_zoom_out_clicked(move || {
        let window_weak = window_weak.clone();
        slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                nudge_zoom(&window, -1.0);
            }
        })
        .unwrap();
    });

    let window_weak = main_window.as_weak();
    main_window.on_fullscreen_clicked(move || {
        if let Some(window) = window_weak.upgrade() {
            let fullscreen = !FULLSCREEN.load(Ordering::Relaxed);
            FULLSCREEN.store(fullscreen, Ordering::Relaxed);
            debug!("Fullscreen toggled: {}", fullscreen);
            window.window().set_fullscreen(fullscreen);
        }
    });
}

fn nudge_zoom(main_window: &MainWindow, delta: f64) {
    {
        let mut host = MAP_HOST.lock().unwrap();
        let engine = match host.engine.as_mut() {
            Some(engine) => engine,
            None => return,
        };
        engine.zoom_by(delta);
        if engine.is_basemap_synced() {
            // Clamped at a zoom bound, camera did not move
            return;
        }
        debug!("Zoom changed to {:.2}", engine.viewport().zoom);
    }
    refresh_basemap(main_window);
}

/// Fetch a basemap snapshot for the current camera on a worker thread and
/// apply it on the UI thread. Late arrivals for an older epoch are dropped.
pub fn refresh_basemap(main_window: &MainWindow) {
    let (api, bounds, zoom, width, height, epoch) = {
        let mut host = MAP_HOST.lock().unwrap();
        host.epoch = host.epoch.wrapping_add(1);
        let epoch = host.epoch;
        let engine = match host.engine.as_ref() {
            Some(engine) => engine,
            None => return,
        };
        let api = match host.basemap.as_ref() {
            Some(api) => api.clone(),
            None => return,
        };
        let vp = engine.viewport();
        let zoom = vp.zoom.round().max(0.0) as u32;
        (api, engine.visible_bounds(), zoom, vp.width, vp.height, epoch)
    };

    let window_weak = main_window.as_weak();
    thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(api.snapshot(bounds, zoom, width, height));
        // The event loop may already be gone on shutdown
        let _ = slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                apply_basemap(&window, epoch, result);
            }
        });
    });
}

fn apply_basemap(
    main_window: &MainWindow,
    epoch: u64,
    result: Result<image::RgbaImage, TileError>,
) {
    let mut host = MAP_HOST.lock().unwrap();
    if host.epoch != epoch {
        debug!("Dropping basemap snapshot for stale epoch {}", epoch);
        return;
    }
    let engine = match host.engine.as_mut() {
        Some(engine) => engine,
        None => return,
    };

    match result {
        Ok(image) => {
            let first = !engine.is_style_loaded();
            engine.set_basemap(image);
            let frame = engine.render();
            drop(host);

            main_window.set_map_image(utils::rgba_to_slint_image(&frame));
            if first {
                info!("Basemap style loaded");
                main_window.set_map_ready(true);
                // Radar data may already be waiting on readiness
                schedule_radar_update(main_window);
            }
        }
        Err(TileError::Unauthorized(status)) => {
            error!(
                "Mapbox rejected the access token ({}); check MAPBOX_ACCESS_TOKEN",
                status
            );
        }
        Err(e) => {
            error!("Basemap snapshot failed: {}", e);
        }
    }
}

/// Defer the radar upsert by the settle delay, then run it on the UI thread
pub fn schedule_radar_update(main_window: &MainWindow) {
    let window_weak = main_window.as_weak();
    thread::spawn(move || {
        thread::sleep(layer::STYLE_SETTLE_DELAY);
        let _ = slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                apply_radar_layer(&window);
            }
        });
    });
}

/// Guarded upsert: runs only when the style is loaded and data is present.
/// Failures are logged and leave the previous layer on the map.
fn apply_radar_layer(main_window: &MainWindow) {
    let data = match radar::current_data() {
        Some(data) => data,
        None => {
            debug!("Radar upsert skipped: no data");
            return;
        }
    };

    let mut host = MAP_HOST.lock().unwrap();
    let engine = match host.engine.as_mut() {
        Some(engine) => engine,
        None => return,
    };

    match layer::update_radar_layer(engine, &data) {
        Ok(true) => {
            if engine.is_basemap_synced() {
                let frame = engine.render();
                drop(host);
                main_window.set_map_image(utils::rgba_to_slint_image(&frame));
            } else {
                drop(host);
                // The fit moved the camera; render once the matching
                // snapshot lands
                refresh_basemap(main_window);
            }
        }
        Ok(false) => {}
        Err(e) => {
            error!("Error setting up radar layer: {}", e);
        }
    }
}
