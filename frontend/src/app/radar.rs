//! Data refresh controller for the radar feed.
//!
//! Owns the loading/data/error state, mirrors it into window properties,
//! and hands fresh data to the map host. Fetches run on worker threads;
//! state changes happen on the UI thread only.

use std::sync::Mutex;
use std::thread;

use chrono::Utc;
use once_cell::sync::Lazy;
use radarapi::{ApiError, RadarApi, RadarData, RadarResponse};
use slint::{ComponentHandle, ModelRc, VecModel};

use crate::app::{map_host, style, utils};
use crate::{LegendEntry, MainWindow};

/// Controller state. Every finished fetch replaces data and error
/// wholesale: success clears any prior error, failure clears prior data.
#[derive(Debug, Clone, Default)]
pub struct RadarState {
    pub data: Option<RadarResponse>,
    pub loading: bool,
    pub error: Option<ApiError>,
}

impl RadarState {
    /// Begin a load: loading set, prior error cleared, data kept visible
    pub fn begin_load(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Finish a load; loading always clears, whatever the outcome
    pub fn finish_load(&mut self, result: Result<RadarResponse, ApiError>) {
        match result {
            Ok(response) => {
                self.data = Some(response);
                self.error = None;
            }
            Err(err) => {
                self.data = None;
                self.error = Some(err);
            }
        }
        self.loading = false;
    }
}

static RADAR_STATE: Lazy<Mutex<RadarState>> = Lazy::new(|| Mutex::new(RadarState::default()));

/// Snapshot of the current feature collection, if any
pub fn current_data() -> Option<RadarData> {
    let state = RADAR_STATE.lock().unwrap();
    state.data.as_ref().map(|response| response.data.clone())
}

/// Kick off a fetch on a worker thread; the result lands on the UI thread.
/// Overlapping fetches are not serialized: the request is an idempotent
/// read and the last writer wins.
pub fn spawn_load(main_window: &MainWindow, api_base_url: &str) {
    {
        let mut state = RADAR_STATE.lock().unwrap();
        state.begin_load();
    }
    push_state(main_window);

    let base_url = api_base_url.to_string();
    let window_weak = main_window.as_weak();
    thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(async {
            let api = RadarApi::new(&base_url)?;
            api.fetch_latest().await
        });
        // The event loop may already be gone on shutdown
        let _ = slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                finish_load_on_ui(&window, result);
            }
        });
    });
}

fn finish_load_on_ui(main_window: &MainWindow, result: Result<RadarResponse, ApiError>) {
    let loaded = match &result {
        Ok(response) => {
            info!("Radar data loaded: {} features", response.data.features.len());
            true
        }
        Err(e) => {
            error!("Radar fetch failed: {}", e);
            false
        }
    };

    {
        let mut state = RADAR_STATE.lock().unwrap();
        state.finish_load(result);
    }
    push_state(main_window);

    if loaded {
        map_host::schedule_radar_update(main_window);
    }
}

/// Mirror controller state into window properties
pub fn push_state(main_window: &MainWindow) {
    let state = RADAR_STATE.lock().unwrap().clone();

    main_window.set_loading(state.loading);
    main_window.set_has_error(state.error.is_some());
    if let Some(err) = &state.error {
        main_window.set_error_kind(err.kind.clone().into());
        main_window.set_error_message(err.message.clone().into());
    }

    match &state.data {
        Some(response) => {
            let age = utils::format_relative_time(response.last_updated, Utc::now());
            main_window.set_last_updated_text(format!("Updated {}", age).into());
            match response.data_timestamp {
                Some(ts) => main_window
                    .set_data_time_text(format!("Data: {}", utils::format_absolute_time(ts)).into()),
                None => main_window.set_data_time_text("".into()),
            }
        }
        None => {
            if state.loading {
                main_window.set_last_updated_text("Loading radar data…".into());
            } else {
                main_window.set_last_updated_text("No data available".into());
            }
            main_window.set_data_time_text("".into());
        }
    }
}

pub fn setup_radar_callbacks(main_window: &MainWindow, api_base_url: &str) {
    let base_url = api_base_url.to_string();
    let window_weak = main_window.as_weak();
    main_window.on_retry_clicked(move || {
        debug!("Retry clicked, refetching radar data");
        let window_weak = window_weak.clone();
        let base_url = base_url.clone();
        slint::invoke_from_event_loop(move || {
            if let Some(window) = window_weak.upgrade() {
                spawn_load(&window, &base_url);
            }
        })
        .unwrap();
    });
}

/// Populate the static reflectivity legend
pub fn setup_legend(main_window: &MainWindow) {
    let entries: Vec<LegendEntry> = style::DBZ_RANGES
        .iter()
        .map(|(label, color)| LegendEntry {
            color: slint::Color::from_argb_u8(color[3], color[0], color[1], color[2]),
            label: slint::SharedString::from(*label),
        })
        .collect();
    main_window.set_legend_entries(ModelRc::new(VecModel::from(entries)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use radarapi::RadarPoint;

    fn sample_response() -> RadarResponse {
        RadarResponse {
            data: RadarData::new(vec![RadarPoint::new(-100.0, 40.0, 35.0)]),
            last_updated: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            data_timestamp: Some(Utc.with_ymd_and_hms(2025, 6, 1, 11, 58, 0).unwrap()),
        }
    }

    #[test]
    fn test_successful_fetch_stores_data_and_clears_error() {
        let mut state = RadarState::default();
        state.begin_load();
        assert!(state.loading);
        assert!(state.error.is_none());

        state.finish_load(Ok(sample_response()));
        assert!(!state.loading);
        assert!(state.data.is_some());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_failed_fetch_stores_error_and_clears_data() {
        let mut state = RadarState::default();
        state.finish_load(Ok(sample_response()));
        assert!(state.data.is_some());

        state.begin_load();
        state.finish_load(Err(ApiError::new("ServiceUnavailable", "Upstream timed out")));
        assert!(!state.loading);
        assert!(state.data.is_none());

        let err = state.error.expect("error should be stored");
        assert_eq!(err.kind, "ServiceUnavailable");
        assert_eq!(err.message, "Upstream timed out");
    }

    #[test]
    fn test_refetch_clears_prior_error_while_loading() {
        let mut state = RadarState::default();
        state.finish_load(Err(ApiError::unknown()));
        assert!(state.error.is_some());

        state.begin_load();
        assert!(state.loading);
        assert!(state.error.is_none());
    }
}
