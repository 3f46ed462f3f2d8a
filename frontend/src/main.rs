mod app;

slint::include_modules!();

extern crate pretty_env_logger;
#[macro_use] extern crate log;

use std::time::Duration;
use std::thread;
use std::sync::mpsc;

/// Cadence of the optional radar auto-refresh
const REFRESH_PERIOD: Duration = Duration::from_secs(60);

fn main() -> Result<(), slint::PlatformError> {
    pretty_env_logger::init();

    info!("Starting weather radar frontend...");

    let config = app::config::AppConfig::from_env();
    let main_window = MainWindow::new()?;

    app::radar::setup_legend(&main_window);

    // Hard startup precondition: without an access token the map is never
    // constructed and the window shows the configuration screen instead
    let access_token = match config.require_map_token() {
        Ok(token) => token.to_string(),
        Err(e) => {
            error!("{}", e);
            main_window.set_config_error(true);
            main_window.set_config_error_message(e.to_string().into());
            return main_window.run();
        }
    };

    app::map_host::init(&main_window, &access_token);

    // Set up callback handlers using the modular functions
    app::map_host::setup_map_callbacks(&main_window);
    app::radar::setup_radar_callbacks(&main_window, &config.api_base_url);

    // Initial radar load
    app::radar::spawn_load(&main_window, &config.api_base_url);

    if config.auto_refresh {
        // Channel for communication between background thread and UI thread
        let (tx, rx) = mpsc::channel();

        // Spawn background thread for periodic radar updates
        thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let mut interval = tokio::time::interval(REFRESH_PERIOD);
                interval.tick().await; // Skip immediate first trigger
                loop {
                    interval.tick().await;
                    // Signal the UI thread to refetch radar data
                    if tx.send(()).is_err() {
                        // UI thread has shut down
                        break;
                    }
                }
            });
        });

        // Handle refresh ticks in the UI thread
        let main_window_weak = main_window.as_weak();
        let base_url = config.api_base_url.clone();
        let _refresh_handle = thread::spawn(move || {
            while let Ok(()) = rx.recv() {
                debug!("Refresh tick");
                let window_weak = main_window_weak.clone();
                let base_url = base_url.clone();
                // The event loop may already be gone on shutdown
                let _ = slint::invoke_from_event_loop(move || {
                    if let Some(window) = window_weak.upgrade() {
                        app::radar::spawn_load(&window, &base_url);
                    }
                });
            }
        });

        info!("Auto-refresh enabled, every {}s", REFRESH_PERIOD.as_secs());
    }

    info!("Weather radar frontend started successfully");

    // Run the main window - this blocks until the window is closed
    let result = main_window.run();

    info!("Main window closed, shutting down...");
    app::map_host::destroy();
    result
}
