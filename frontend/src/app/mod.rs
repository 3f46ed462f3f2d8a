pub mod config;
pub mod engine;
pub mod layer;
pub mod map_host;
pub mod radar;
pub mod style;
pub mod utils;
