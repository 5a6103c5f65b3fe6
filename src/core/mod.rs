pub mod alerts;
pub mod config;
pub mod error;
pub mod geo;
pub mod map_view;
pub mod model;
pub mod source;
pub mod stops;
pub mod tracking;
