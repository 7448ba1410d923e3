//! `WeatherService` for the minicline sidebar panel.
//!
//! Host side: [`weather_service_handlers`] registers `WeatherService.getWeather` against a
//! [`Controller`] wrapping a [`WeatherProvider`]. Webview side: [`WeatherServiceClient`] issues
//! the typed call and [`WeatherPanel`] turns its result into what the panel shows.

pub mod controller;
pub mod panel;
pub mod provider;
pub mod service;
pub mod types;

pub use controller::*;
pub use panel::*;
pub use provider::*;
pub use service::*;
pub use types::*;
