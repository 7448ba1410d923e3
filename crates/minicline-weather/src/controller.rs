use std::sync::Arc;

use crate::WeatherProvider;

/// Execution context handed to every host-side handler.
#[derive(Clone)]
pub struct Controller {
    weather: Arc<dyn WeatherProvider>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(weather: Arc<dyn WeatherProvider>) -> Self {
        Self { weather }
    }

    pub fn weather_provider(&self) -> &dyn WeatherProvider {
        self.weather.as_ref()
    }
}
