use std::sync::Arc;

use minicline_protobus::{
    CallError, HandlerError, ProtoBusClient, RegistrationError, ServiceHandlers,
};

use crate::{Controller, GetWeatherRequest, GetWeatherResponse, WeatherQuery};

pub const WEATHER_SERVICE: &str = "WeatherService";
pub const GET_WEATHER_METHOD: &str = "getWeather";

/// `WeatherService.getWeather`: one provider lookup per request.
pub async fn get_weather(
    controller: Arc<Controller>,
    request: GetWeatherRequest,
) -> Result<GetWeatherResponse, HandlerError> {
    let location = request.location.trim();
    if location.is_empty() {
        return Err(HandlerError::new("location must be non-empty"));
    }
    let query = WeatherQuery {
        location: location.to_string(),
        unit: request.unit,
    };
    let conditions = controller
        .weather_provider()
        .current_conditions(&query)
        .await
        .map_err(|error| HandlerError::new(error.to_string()))?;
    tracing::debug!(
        location = %query.location,
        skytext = %conditions.skytext,
        "resolved current weather"
    );
    Ok(GetWeatherResponse {
        skytext: conditions.skytext,
        temperature: conditions.temperature,
        degree_type: conditions.degree_type.to_string(),
    })
}

/// Dispatch table exposing every weather rpc.
pub fn weather_service_handlers() -> Result<ServiceHandlers<Controller>, RegistrationError> {
    ServiceHandlers::builder()
        .unary(WEATHER_SERVICE, GET_WEATHER_METHOD, get_weather)
        .build()
}

/// Typed webview-side stub for `WeatherService`.
#[derive(Debug, Clone)]
pub struct WeatherServiceClient {
    client: ProtoBusClient,
}

impl WeatherServiceClient {
    pub const SERVICE_NAME: &'static str = WEATHER_SERVICE;

    pub fn new(client: ProtoBusClient) -> Self {
        Self { client }
    }

    pub async fn get_weather(
        &self,
        request: &GetWeatherRequest,
    ) -> Result<GetWeatherResponse, CallError> {
        self.client
            .make_unary_request(Self::SERVICE_NAME, GET_WEATHER_METHOD, request)
            .await
    }
}
