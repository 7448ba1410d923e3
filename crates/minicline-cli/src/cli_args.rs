use clap::{ArgAction, Parser};
use minicline_weather::{TemperatureUnit, DEFAULT_WEATHER_BASE_URL};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_temperature_unit(value: &str) -> Result<TemperatureUnit, String> {
    value.parse::<TemperatureUnit>()
}

fn parse_location(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("location must be non-empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "minicline",
    about = "Sidebar weather panel driven over an in-process ProtoBus channel",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "MINICLINE_LOCATION",
        default_value = "Seattle, WA",
        value_parser = parse_location,
        help = "Location passed to WeatherService.getWeather"
    )]
    pub(crate) location: String,

    #[arg(
        long,
        env = "MINICLINE_UNIT",
        default_value = "F",
        value_parser = parse_temperature_unit,
        help = "Temperature unit requested from the weather provider (F or C)"
    )]
    pub(crate) unit: TemperatureUnit,

    #[arg(
        long = "weather-base-url",
        env = "MINICLINE_WEATHER_BASE_URL",
        default_value = DEFAULT_WEATHER_BASE_URL,
        help = "Base URL of a wttr.in-compatible weather endpoint"
    )]
    pub(crate) weather_base_url: String,

    #[arg(
        long = "weather-timeout-ms",
        env = "MINICLINE_WEATHER_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout in milliseconds for weather provider lookups"
    )]
    pub(crate) weather_timeout_ms: u64,

    #[arg(
        long = "call-timeout-ms",
        env = "MINICLINE_CALL_TIMEOUT_MS",
        default_value_t = 15_000,
        help = "Client-side deadline in milliseconds for each ProtoBus call (0 disables)"
    )]
    pub(crate) call_timeout_ms: u64,

    #[arg(
        long = "reject-malformed-responses",
        env = "MINICLINE_REJECT_MALFORMED_RESPONSES",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Fail a pending call when its response carries neither message nor error instead of waiting"
    )]
    pub(crate) reject_malformed_responses: bool,

    #[arg(
        long = "list-services",
        env = "MINICLINE_LIST_SERVICES",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Print the registered service/method table and exit"
    )]
    pub(crate) list_services: bool,
}
