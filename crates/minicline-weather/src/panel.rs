//! View-model for the sidebar panel's "Current Weather" section.

use minicline_protobus::CallError;

use crate::GetWeatherResponse;

pub const LOADING_SUMMARY: &str = "Getting weather...";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WeatherPanel {
    #[default]
    Idle,
    Loading,
    Loaded {
        icon: &'static str,
        summary: String,
    },
    Failed(String),
}

impl WeatherPanel {
    pub fn loaded(response: &GetWeatherResponse) -> Self {
        Self::Loaded {
            icon: weather_icon(&response.skytext),
            summary: weather_summary(response),
        }
    }

    pub fn from_result(result: &Result<GetWeatherResponse, CallError>) -> Self {
        match result {
            Ok(response) => Self::loaded(response),
            Err(error) => Self::Failed(error.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Loaded { .. } | Self::Failed(_))
    }

    pub fn render(&self) -> String {
        match self {
            Self::Idle => String::new(),
            Self::Loading => LOADING_SUMMARY.to_string(),
            Self::Loaded { icon, summary } => format!("{icon} {summary}"),
            Self::Failed(message) => message.clone(),
        }
    }
}

pub fn weather_summary(response: &GetWeatherResponse) -> String {
    format!(
        "{}, {}{}",
        response.skytext, response.temperature, response.degree_type
    )
}

pub fn weather_icon(skytext: &str) -> &'static str {
    match skytext.trim().to_ascii_lowercase().as_str() {
        "sunny" | "clear" => "☀️",
        "mostly sunny" => "🌤",
        "partly sunny" | "fair" => "🌥",
        "mostly cloudy" | "cloudy" => "☁️",
        "rain showers" => "🌦",
        _ => "✨",
    }
}
