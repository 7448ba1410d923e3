use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Temperature scale requested by the panel.
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fahrenheit => "F",
            Self::Celsius => "C",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "F" | "FAHRENHEIT" => Ok(Self::Fahrenheit),
            "C" | "CELSIUS" => Ok(Self::Celsius),
            other => Err(format!(
                "unsupported temperature unit '{other}': expected F or C"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWeatherRequest {
    pub location: String,
    #[serde(default)]
    pub unit: TemperatureUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWeatherResponse {
    pub skytext: String,
    pub temperature: String,
    #[serde(rename = "degreeType")]
    pub degree_type: String,
}
