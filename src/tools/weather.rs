//! Current-weather tools backed by the Open-Meteo forecast API

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ArgSchema, FieldKind, Tool, ToolArgs};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
is_day,precipitation,rain,showers,snowfall";

/// Current conditions at a location
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentWeather {
    pub temperature_2m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub is_day: Option<u8>,
    pub precipitation: Option<f64>,
    pub rain: Option<f64>,
    pub showers: Option<f64>,
    pub snowfall: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentWeather>,
}

/// Open-Meteo HTTP client
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for WeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WeatherClient {
    /// Client for the public Open-Meteo endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client for a custom endpoint (self-hosted instance, tests)
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch current conditions
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response has no current block
    pub async fn current(&self, latitude: f64, longitude: f64) -> Result<CurrentWeather> {
        let response = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ])
            .send()
            .await?;

        let response = response.error_for_status().map_err(Error::Http)?;
        let forecast: ForecastResponse = response.json().await?;

        forecast
            .current
            .ok_or_else(|| Error::Tool("weather response has no current conditions".to_string()))
    }
}

/// Which piece of the current weather a tool reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherQuery {
    Temperature,
    Humidity,
    ApparentTemperature,
    DayOrNight,
    Precipitation,
    Rain,
    Showers,
    Snowfall,
    FullReport,
}

impl WeatherQuery {
    /// Every query, in report order
    pub const ALL: [Self; 9] = [
        Self::Temperature,
        Self::Humidity,
        Self::ApparentTemperature,
        Self::DayOrNight,
        Self::Precipitation,
        Self::Rain,
        Self::Showers,
        Self::Snowfall,
        Self::FullReport,
    ];

    const fn tool_name(self) -> &'static str {
        match self {
            Self::Temperature => "get_temperature",
            Self::Humidity => "get_relative_humidity",
            Self::ApparentTemperature => "get_apparent_temperature",
            Self::DayOrNight => "get_day_or_night",
            Self::Precipitation => "get_precipitation",
            Self::Rain => "get_rain",
            Self::Showers => "get_showers",
            Self::Snowfall => "get_snowfall",
            Self::FullReport => "get_full_weather_report",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature at 2 meters height for a location.",
            Self::Humidity => "Relative humidity at 2 meters height for a location.",
            Self::ApparentTemperature => "Apparent (feels-like) temperature for a location.",
            Self::DayOrNight => "Whether it is currently day or night at a location.",
            Self::Precipitation => "Current precipitation for a location.",
            Self::Rain => "Current rain for a location.",
            Self::Showers => "Current showers for a location.",
            Self::Snowfall => "Current snowfall for a location.",
            Self::FullReport => "Full current weather report for a location.",
        }
    }

    /// Render one query against fetched conditions
    #[must_use]
    pub fn format(self, weather: &CurrentWeather, latitude: f64, longitude: f64) -> String {
        let line = |label: &str, value: Option<f64>, unit: &str| {
            value.map_or_else(
                || format!("{label}: N/A{unit}"),
                |v| format!("{label}: {v}{unit}"),
            )
        };

        match self {
            Self::Temperature => line("Temperature", weather.temperature_2m, "°C"),
            Self::Humidity => line("Relative Humidity", weather.relative_humidity_2m, "%"),
            Self::ApparentTemperature => {
                line("Apparent Temperature", weather.apparent_temperature, "°C")
            }
            Self::DayOrNight => {
                if weather.is_day.unwrap_or(0) == 0 {
                    "It is currently night.".to_string()
                } else {
                    "It is currently day.".to_string()
                }
            }
            Self::Precipitation => line("Precipitation", weather.precipitation, "mm"),
            Self::Rain => line("Rain", weather.rain, "mm"),
            Self::Showers => line("Showers", weather.showers, "mm"),
            Self::Snowfall => line("Snowfall", weather.snowfall, "mm"),
            Self::FullReport => {
                let mut report =
                    vec![format!("Weather Report for coordinates ({latitude}, {longitude}):")];
                report.extend(
                    Self::ALL
                        .iter()
                        .filter(|q| **q != Self::FullReport)
                        .map(|q| q.format(weather, latitude, longitude)),
                );
                report.join("\n")
            }
        }
    }
}

/// One weather tool per [`WeatherQuery`]
pub struct WeatherTool {
    query: WeatherQuery,
    client: Arc<WeatherClient>,
    schema: ArgSchema,
}

impl WeatherTool {
    /// Create a tool answering `query`
    #[must_use]
    pub fn new(query: WeatherQuery, client: Arc<WeatherClient>) -> Self {
        Self {
            query,
            client,
            schema: coordinates_schema(),
        }
    }

    /// The full family of weather tools sharing one client
    #[must_use]
    pub fn all(client: &Arc<WeatherClient>) -> Vec<Arc<dyn Tool>> {
        WeatherQuery::ALL
            .into_iter()
            .map(|q| Arc::new(Self::new(q, Arc::clone(client))) as Arc<dyn Tool>)
            .collect()
    }
}

fn coordinates_schema() -> ArgSchema {
    ArgSchema::new()
        .required(
            "latitude",
            FieldKind::Number {
                min: Some(-90.0),
                max: Some(90.0),
            },
            "Latitude of the location in degrees",
        )
        .required(
            "longitude",
            FieldKind::Number {
                min: Some(-180.0),
                max: Some(180.0),
            },
            "Longitude of the location in degrees",
        )
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        self.query.tool_name()
    }

    fn description(&self) -> &str {
        self.query.description()
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn call(&self, args: ToolArgs) -> Result<String> {
        let latitude = args.f64("latitude")?;
        let longitude = args.f64("longitude")?;

        let weather = self.client.current(latitude, longitude).await?;
        Ok(self.query.format(&weather, latitude, longitude))
    }
}
