use serde::Deserialize;
use std::time::Duration;
use windrift_types::{Coordinate, WindVector};

#[derive(Debug, thiserror::Error)]
pub enum WindError {
    #[error("wind request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("wind API returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("wind API response carries no wind block")]
    MissingWind,
    #[error("wind fetch timed out")]
    Timeout,
}

/// Read-only oracle for the wind vector at a coordinate.
pub trait WindSource: Send + Sync {
    fn fetch(
        &self,
        coord: Coordinate,
    ) -> impl Future<Output = Result<WindVector, WindError>> + Send;
}

/// OpenWeatherMap current-weather client. Queried in imperial units so the
/// reported speed is already mph.
pub struct OpenWeatherMap {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

const OPENWEATHERMAP_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    wind: Option<WindBlock>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
    // Omitted upstream when the air is calm
    deg: Option<f64>,
}

impl OpenWeatherMap {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, WindError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: OPENWEATHERMAP_URL.to_string(),
        })
    }
}

impl WindSource for OpenWeatherMap {
    async fn fetch(&self, coord: Coordinate) -> Result<WindVector, WindError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", coord.lat.to_string()),
                ("lon", coord.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "imperial".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WindError::Status(response.status()));
        }

        let body: WeatherResponse = response.json().await?;
        let wind = body.wind.ok_or(WindError::MissingWind)?;

        Ok(WindVector {
            speed_mph: wind.speed,
            bearing_degrees: wind.deg.unwrap_or(0.0),
        })
    }
}
