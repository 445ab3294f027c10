use anyhow::Context;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::Config;
use crate::reading::SensorReading;
use crate::synthetic;

/// Why a live reading could not be used.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("server responded with {0}")]
    Status(StatusCode),
    #[error("malformed response body: {0}")]
    Body(#[source] reqwest::Error),
}

impl Fault {
    /// `true` when the endpoint was never reached or never answered.
    pub fn is_transport(&self) -> bool {
        matches!(self, Fault::Transport(_))
    }
}

/// The outcome of one acquisition. `fault` holds whatever was absorbed on the
/// way to `reading`.
#[derive(Debug)]
pub struct Acquisition {
    pub reading: SensorReading,
    pub fault: Option<Fault>,
}

#[derive(Debug, Clone)]
pub struct SensorClient {
    http: Client,
    base_url: Url,
}

impl SensorClient {
    pub fn new(config: &Config) -> Result<Self, anyhow::Error> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self::with_http(http, config.base_url.clone()))
    }

    pub fn with_http(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn sensor_url(&self, id: u32) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), id)
    }

    pub async fn fetch_live(&self, id: u32) -> Result<SensorReading, Fault> {
        let url = self.sensor_url(id);
        log::debug!("GET {url}");

        let response = self.http.get(&url).send().await.map_err(Fault::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Fault::Status(status));
        }

        response.json::<SensorReading>().await.map_err(|e| {
            // A body that stops arriving mid-read is still a transport problem.
            if e.is_timeout() || e.is_connect() {
                Fault::Transport(e)
            } else {
                Fault::Body(e)
            }
        })
    }

    /// Returns a reading for `id`, falling back to a synthetic one on any fault.
    pub async fn acquire(&self, id: u32) -> SensorReading {
        self.acquire_traced(id).await.reading
    }

    pub async fn acquire_traced(&self, id: u32) -> Acquisition {
        match self.fetch_live(id).await {
            Ok(reading) => Acquisition {
                reading,
                fault: None,
            },
            Err(fault) => {
                if fault.is_transport() {
                    log::warn!("Sensor {id}: {fault}, using simulated data");
                } else {
                    log::error!("Sensor {id}: {fault}, using simulated data");
                }
                Acquisition {
                    reading: synthetic::synthesize_now(id),
                    fault: Some(fault),
                }
            }
        }
    }
}
