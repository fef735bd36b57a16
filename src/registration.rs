//! Client for the signalling service that owns per-camera publishing endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::RegistrationError;
use crate::pipeline::{endpoint_id, endpoint_url};
use crate::session::Role;

/// Creates and deletes the remote endpoint of one role within a room.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(
        &self,
        base_url: &str,
        room: &str,
        role: Role,
        display_label: &str,
    ) -> Result<(), RegistrationError>;

    async fn deregister(&self, base_url: &str, room: &str, role: Role)
        -> Result<(), RegistrationError>;
}

pub struct SignallingClient {
    client: Client,
}

impl SignallingClient {
    pub fn new(timeout: Duration) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(RegistrationError::Client)?;
        Ok(SignallingClient { client })
    }

    fn check(url: String, response: reqwest::Response) -> Result<(), RegistrationError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RegistrationError::Rejected { url, status })
        }
    }
}

#[async_trait]
impl Registrar for SignallingClient {
    async fn register(
        &self,
        base_url: &str,
        room: &str,
        role: Role,
        display_label: &str,
    ) -> Result<(), RegistrationError> {
        let url = format!("{}/create", base_url.trim_end_matches('/'));
        let body = json!({
            "id": endpoint_id(room, role),
            "room": room,
            "label": display_label,
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(source) => return Err(RegistrationError::Request { url, source }),
        };
        Self::check(url, response)
    }

    async fn deregister(
        &self,
        base_url: &str,
        room: &str,
        role: Role,
    ) -> Result<(), RegistrationError> {
        let url = endpoint_url(base_url, room, role);

        let response = match self.client.delete(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(RegistrationError::Request { url, source }),
        };
        Self::check(url, response)
    }
}
