//! Posts escrow records to a Crypt Server checkin endpoint.

use crate::error::{EscrowError, EscrowResult};
use crate::record::{EscrowRecord, EscrowResponse, ServerEndpoint};
use log::{debug, info};
use reqwest::blocking::Client;
use std::time::Duration;

/// Sends escrow records over a blocking HTTP client.
///
/// One poster may be reused for many submissions; each call is independent
/// and nothing is retried.
#[derive(Debug, Clone)]
pub struct EscrowPoster {
    client: Client,
}

impl EscrowPoster {
    /// Poster backed by a client with the library's default settings.
    pub fn new() -> EscrowResult<Self> {
        let client = Client::builder().build().map_err(EscrowError::Client)?;
        Ok(Self { client })
    }

    /// Poster whose requests are abandoned after `timeout`.
    pub fn with_timeout(timeout: Duration) -> EscrowResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EscrowError::Client)?;
        Ok(Self { client })
    }

    /// Poster around a caller-configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// POST `record` as a urlencoded form to `endpoint`.
    ///
    /// Any HTTP status, including 4xx and 5xx, comes back as `Ok`; only
    /// failures to complete the exchange are errors.
    pub fn submit(
        &self,
        record: &EscrowRecord,
        endpoint: &ServerEndpoint,
    ) -> EscrowResult<EscrowResponse> {
        let url = endpoint.target_url()?;
        let target = url.to_string();
        let auth = endpoint.basic_auth();

        info!(
            "escrowing recovery key for serial {} (host {}) to {target} [basic auth: {}]",
            record.serial_number,
            record.hostname,
            auth.is_some()
        );

        let mut request = self.client.post(url).form(&record.form_fields());
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }

        let transport = |source| EscrowError::Transport {
            target: target.clone(),
            source,
        };

        let response = request.send().map_err(transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().map_err(transport)?.to_vec();

        debug!("{target} answered {status} ({} byte body)", body.len());

        Ok(EscrowResponse {
            status,
            headers,
            body,
        })
    }
}

/// Submit once with a freshly built default poster.
pub fn submit(record: &EscrowRecord, endpoint: &ServerEndpoint) -> EscrowResult<EscrowResponse> {
    EscrowPoster::new()?.submit(record, endpoint)
}
