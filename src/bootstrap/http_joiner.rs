use crate::bootstrap::PeerJoiner;
use crate::error::{JoinStatus, PeerJoinError};
use crate::types::{JoinRequest, JoinResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const JOIN_PATH: &str = "/cluster/join";

const CONNECT_RETRIES: u32 = 2;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

impl JoinStatus {
    pub fn from_http(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => JoinStatus::ResourceExhausted,
            StatusCode::SERVICE_UNAVAILABLE => JoinStatus::Unavailable,
            StatusCode::NOT_FOUND => JoinStatus::NotFound,
            StatusCode::BAD_REQUEST => JoinStatus::InvalidArgument,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                JoinStatus::DeadlineExceeded
            }
            _ => JoinStatus::Internal,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            JoinStatus::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            JoinStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            JoinStatus::NotFound => StatusCode::NOT_FOUND,
            JoinStatus::InvalidArgument => StatusCode::BAD_REQUEST,
            JoinStatus::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            JoinStatus::Cancelled | JoinStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `PeerJoiner` speaking JSON over HTTP to the `/cluster/join` route.
#[derive(Clone)]
pub struct HttpPeerJoiner {
    client: reqwest::Client,
}

impl HttpPeerJoiner {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn send(&self, address: &str, request: &JoinRequest) -> Result<JoinResponse, PeerJoinError> {
        let url = format!("http://{}{}", address, JOIN_PATH);

        let mut retries = 0;
        let response = loop {
            match self.client.post(&url).json(request).send().await {
                Ok(response) => break response,
                Err(e) if e.is_connect() && retries < CONNECT_RETRIES => {
                    retries += 1;
                    debug!(address = %address, retry = retries, "join connect failed, retrying: {}", e);
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => return Err(transport_error(e)),
            }
        };

        let status = response.status();
        if status.is_success() {
            return response.json::<JoinResponse>().await.map_err(|e| {
                PeerJoinError::new(JoinStatus::Internal, format!("invalid join response: {}", e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<PeerJoinError>(&body) {
            Ok(err) => Err(err),
            Err(_) => Err(PeerJoinError::new(
                JoinStatus::from_http(status),
                format!("HTTP {}: {}", status, body),
            )),
        }
    }
}

fn transport_error(e: reqwest::Error) -> PeerJoinError {
    if e.is_timeout() {
        PeerJoinError::new(JoinStatus::DeadlineExceeded, e.to_string())
    } else {
        PeerJoinError::new(JoinStatus::Unavailable, e.to_string())
    }
}

#[async_trait]
impl PeerJoiner for HttpPeerJoiner {
    async fn join(
        &self,
        cancel: &CancellationToken,
        address: &str,
        request: &JoinRequest,
    ) -> Result<JoinResponse, PeerJoinError> {
        tokio::select! {
            _ = cancel.cancelled() => {
                Err(PeerJoinError::new(JoinStatus::Cancelled, "join cancelled"))
            }
            result = self.send(address, request) => result,
        }
    }
}
