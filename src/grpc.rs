use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::config::{self, ClientConfig};
use crate::error::ActivationError;
use crate::proto::activate::activate_client::ActivateClient;
use crate::proto::activate::{ActivateRequest, ActivateResponse};

/// ActivateTransport は Activate RPC を 1 回発行するトレイト。
/// 実装は複数タスクからの同時呼び出しに対して安全でなければならない。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ActivateTransport: Send + Sync {
    async fn activate(&self, request: ActivateRequest)
        -> Result<ActivateResponse, ActivationError>;
}

/// GrpcActivateTransport は tonic の Channel 経由で decision service を呼び出す。
#[derive(Debug, Clone)]
pub struct GrpcActivateTransport {
    client: ActivateClient<Channel>,
    timeout: Option<Duration>,
}

impl GrpcActivateTransport {
    /// 接続を遅延確立するチャネルを作成する。ネットワーク I/O は行わず、
    /// 接続エラーは最初の呼び出しで返る。tokio ランタイム内で呼び出すこと。
    pub fn connect_lazy(cfg: &ClientConfig) -> Result<Self, ActivationError> {
        let channel = endpoint(cfg)?.connect_lazy();
        Ok(Self::from_channel(channel, cfg.timeout()))
    }

    /// エンドポイントへ即時に接続する。
    pub async fn connect(cfg: &ClientConfig) -> Result<Self, ActivationError> {
        let channel = endpoint(cfg)?.connect().await?;
        Ok(Self::from_channel(channel, cfg.timeout()))
    }

    pub fn from_channel(channel: Channel, timeout: Option<Duration>) -> Self {
        Self {
            client: ActivateClient::new(channel),
            timeout,
        }
    }
}

fn endpoint(cfg: &ClientConfig) -> Result<Endpoint, ActivationError> {
    config::validate(cfg).map_err(|e| ActivationError::InvalidArgument(e.to_string()))?;
    let uri = cfg.endpoint_uri();
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| ActivationError::InvalidArgument(format!("invalid endpoint {uri}: {e}")))?
        .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms));
    Ok(endpoint)
}

#[async_trait]
impl ActivateTransport for GrpcActivateTransport {
    async fn activate(
        &self,
        request: ActivateRequest,
    ) -> Result<ActivateResponse, ActivationError> {
        let mut request = tonic::Request::new(request);
        // grpc-timeout ヘッダでサーバー側にも期限を伝える
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
        let response = self.client.clone().activate(request).await?;
        Ok(response.into_inner())
    }
}
