use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::attribute::{self, Attributes};
use crate::config::ClientConfig;
use crate::error::ActivationError;
use crate::grpc::{ActivateTransport, GrpcActivateTransport};
use crate::proto::activate::{ActivateRequest, User};

/// ClientState はクライアントの状態。Closed は終端状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    Closed,
}

/// ActivationClient は 1 つのエンドポイントへの接続を所有し、
/// 実験の variation を問い合わせるクライアント。
///
/// `activate` は `&self` で呼び出せるため、同一インスタンスを複数タスクから
/// 同時に利用できる。接続は `close` で明示的に解放する。
pub struct ActivationClient {
    transport: RwLock<Option<Arc<dyn ActivateTransport>>>,
    timeout: Option<Duration>,
}

impl ActivationClient {
    /// host:port への遅延接続クライアントを作成する。
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ActivationError> {
        Self::connect_lazy(&ClientConfig::new(host, port))
    }

    /// 接続を遅延確立するクライアントを作成する。接続エラーは最初の activate で返る。
    pub fn connect_lazy(cfg: &ClientConfig) -> Result<Self, ActivationError> {
        let transport = GrpcActivateTransport::connect_lazy(cfg)?;
        Ok(Self::with_transport(transport, cfg.timeout()))
    }

    /// エンドポイントへ即時に接続するクライアントを作成する。
    pub async fn connect(cfg: &ClientConfig) -> Result<Self, ActivationError> {
        let transport = GrpcActivateTransport::connect(cfg).await?;
        Ok(Self::with_transport(transport, cfg.timeout()))
    }

    pub fn with_transport<T>(transport: T, timeout: Option<Duration>) -> Self
    where
        T: ActivateTransport + 'static,
    {
        Self {
            transport: RwLock::new(Some(Arc::new(transport))),
            timeout,
        }
    }

    pub async fn state(&self) -> ClientState {
        if self.transport.read().await.is_some() {
            ClientState::Connected
        } else {
            ClientState::Closed
        }
    }

    /// ユーザーが割り当てられる variation を返す。
    ///
    /// 空文字列の variation もそのまま返す。リトライは行わない。
    #[instrument(skip(self, attributes), fields(attributes = attributes.len()))]
    pub async fn activate(
        &self,
        experiment_key: &str,
        user_id: &str,
        attributes: &Attributes,
    ) -> Result<String, ActivationError> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or(ActivationError::InvalidState)?;

        if experiment_key.is_empty() {
            return Err(ActivationError::InvalidArgument(
                "experiment_key must not be empty".to_string(),
            ));
        }
        if user_id.is_empty() {
            return Err(ActivationError::InvalidArgument(
                "user_id must not be empty".to_string(),
            ));
        }

        let request = ActivateRequest {
            experiment_key: experiment_key.to_string(),
            user: Some(User {
                id: user_id.to_string(),
                attributes: Some(attribute::encode(attributes)?),
            }),
        };

        debug!("dispatching Activate");
        let response = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, transport.activate(request))
                .await
                .map_err(|_| ActivationError::Timeout)??,
            None => transport.activate(request).await?,
        };
        debug!(variation = %response.variation, "received Activate response");

        Ok(response.variation)
    }

    /// 接続を解放して Closed に遷移する。複数回呼び出しても安全。
    pub async fn close(&self) {
        if self.transport.write().await.take().is_some() {
            debug!("activation client closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::MockActivateTransport;
    use crate::proto::activate::ActivateResponse;
    use prost_types::value::Kind;

    fn response(variation: &str) -> ActivateResponse {
        ActivateResponse {
            variation: variation.to_string(),
        }
    }

    #[tokio::test]
    async fn test_activate_returns_variation() {
        let mut mock = MockActivateTransport::new();
        mock.expect_activate()
            .withf(|req| {
                req.experiment_key == "us-widget-bff"
                    && req.user.as_ref().map(|u| u.id.as_str()) == Some("u1")
            })
            .times(1)
            .returning(|_| Ok(response("treatment_a")));

        let client = ActivationClient::with_transport(mock, None);
        let variation = client
            .activate("us-widget-bff", "u1", &Attributes::new())
            .await
            .unwrap();
        assert_eq!(variation, "treatment_a");
    }

    #[tokio::test]
    async fn test_activate_sends_encoded_attributes() {
        let mut mock = MockActivateTransport::new();
        mock.expect_activate()
            .withf(|req| {
                let attrs = req.user.as_ref().and_then(|u| u.attributes.as_ref());
                matches!(
                    attrs.map(|a| &a.fields["platform"].kind),
                    Some(Some(Kind::StringValue(p))) if p == "mobile"
                )
            })
            .times(1)
            .returning(|_| Ok(response("control")));

        let client = ActivationClient::with_transport(mock, None);
        let attrs = Attributes::new().with_attribute("platform", "mobile");
        assert_eq!(
            client.activate("us-widget-bff", "u1", &attrs).await.unwrap(),
            "control"
        );
    }

    #[tokio::test]
    async fn test_empty_experiment_key_is_rejected_without_call() {
        let mut mock = MockActivateTransport::new();
        mock.expect_activate().times(0);

        let client = ActivationClient::with_transport(mock, None);
        let err = client
            .activate("", "u1", &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_empty_user_id_is_rejected_without_call() {
        let mut mock = MockActivateTransport::new();
        mock.expect_activate().times(0);

        let client = ActivationClient::with_transport(mock, None);
        let err = client
            .activate("us-widget-bff", "", &Attributes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_returned_unchanged() {
        let mut mock = MockActivateTransport::new();
        mock.expect_activate().times(1).returning(|_| {
            Err(ActivationError::from(tonic::Status::not_found(
                "experiment not running",
            )))
        });

        let client = ActivationClient::with_transport(mock, None);
        let err = client
            .activate("us-widget-bff", "u1", &Attributes::new())
            .await
            .unwrap_err();
        assert!(!err.is_unreachable());
        assert_eq!(err.code(), Some(tonic::Code::NotFound));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = ActivationClient::with_transport(MockActivateTransport::new(), None);
        assert_eq!(client.state().await, ClientState::Connected);
        client.close().await;
        client.close().await;
        assert_eq!(client.state().await, ClientState::Closed);
    }

    #[test]
    fn test_client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ActivationClient>();
    }
}
