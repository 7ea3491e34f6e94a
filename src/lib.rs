//! 実験アクティベーションサービスの gRPC クライアント。
//!
//! 実験キー、ユーザー ID、ユーザー属性を decision service の `Activate` RPC に送り、
//! ユーザーが割り当てられる variation を返す。
//!
//! ```ignore
//! use k1s0_activation_client::{ActivationClient, Attributes};
//!
//! let client = ActivationClient::new("localhost", 50051)?;
//! let attrs = Attributes::new()
//!     .with_attribute("country", "US")
//!     .with_attribute("platform", "mobile");
//! let variation = client.activate("us-widget-bff", "user-1", &attrs).await?;
//! client.close().await;
//! ```

pub mod attribute;
pub mod client;
pub mod config;
pub mod error;
pub mod grpc;
pub mod proto;
pub mod telemetry;

pub use attribute::{AttributeValue, Attributes};
pub use client::{ActivationClient, ClientState};
pub use config::{ClientConfig, Config, ConfigError};
pub use error::ActivationError;
pub use grpc::{ActivateTransport, GrpcActivateTransport};
pub use proto::activate::{ActivateRequest, ActivateResponse, User};

#[cfg(feature = "mock")]
pub use grpc::MockActivateTransport;
