use thiserror::Error;
use tonic::Code;

/// ActivationError は activate 呼び出しおよび属性エンコードで発生するエラー。
#[derive(Debug, Error)]
pub enum ActivationError {
    /// 属性値に wire 表現が存在しない。ネットワーク I/O の前に検出される。
    #[error("unsupported attribute value for key '{key}': {reason}")]
    UnsupportedAttribute { key: String, reason: String },

    /// 接続確立またはリモート呼び出しがネットワーク/プロトコル層で失敗した。
    /// `code` は transport が返した gRPC ステータス（接続確立失敗時は None）。
    #[error("transport error ({}): {message}", display_code(.code))]
    Transport { code: Option<Code>, message: String },

    #[error("deadline exceeded before a response arrived")]
    Timeout,

    #[error("call was cancelled")]
    Cancelled,

    #[error("client is closed")]
    InvalidState,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn display_code(code: &Option<Code>) -> String {
    match code {
        Some(code) => format!("{code:?}"),
        None => "connect".to_string(),
    }
}

impl ActivationError {
    /// エンドポイントに到達できなかった場合は true、
    /// アプリケーションレベルで拒否された場合は false を返す。
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ActivationError::Transport {
                code: None | Some(Code::Unavailable),
                ..
            }
        )
    }

    /// リモートから返された gRPC ステータスコード。
    pub fn code(&self) -> Option<Code> {
        match self {
            ActivationError::Transport { code, .. } => *code,
            ActivationError::Timeout => Some(Code::DeadlineExceeded),
            ActivationError::Cancelled => Some(Code::Cancelled),
            _ => None,
        }
    }
}

impl From<tonic::Status> for ActivationError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::DeadlineExceeded => ActivationError::Timeout,
            Code::Cancelled => ActivationError::Cancelled,
            code => ActivationError::Transport {
                code: Some(code),
                message: status.message().to_string(),
            },
        }
    }
}

impl From<tonic::transport::Error> for ActivationError {
    fn from(err: tonic::transport::Error) -> Self {
        ActivationError::Transport {
            code: None,
            message: err.to_string(),
        }
    }
}
