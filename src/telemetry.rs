//! 構造化ログの初期化。CLI などのプロセス境界から一度だけ呼び出す。

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// init_logger は tracing-subscriber を初期化する。
///
/// `RUST_LOG` が設定されていればそれを優先し、なければ `level` を使う。
/// format が "json" の場合は JSON 出力、それ以外はプレーンテキスト出力。
/// 既にグローバル subscriber が設定されている場合は何もせず Ok を返す。
/// それ以外の初期化失敗（`log` ロガーの二重登録など）はエラーとして返す。
pub fn init_logger(level: &str, format: &str) -> Result<(), TryInitError> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("global subscriber already set; keeping it");
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    }
}
