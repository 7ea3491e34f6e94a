use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use k1s0_activation_client::telemetry::init_logger;
use k1s0_activation_client::{config, ActivationClient, Attributes, ClientConfig};

/// decision service に問い合わせ、ユーザーに割り当てられる variation を表示する。
#[derive(Debug, Parser)]
#[command(name = "activate", version)]
struct Cli {
    /// decision service のホスト（--host より優先）
    #[arg(value_name = "HOST")]
    host_arg: Option<String>,

    /// decision service のポート（--port より優先）
    #[arg(value_name = "PORT")]
    port_arg: Option<u16>,

    #[arg(long, env = "ACTIVATION_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "ACTIVATION_PORT", default_value_t = 50051)]
    port: u16,

    /// YAML 設定ファイル（指定時は --host / --port より優先）
    #[arg(long, env = "ACTIVATION_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "us-widget-bff")]
    experiment_key: String,

    #[arg(long)]
    user_id: String,

    /// key=value 形式のユーザー属性。value は JSON として解釈し、失敗時は文字列とする
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, serde_json::Value)>,

    /// 呼び出し期限（ミリ秒）
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long, default_value = "warn")]
    log_level: String,

    /// text または json
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Cli {
    fn endpoint(&self) -> (String, u16) {
        (
            self.host_arg.clone().unwrap_or_else(|| self.host.clone()),
            self.port_arg.unwrap_or(self.port),
        )
    }
}

fn parse_attribute(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("attribute key is empty in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, &cli.log_format).context("initialising logger")?;

    let mut cfg = match &cli.config {
        Some(path) => {
            config::load(path)
                .with_context(|| format!("loading {}", path.display()))?
                .activation
        }
        None => {
            let (host, port) = cli.endpoint();
            ClientConfig::new(host, port)
        }
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        cfg = cfg.with_timeout_ms(Some(timeout_ms));
    }

    let client = ActivationClient::connect_lazy(&cfg)?;
    let attributes: Attributes = cli.attributes.into_iter().collect();
    let result = client
        .activate(&cli.experiment_key, &cli.user_id, &attributes)
        .await;
    client.close().await;

    let variation = result.context("could not get the activate variation")?;
    println!("Variation: {variation}");
    Ok(())
}
