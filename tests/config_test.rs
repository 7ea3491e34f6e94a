use std::path::Path;
use std::time::Duration;

use k1s0_activation_client::config::load;

#[test]
fn test_sample_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/config.yaml");
    let cfg = load(&path).unwrap();

    assert_eq!(cfg.activation.endpoint_uri(), "http://localhost:50051");
    assert_eq!(cfg.activation.timeout(), Some(Duration::from_millis(1000)));
}
