// Integration tests for configuration loading and validation

use std::fs;

use ampl_ladder::config::{ENV_API_KEY, ENV_API_PASSPHRASE, ENV_API_SECRET};
use ampl_ladder::{BalancePolicy, ConfigError, ExchangeConfig, ExchangeKind, LadderConfig};
use serial_test::serial;
use tempfile::TempDir;

fn clear_credential_env() {
    std::env::remove_var(ENV_API_KEY);
    std::env::remove_var(ENV_API_SECRET);
    std::env::remove_var(ENV_API_PASSPHRASE);
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("ladder.toml");

    let mut config = LadderConfig::default();
    config.ladder.balance_policy = BalancePolicy::Reserve;
    config.exchange.paper_balance = 25.0;
    config.to_file(&path).expect("Failed to write config");

    let content = fs::read_to_string(&path).expect("Failed to read back");
    assert!(content.contains("AMPL-USDT"));
    assert!(content.contains("balance_policy = \"reserve\""));

    let loaded = LadderConfig::from_file(&path).expect("Failed to load config");
    assert_eq!(loaded.ladder.buy_levels, config.ladder.buy_levels);
    assert_eq!(loaded.ladder.balance_policy, BalancePolicy::Reserve);
    assert_eq!(loaded.exchange.paper_balance, 25.0);
}

#[test]
fn test_sparse_file_takes_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("sparse.toml");
    fs::write(&path, "[ladder]\norder_size = 5.0\n\n[exchange]\n").expect("Failed to write");

    let config = LadderConfig::from_file(&path).expect("Failed to load config");

    assert_eq!(config.ladder.order_size, 5.0);
    assert_eq!(config.ladder.symbol, "AMPL-USDT");
    assert_eq!(config.ladder.markup, 1.03);
    assert_eq!(config.ladder.match_tolerance, 0.01);
    assert_eq!(config.ladder.health_threshold, 6);
    assert_eq!(config.ladder.detection_threshold, 3);
    assert_eq!(config.exchange.kind, ExchangeKind::Paper);
    assert_eq!(config.monitoring.check_interval_seconds, 30);
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("new.toml");
    assert!(!path.exists());

    let config = LadderConfig::load_or_create(&path).expect("Failed to create config");

    assert!(path.exists());
    assert_eq!(config.ladder.buy_levels.len(), 8);
    let again = LadderConfig::load_or_create(&path).expect("Failed to reload config");
    assert_eq!(again.ladder.buy_levels, config.ladder.buy_levels);
}

#[test]
fn test_missing_file_and_bad_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let missing = LadderConfig::from_file(temp_dir.path().join("nope.toml"));
    assert!(matches!(missing, Err(ConfigError::FileRead(_))));

    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[ladder\norder_size = ").expect("Failed to write");
    assert!(matches!(LadderConfig::from_file(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn test_crowded_levels_fail_validation() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("crowded.toml");
    fs::write(
        &path,
        "[ladder]\nbuy_levels = [1.00, 0.995, 0.90]\ndetection_threshold = 2\nhealth_threshold = 2\n\n[exchange]\n",
    )
    .expect("Failed to write");

    assert!(matches!(LadderConfig::from_file(&path), Err(ConfigError::Validation(_))));
}

#[test]
fn test_zero_interval_fails_validation() {
    let mut config = LadderConfig::default();
    config.monitoring.check_interval_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_kucoin_requires_credentials() {
    clear_credential_env();
    let mut config = LadderConfig::default();
    config.exchange.kind = ExchangeKind::Kucoin;

    assert!(matches!(config.validate(), Err(ConfigError::MissingCredential(_))));
}

#[test]
#[serial]
fn test_environment_overrides_file_credentials() {
    clear_credential_env();
    let exchange = ExchangeConfig {
        kind: ExchangeKind::Kucoin,
        api_key: Some("file-key".to_string()),
        api_secret: Some("file-secret".to_string()),
        api_passphrase: Some("file-phrase".to_string()),
        ..ExchangeConfig::default()
    };

    let from_file = exchange.credentials().expect("file credentials");
    assert_eq!(from_file.api_key, "file-key");

    std::env::set_var(ENV_API_KEY, "env-key");
    std::env::set_var(ENV_API_SECRET, "  ");
    let resolved = exchange.credentials().expect("mixed credentials");
    clear_credential_env();

    assert_eq!(resolved.api_key, "env-key");
    // Blank environment values fall through to the file
    assert_eq!(resolved.api_secret, "file-secret");
    assert_eq!(resolved.api_passphrase, "file-phrase");
}
