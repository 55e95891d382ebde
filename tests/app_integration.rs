use ratefinder::config::AppConfig;
use ratefinder::core::{CurrencyPair, RateStore};
use ratefinder::scheduler::PassOutcome;
use ratefinder::seed::seed_store;
use ratefinder::service::RateService;
use ratefinder::store::open_store;
use std::fs;
use std::path::Path;
use tracing::info;

fn write_config(dir: &Path, failure_probability: f64) -> std::path::PathBuf {
    let config_path = dir.join("config.yaml");
    let config_content = format!(
        r#"
refresh_interval_secs: 60
supported_pairs: [USD_EUR, USD_GBP, XXX_YYY]
data_path: "{}"
providers:
  - name: "A"
    registration_link: "https://a.example.com/"
    api:
      api_url: "https://api.a.example.com/rates"
      params_template: {{ pair: "{{source}}{{target}}" }}
      rate_path: [data, rate]
      api_identity: "A"
  - name: "B"
    registration_link: "https://b.example.com/"
    api:
      api_url: "https://api.b.example.com/v1/rates"
      params_template: {{ sourceCurrency: "{{source}}", destinationCurrency: "{{target}}" }}
      rate_path: [data, 0, rate]
      api_identity: "B"
  - name: "No Api"
    registration_link: "https://noapi.example.com/"
simulation:
  failure_probability: {failure_probability}
  base_rates:
    USD_EUR: 0.92
    USD_GBP: 0.79
  offsets:
    A: 0.001
    B: -0.001
"#,
        dir.join("data").display()
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path
}

fn pair(s: &str) -> CurrencyPair {
    s.parse().unwrap()
}

#[test_log::test(tokio::test)]
async fn test_refresh_pass_against_disk_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from_path(write_config(dir.path(), 0.0)).unwrap();

    let store = open_store(&config, false).unwrap();
    seed_store(store.as_ref(), &config).await.unwrap();
    let service = RateService::new(&config, store);

    let summary = match service.trigger_refresh_now().await {
        PassOutcome::Committed(summary) => summary,
        other => panic!("expected committed pass, got {other:?}"),
    };
    info!(?summary, "First pass finished");

    // XXX_YYY has no base rate, so every configured provider fails it once.
    assert_eq!(summary.successes, 4);
    assert_eq!(summary.failures, 2);
    assert_eq!(summary.skipped_providers, 1);

    let a = service
        .get_latest_rate("A", &pair("USD_EUR"))
        .await
        .unwrap()
        .unwrap();
    let b = service
        .get_latest_rate("B", &pair("USD_EUR"))
        .await
        .unwrap()
        .unwrap();
    assert!((a.rate - 0.921).abs() < 1e-9);
    assert!((b.rate - 0.919).abs() < 1e-9);
    assert!(
        service
            .get_latest_rate("No Api", &pair("USD_EUR"))
            .await
            .unwrap()
            .is_none()
    );

    let second = match service.trigger_refresh_now().await {
        PassOutcome::Committed(summary) => summary,
        other => panic!("expected committed pass, got {other:?}"),
    };
    assert_eq!(service.store().rate_count().await.unwrap(), 4);
    let a = service
        .get_latest_rate("A", &pair("USD_EUR"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.last_updated, second.started_at);
}

#[test_log::test(tokio::test)]
async fn test_all_failures_commit_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from_path(write_config(dir.path(), 1.0)).unwrap();

    let store = open_store(&config, true).unwrap();
    seed_store(store.as_ref(), &config).await.unwrap();
    let service = RateService::new(&config, store);

    match service.trigger_refresh_now().await {
        PassOutcome::Committed(summary) => {
            assert_eq!(summary.successes, 0);
            assert_eq!(summary.failures, 6);
        }
        other => panic!("expected committed pass, got {other:?}"),
    }
    assert_eq!(service.store().rate_count().await.unwrap(), 0);
    assert!(
        service
            .rates_for_pair(&pair("USD_EUR"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[test_log::test(tokio::test)]
async fn test_run_command_with_ephemeral_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path(), 0.0);
    let config_path = config_path.to_str().unwrap();

    for command in [
        ratefinder::AppCommand::Refresh,
        ratefinder::AppCommand::Pairs,
        ratefinder::AppCommand::Providers,
        ratefinder::AppCommand::Rates("usd_gbp".to_string()),
    ] {
        let result = ratefinder::run_command(command.clone(), Some(config_path), true).await;
        assert!(result.is_ok(), "{command:?} failed with: {:?}", result.err());
    }

    let result = ratefinder::run_command(
        ratefinder::AppCommand::Rates("EUR_JPY".to_string()),
        Some(config_path),
        true,
    )
    .await;
    assert!(result.is_err());
}

#[test_log::test(tokio::test)]
async fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        r#"
refresh_interval_secs: 0
supported_pairs: [USD_EUR]
providers: []
"#,
    )
    .unwrap();

    let result = ratefinder::run_command(
        ratefinder::AppCommand::Pairs,
        Some(config_path.to_str().unwrap()),
        true,
    )
    .await;
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("refresh_interval_secs"));
}
