mod config;

use bridge_runner::Runner;
use common::clickhouse::ClickHouseClient;
use common::nats::NatsClient;
use common::retry::{retry_with_backoff, RetryPolicy};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use message_writer::clickhouse::ClickHouseObservationRepository;
use message_writer::message_writer::{MessageWriter, MessageWriterConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting senml-bridge service"
    );
    debug!("Configuration: {:?}", config);

    let retry_policy = config.retry_policy();

    let (clickhouse_client, nats_client) =
        match initialize_shared_dependencies(&config, &retry_policy).await {
            Ok(deps) => deps,
            Err(e) => {
                error!("Failed to initialize shared dependencies: {:#}", e);
                shutdown_telemetry(telemetry_providers);
                std::process::exit(1);
            }
        };

    let repository =
        ClickHouseObservationRepository::new(clickhouse_client, config.clickhouse_table.clone());
    if config.clickhouse_ensure_table {
        if let Err(e) = repository.ensure_table().await {
            error!("Failed to prepare observation table: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    }

    let message_writer = match MessageWriter::new(
        Arc::new(repository),
        nats_client.create_subscriber_client(),
        MessageWriterConfig {
            subject: config.nats_subject.clone(),
            queue_group: config.nats_queue_group.clone(),
            service_name: config.otel_service_name.clone(),
        },
    )
    .await
    {
        Ok(writer) => writer,
        Err(e) => {
            error!("Failed to initialize message writer: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let outcome = Runner::new()
        .with_named_process("message_writer", message_writer.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            nats_client.close().await;

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;

    std::process::exit(outcome.exit_code());
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
    retry_policy: &RetryPolicy,
) -> anyhow::Result<(ClickHouseClient, NatsClient)> {
    info!("Initializing ClickHouse...");
    let clickhouse_client = retry_with_backoff(retry_policy, "clickhouse_connect", || {
        ClickHouseClient::connect(
            &config.clickhouse_host,
            config.clickhouse_port,
            &config.clickhouse_database,
            &config.clickhouse_username,
            &config.clickhouse_password,
        )
    })
    .await?;

    info!("Initializing NATS...");
    let nats_client = retry_with_backoff(retry_policy, "nats_connect", || {
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
    })
    .await?;

    Ok((clickhouse_client, nats_client))
}
