mod cli;
mod config;
mod presence;
mod storage;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use color_eyre::Result;
use gatekeep_core::SecureStorage;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

const HEALTH_PROBE_ACCOUNT: &str = "gatekeep/health-probe";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    let backend = cli.backend.unwrap_or(config.backend);

    match cli.command {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let storage = storage::storage_from_config(&config, backend)?;
            run_storage_command(&storage, command).await?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("gatekeep {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run_storage_command(storage: &SecureStorage, command: Command) -> Result<()> {
    match command {
        Command::Save { account, value } => {
            storage.save(&account, value.as_bytes()).await?;
            println!("Saved {account}");
        }
        Command::Update { account, value } => {
            storage.update(&account, value.as_bytes()).await?;
            println!("Updated {account}");
        }
        Command::Load { account } => match storage.load(&account).await? {
            Some(bytes) => println!("{}", render(bytes)),
            None => println!("No value stored for {account}"),
        },
        Command::Delete { account } => {
            storage.delete(&account).await?;
            println!("Deleted {account}");
        }
        Command::Health => {
            run_store_health(storage).await?;
            println!("Storage: ok");
        }
        Command::Version | Command::Config(_) => {}
    }
    Ok(())
}

/// Save, update, read back and remove a probe value.
async fn run_store_health(storage: &SecureStorage) -> Result<()> {
    storage.save(HEALTH_PROBE_ACCOUNT, b"ok").await?;
    storage.update(HEALTH_PROBE_ACCOUNT, b"ok-again").await?;
    let round_trip = storage.load(HEALTH_PROBE_ACCOUNT).await?;
    storage.delete(HEALTH_PROBE_ACCOUNT).await?;

    if round_trip.as_deref() != Some(b"ok-again".as_slice()) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

/// UTF-8 values print as text, anything else as base64.
fn render(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| STANDARD.encode(err.into_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gatekeep_core::{auth::StaticAuthenticator, SecureStoreError};

    use super::*;
    use crate::config::BackendChoice;

    #[tokio::test]
    async fn health_check_with_test_store_succeeds() {
        for backend in [BackendChoice::Plain, BackendChoice::Gated] {
            let dir = tempfile::tempdir().expect("tempdir");
            let auth = Arc::new(StaticAuthenticator::granting());
            let storage = storage::test_storage(dir.path(), backend, auth);
            run_store_health(&storage)
                .await
                .expect("health check should succeed");
            assert_eq!(storage.load(HEALTH_PROBE_ACCOUNT).await.expect("load"), None);
        }
    }

    #[tokio::test]
    async fn health_check_reports_denied_gate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = Arc::new(StaticAuthenticator::denying());
        let storage = storage::test_storage(dir.path(), BackendChoice::Gated, auth);

        let report = run_store_health(&storage).await.expect_err("denied");
        assert!(matches!(
            report.downcast_ref::<SecureStoreError>(),
            Some(SecureStoreError::AuthenticationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn commands_round_trip_through_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let auth = Arc::new(StaticAuthenticator::granting());
        let storage = storage::test_storage(dir.path(), BackendChoice::Gated, auth.clone());

        run_storage_command(
            &storage,
            Command::Update {
                account: "acct2".into(),
                value: "x".into(),
            },
        )
        .await
        .expect("update");
        run_storage_command(
            &storage,
            Command::Delete {
                account: "acct3".into(),
            },
        )
        .await
        .expect("delete absent");

        assert_eq!(storage.load("acct2").await.expect("load"), Some(b"x".to_vec()));
        assert_eq!(auth.calls(), 3);
    }

    #[test]
    fn render_falls_back_to_base64() {
        assert_eq!(render(b"hello".to_vec()), "hello");
        assert_eq!(render(vec![0xff, 0xfe]), "//4=");
    }
}
