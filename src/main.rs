use anyhow::Context;
use clap::Parser;
use juggler::app::{self, output, Outcome};
use juggler::config::{self, Settings};
use juggler::utils::{logger, validation::Validate};
use juggler::{Cli, DescriptorStore, DeviceDescriptorSet, DirectoryStore, JugglerError, LibvirtClient};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let file_config = match config::load_config_file(cli.config.as_deref()) {
        Ok(file_config) => file_config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    };
    let settings = Settings::resolve(file_config, cli.overrides());

    if settings.json_logs {
        logger::init_json_logger(cli.verbose, settings.log_level.as_deref());
    } else {
        logger::init_cli_logger(cli.verbose, settings.log_level.as_deref());
    }
    tracing::debug!("Effective settings: {:?}", settings);

    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(e.exit_code());
    }

    match run(&cli, &settings).await {
        Ok(outcome) => {
            let text = output::render(&outcome, cli.command.wants_json())
                .context("failed to render result")?;
            std::io::stdout()
                .write_all(text.as_bytes())
                .context("failed to write result to stdout")?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "❌ {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    }
}

/// Loads the descriptors, then holds one daemon session for the duration of
/// the operation.
async fn run(cli: &Cli, settings: &Settings) -> Result<Outcome, JugglerError> {
    let operation = cli.command.operation();

    let devices = if operation.needs_devices() {
        DirectoryStore::new(settings.device_dir()?).read_all().await?
    } else {
        DeviceDescriptorSet::new()
    };

    let session = LibvirtClient::connect(&settings.connection).await?;
    app::run_in_session(&session, &operation, &devices).await
}
