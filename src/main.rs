mod config;
mod domain;
mod logging;
mod notifier;
mod poller;
mod practicum;
mod telegram;
mod tracker;
mod validate;

use anyhow::{Context, Result};

use crate::{
    config::Config,
    poller::Poller,
    practicum::{PracticumClient, build_client},
    telegram::TelegramBot,
};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;
    let log_path = logging::init_logging(&config.log_dir, &config.log_level)
        .context("Failed to initialize logging")?;
    tracing::info!(log_file = %log_path.display(), "Starting homework status bot");

    let http = build_client(config.request_timeout).context("Failed to build HTTP client")?;
    let source = PracticumClient::new(http.clone(), &config);
    let transport = TelegramBot::new(http, &config.credentials);

    let mut poller = Poller::new(&config, source, transport);
    poller.run().context("Bot halted at startup")?;
    Ok(())
}
