//! plagascand - tomato pest detection service
//!
//! This daemon:
//! 1. Opens the sighting database
//! 2. Loads (or stubs) the detection backend
//! 3. Serves the single-page UI and detection API

use anyhow::Result;
use std::sync::mpsc;

use plagascan::mailer::{DisabledMailer, Mailer, SmtpMailer};
use plagascan::pipeline::DetectionPipeline;
use plagascan::storage::SqliteSightingStore;
use plagascan::web::{WebConfig, WebServer};
use plagascan::{select_backend, AppConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;

    let store = SqliteSightingStore::open(&config.db_path)?;
    let mut backend = select_backend(&config.model)?;
    backend.warm_up()?;
    log::info!("detection backend: {}", backend.name());

    let mailer: Box<dyn Mailer> =
        if config.smtp.username.is_some() && config.smtp.password.is_some() {
            Box::new(SmtpMailer::from_settings(&config.smtp)?)
        } else {
            log::warn!("smtp credentials not set; contact form is disabled");
            Box::new(DisabledMailer)
        };

    let pipeline = DetectionPipeline::new(
        backend,
        Box::new(store),
        config.model.clone(),
        config.upload_dir.clone(),
    );
    let web_config = WebConfig {
        addr: config.listen_addr.clone(),
        assets_dir: config.assets_dir.clone(),
        ..WebConfig::default()
    };
    let handle = WebServer::new(web_config, pipeline, mailer).spawn()?;
    log::info!("plagascan listening on http://{}", handle.addr);
    log::info!("sightings stored in {}", config.db_path);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("plagascand waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping web server...");
    handle.stop()?;

    Ok(())
}
