//! Command implementations for the fprint-verify binary

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use fprint_core::{BusKind, ConfigError, FingerprintDevice, VerificationSession, VerifyConfig, Verified};

use crate::report;

/// Bus selection on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusArg {
    System,
    Session,
}

impl From<BusArg> for BusKind {
    fn from(bus: BusArg) -> Self {
        match bus {
            BusArg::System => BusKind::System,
            BusArg::Session => BusKind::Session,
        }
    }
}

/// Command-line values that override the config file
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Message bus the fingerprint service is on
    #[arg(long, value_enum, global = true)]
    pub bus: Option<BusArg>,

    /// Fingerprint service name
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Object path of the scanner device
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// User to verify (defaults to the calling user)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Enrolled finger to match against
    #[arg(long, global = true)]
    pub finger: Option<String>,

    /// Non-matching scans allowed before failing
    #[arg(short = 'n', long, global = true)]
    pub max_attempts: Option<u32>,

    /// Seconds to wait for each scan before giving up
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,
}

impl ConfigOverrides {
    /// Apply overrides on top of `config`
    pub fn apply(&self, config: &mut VerifyConfig) {
        if let Some(bus) = self.bus {
            config.bus = bus.into();
        }
        if let Some(service) = &self.service {
            config.service = service.clone();
        }
        if let Some(device) = &self.device {
            config.device_path = device.clone();
        }
        if let Some(user) = &self.user {
            config.username = user.clone();
        }
        if let Some(finger) = &self.finger {
            config.finger = finger.clone();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(timeout) = self.timeout {
            config.event_timeout_secs = Some(timeout);
        }
    }
}

/// Load the config file (or defaults), apply overrides and validate
pub fn effective_config(
    path: &Path,
    overrides: &ConfigOverrides,
) -> Result<VerifyConfig, ConfigError> {
    let mut config = VerifyConfig::load_or_default(path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Write `config` to `path`, refusing to overwrite unless `force`
pub fn init_config(path: &Path, config: &VerifyConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config.save(path)?;
    info!("Wrote config to {:?}", path);
    Ok(())
}

/// Run one verification session, printing prompts as it progresses
pub async fn verify<D, F>(
    device: Arc<D>,
    config: &VerifyConfig,
    shutdown: F,
) -> fprint_core::Result<Verified>
where
    D: FingerprintDevice + ?Sized + 'static,
    F: Future<Output = ()>,
{
    let mut session = VerificationSession::from_config(device, config);
    let mut updates = session.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Some(line) = report::update_message(&update) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(missed)) => debug!("Missed {} progress updates", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = session.run_until(shutdown).await;

    // Dropping the session closes the update channel so the printer drains
    drop(session);
    if let Err(e) = printer.await {
        debug!("Progress printer ended abnormally: {}", e);
    }

    outcome
}
