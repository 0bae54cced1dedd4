use anyhow::Context;

use lapse_core::LedgerConfig;
use lapse_sim::{Scenario, ENV_ROUNDS};

fn main() -> anyhow::Result<()> {
    lapse_observability::init();

    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    let rounds = match std::env::var(ENV_ROUNDS) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{ENV_ROUNDS} must be a positive integer, got {raw:?}"))?,
        Err(_) => {
            tracing::warn!("{ENV_ROUNDS} not set; using {}", Scenario::DEFAULT_ROUNDS);
            Scenario::DEFAULT_ROUNDS
        }
    };

    tracing::info!(
        epoch_length = config.epoch_length,
        window_epochs = config.window_epochs,
        eviction = ?config.eviction,
        rounds,
        "starting simulation"
    );

    let snapshot = Scenario::new(config, rounds)?.run()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
