//! Backup location management command

use anyhow::Result;
use camino::Utf8Path;
use memprime_backup::LocationRegistry;
use memprime_core::BackupSlot;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::{LocationsArgs, LocationsCommands};
use crate::output;

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    slot: String,

    #[tabled(rename = "Destination")]
    destination: String,
}

pub async fn run(args: LocationsArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let registry = super::resolve_registry(args.registry, &config)?;

    match args.command {
        LocationsCommands::List => list(&registry),
        LocationsCommands::Set {
            slot,
            destination,
            yes,
        } => set(&registry, slot, destination.as_str(), yes),
        LocationsCommands::Clear { slot } => clear(&registry, slot),
    }
}

fn list(registry: &LocationRegistry) -> Result<()> {
    let configured = registry.configured()?;

    let rows: Vec<SlotRow> = BackupSlot::ALL
        .into_iter()
        .map(|slot| SlotRow {
            slot: slot.to_string(),
            destination: configured
                .iter()
                .find(|(s, _)| *s == slot)
                .map(|(_, id)| id.clone())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

fn set(registry: &LocationRegistry, slot: u8, destination: &str, yes: bool) -> Result<()> {
    let slot = BackupSlot::from_index(slot)?;

    if let Some(existing) = registry.get(slot)? {
        if existing != destination && !yes {
            use dialoguer::Confirm;
            let overwrite = Confirm::new()
                .with_prompt(format!("{slot} already points at {existing}. Overwrite?"))
                .default(false)
                .interact()?;
            if !overwrite {
                output::info("Left unchanged");
                return Ok(());
            }
        }
    }

    registry.register(slot, destination)?;
    output::success(&format!("{slot} -> {destination}"));
    Ok(())
}

fn clear(registry: &LocationRegistry, slot: u8) -> Result<()> {
    let slot = BackupSlot::from_index(slot)?;
    match registry.remove(slot)? {
        Some(removed) => output::success(&format!("{slot} cleared (was {removed})")),
        None => output::info(&format!("{slot} was not set")),
    }
    Ok(())
}
