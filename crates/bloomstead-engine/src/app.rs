//! Application lifecycle management.
//!
//! Headless farm day: builds a session from the configured data, plays a
//! short scripted loop through the managers, saves through the configured
//! provider and reloads the save into a fresh session.

use anyhow::{Context, Result};
use bloomstead_common::{InventoryId, TilePos};
use bloomstead_gameplay::{GameData, GameSession, SlotSnapshot};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::save_manager::{SaveManager, SaveProvider};

/// Crop planted by the scripted loop.
const DEMO_SEED: &str = "wheat_seed";

/// Days the loop runs before giving up on unripe crops.
const MAX_DEMO_DAYS: u32 = 10;

/// Outcome of one scripted run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DemoSummary {
    /// Day the run ended on
    pub day: u32,
    /// Crops planted
    pub planted: usize,
    /// Produce units harvested
    pub harvested: u32,
    /// Items crafted, by recipe id
    pub crafted: Vec<String>,
    /// Provider the save went through
    pub provider: Option<SaveProvider>,
    /// Reloaded inventory matched the saved one
    pub reload_matches: bool,
}

/// Loads game data from the configured directory. Falls back to the data
/// shipped with the binary when the directory has no materials.
pub fn load_game_data(config: &EngineConfig) -> Result<GameData> {
    let data = GameData::load_or_empty(&config.data_dir);
    if !data.registry.is_empty() {
        return Ok(data);
    }
    warn!(
        "No materials in {}, using built-in data",
        config.data_dir.display()
    );
    GameData::builtin().context("built-in data failed to load")
}

fn player_slots(session: &GameSession) -> Vec<Option<SlotSnapshot>> {
    session.inventory().player().snapshot()
}

/// Plays the scripted day loop on `session`.
fn play(session: &mut GameSession, summary: &mut DemoSummary) {
    for (id, quantity) in [(DEMO_SEED, 3), ("wood", 6), ("stone", 2)] {
        match session.create_item(id, quantity) {
            Some(item) => {
                session.give_player(item);
            },
            None => warn!("Unknown starter item: {id}"),
        }
    }

    let plots: Vec<TilePos> = (2..5).map(|x| TilePos::new(x, 4)).collect();
    for &pos in &plots {
        session.till_soil(pos);
        if session.plant_seed_from_hotbar(pos) {
            summary.planted += 1;
        }
    }

    while session.farming().current_day() <= MAX_DEMO_DAYS {
        let unripe: Vec<TilePos> = session
            .farming()
            .crops()
            .into_iter()
            .filter(|crop| !crop.grown)
            .map(|crop| crop.position)
            .collect();
        if unripe.is_empty() {
            break;
        }
        for pos in unripe {
            session.water_crop(pos);
        }
        let grown = session.end_day();
        debug!(day = session.farming().current_day(), grown = grown.len(), "night passed");
    }

    for &pos in &plots {
        if let Some(item) = session.harvest_crop(pos) {
            summary.harvested += item.quantity;
        }
    }

    for recipe in ["bread", "fence"] {
        if session.craft(&recipe.into()) {
            summary.crafted.push(recipe.to_string());
        }
    }
    summary.day = session.farming().current_day();
}

/// Runs the scripted loop with already loaded data.
pub async fn run_with(config: &EngineConfig, data: GameData) -> Result<DemoSummary> {
    let mut session = GameSession::new(data.clone(), config.session_config())
        .context("failed to build session")?;
    if config.debug_events {
        session
            .events()
            .subscribe_all(|event| debug!(kind = ?event.kind(), "event"));
    }

    let mut summary = DemoSummary::default();
    play(&mut session, &mut summary);
    info!(
        day = summary.day,
        planted = summary.planted,
        harvested = summary.harvested,
        crafted = ?summary.crafted,
        "Farm day finished"
    );

    let saves = SaveManager::from_config(config);
    let provider = match config.save_provider {
        SaveProvider::Blockchain if saves.chain_player().is_none() => {
            warn!("Blockchain saves unavailable, saving locally");
            SaveProvider::LocalStorage
        },
        provider => provider,
    };

    if !saves.save_game(provider, &mut session).await {
        warn!("Save through {provider} failed");
        return Ok(summary);
    }
    summary.provider = Some(provider);

    let mut reloaded =
        GameSession::new(data, config.session_config()).context("failed to build session")?;
    if saves.load_game(provider, &mut reloaded).await {
        summary.reload_matches = player_slots(&reloaded) == player_slots(&session)
            && reloaded.farming().current_day() == session.farming().current_day();
    }
    info!(
        provider = %provider,
        matches = summary.reload_matches,
        fences = reloaded
            .inventory()
            .count_material(&InventoryId::player(), &"fence".into()),
        "Reloaded save"
    );
    Ok(summary)
}

/// Loads data from the configured directory and runs the scripted loop.
pub async fn run(config: &EngineConfig) -> Result<DemoSummary> {
    let data = load_game_data(config)?;
    run_with(config, data).await
}
