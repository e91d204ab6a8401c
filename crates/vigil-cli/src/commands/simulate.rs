use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use tracing::info;
use vigil_ai::{
    BehaviourCache, RegionEvent, RegionEventKind, RegionWorld, StandardRules, StaticBehaviourStore, WorldServer,
};
use vigil_core::Entity;

use crate::scenario::Scenario;

pub fn run(
    scenario: Option<&Path>,
    config: Option<&Path>,
    duration: u64,
    seed: Option<u64>,
    verbose: bool,
) -> Result<(), String> {
    let scenario = match scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::demo(),
    };
    let mut config = super::load_config(config)?;
    if let Some(seed) = seed {
        config.ai.seed = seed;
    }
    let seed = config.ai.seed;

    let staged = scenario.stage()?;
    let behaviours = BehaviourCache::new(StaticBehaviourStore::new(scenario.ambient.clone()));
    let mut server = WorldServer::new(config, behaviours, StandardRules::default()).map_err(|e| e.to_string())?;
    let id = server.add_region(staged.world).map_err(|e| e.to_string())?;
    let region = server.region_mut(id).ok_or("region vanished after loading")?;

    for (body, spec) in &staged.brains {
        let brain = spec.build(&region.state().world, *body)?;
        region
            .with_scheduler(|state, timers| state.attach_brain(timers, *body, brain))
            .map_err(|e| e.to_string())?;
    }

    let mut orders: Vec<_> = scenario.orders.iter().filter(|o| o.at <= duration).collect();
    orders.sort_by_key(|o| o.at);
    let skipped = scenario.orders.len() - orders.len();
    for order in orders {
        region.advance_to(order.at);
        order.apply(region, &staged.names)?;
    }
    region.advance_to(duration);
    info!(region = %id, now = region.now(), invoked = region.stats().invoked, "scenario_finished");

    let state = region.state();
    println!(
        "  {} '{}' {}",
        "Scenario".bold(),
        scenario.name,
        format!("({duration} ms, seed={seed})").dimmed()
    );
    println!(
        "  {} bodies, {} brains, {} events logged",
        state.world.entity_count(),
        state.brains.len(),
        state.events.len()
    );
    if skipped > 0 {
        println!("  {}", format!("{skipped} orders fall after the end and were skipped").yellow());
    }
    println!();

    if verbose {
        println!("  {}", "Event Log".bold().underline());
        println!();
        for event in state.events.events() {
            let at = format!("[{:>6} ms]", event.at).dimmed();
            println!("  {at} {}", colorize_event(event));
        }
        if state.events.is_empty() {
            println!("  {}", "(no events)".dimmed());
        }
        println!();
    } else {
        let kills = state.events.filter(|k| matches!(k, RegionEventKind::Killed { .. }));
        if !kills.is_empty() {
            println!("  {}", "Notable Events".bold().underline());
            for event in kills {
                println!("  {}  {}", "KILL".red().bold(), event.description);
            }
            println!();
        }
    }

    println!("  {}", "Bodies".bold().underline());
    println!();
    println!("{}", body_table(state));
    println!();
    Ok(())
}

fn body_table(state: &RegionWorld) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Kind", "HP", "Brain", "Aggression", "Target", "Threat"]);

    for entity in state.world.all_entities() {
        let brain = state.brains.get(entity.id);
        let target = entity
            .attack_target
            .map(|t| state.world.entity_name(t).to_string())
            .unwrap_or_else(|| "--".to_string());
        let threat = state
            .aggro_of(entity.id)
            .and_then(|table| {
                let top = table.most_wanted()?;
                Some(format!("{} ({})", state.world.entity_name(top), table.threat(top)?))
            })
            .unwrap_or_else(|| "--".to_string());
        table.add_row(vec![
            entity.name.clone(),
            entity.kind.to_string(),
            format_health(entity),
            brain.map_or_else(|| "--".to_string(), |b| b.kind().to_string()),
            brain.map_or_else(|| "--".to_string(), |b| b.aggression_state().to_string()),
            target,
            threat,
        ]);
    }
    table
}

fn format_health(entity: &Entity) -> String {
    let text = format!("{}/{}", entity.health, entity.max_health);
    match entity.health_percent() {
        0 => text.red().bold().to_string(),
        1..=25 => text.red().to_string(),
        26..=60 => text.yellow().to_string(),
        _ => text.green().to_string(),
    }
}

fn colorize_event(event: &RegionEvent) -> colored::ColoredString {
    let description = event.description.as_str();
    match event.kind {
        RegionEventKind::Killed { .. } => description.red().bold(),
        RegionEventKind::Hit { .. } | RegionEventKind::CastFailed { .. } => description.red(),
        RegionEventKind::Healed { .. } => description.green(),
        RegionEventKind::AggroGained { .. }
        | RegionEventKind::AttackStarted { .. }
        | RegionEventKind::AttackStopped { .. } => description.yellow(),
        RegionEventKind::SpellCast { .. } => description.magenta(),
        RegionEventKind::CrowdControlStarted { .. } | RegionEventKind::CrowdControlEnded { .. } => {
            description.cyan()
        }
        RegionEventKind::Ambient { .. } => description.italic(),
        RegionEventKind::BrainAttached { .. }
        | RegionEventKind::BrainDetached { .. }
        | RegionEventKind::PetReleased { .. } => description.blue(),
    }
}
