//! Integration tests for shared AI region behavior.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use vigil_ai::{
    AiResult, AmbientBehaviour, AmbientTrigger, BehaviourCache, BehaviourStore, ControlledBrain, PetCommand,
    ServerConfig, StandardRules, WorldServer,
};
use vigil_core::{Entity, Faction, Point, RegionId, World, WorldMeta};
use vigil_sched::SchedConfig;

/// A store slow enough that every racing thread misses.
struct SlowStore {
    queries: AtomicUsize,
}

impl BehaviourStore for SlowStore {
    fn load(&self, name: &str) -> AiResult<Vec<AmbientBehaviour>> {
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(vec![AmbientBehaviour::new(name, AmbientTrigger::Aggroing, format!("query {n}"))])
    }
}

#[test]
fn racing_first_lookups_each_get_their_own_result() {
    let store = Arc::new(SlowStore {
        queries: AtomicUsize::new(0),
    });
    let cache = Arc::new(BehaviourCache::new(Arc::clone(&store)));
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get("Bog Troll").unwrap()
            })
        })
        .collect();
    let results: Vec<Vec<AmbientBehaviour>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.iter().all(|lines| lines.len() == 1));
    let queried = store.queries.load(Ordering::SeqCst);
    assert!(queried >= 1);

    // Whatever won the insert is now served without further queries.
    let cached = cache.get("bog troll").unwrap();
    assert_eq!(store.queries.load(Ordering::SeqCst), queried);
    assert!(results.iter().any(|lines| lines[0].text == cached[0].text));
}

#[test]
fn lookups_return_isolated_copies_across_threads() {
    let store = Arc::new(SlowStore {
        queries: AtomicUsize::new(0),
    });
    let cache = Arc::new(BehaviourCache::new(store));
    let first = cache.get("wolf").unwrap();

    let worker = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let mut mine = cache.get("wolf").unwrap();
            mine[0].text.push_str(" (edited)");
            mine.push(AmbientBehaviour::new("wolf", AmbientTrigger::Dying, "extra"));
            mine.len()
        })
    };
    assert_eq!(worker.join().unwrap(), 2);
    assert_eq!(cache.get("wolf").unwrap(), first);
}

#[test]
fn threaded_server_runs_posted_commands() {
    let config = ServerConfig {
        scheduler: SchedConfig::default().with_realtime(false),
        ..ServerConfig::default()
    };
    let mut server = WorldServer::new(config, BehaviourCache::empty(), StandardRules::default()).unwrap();

    let mut world = World::new(WorldMeta::new("Keep", RegionId(21)));
    let owner = world.spawn(Entity::player("Mira", 20)).unwrap();
    let pet = world
        .spawn(Entity::npc("Hound", 18).owned_by(owner).at(Point::flat(60, 0)))
        .unwrap();
    let rat = world
        .spawn(
            Entity::npc("Rat", 15)
                .with_faction(Faction(9))
                .with_health(1000)
                .at(Point::flat(150, 0)),
        )
        .unwrap();
    let id = server.add_region(world).unwrap();

    server.start().unwrap();
    let remote = server.remote(id).unwrap();
    remote.post(move |state, timers| {
        state
            .attach_brain(timers, pet, Box::new(ControlledBrain::new(owner)))
            .unwrap();
        state.command_pet(timers, pet, PetCommand::Attack(rat)).unwrap();
    });
    while remote.now() < 5_000 {
        thread::yield_now();
    }
    server.stop().unwrap();

    let state = server.region(id).unwrap().state();
    let rat = state.world.get_entity(rat).unwrap();
    assert!(rat.health < rat.max_health);
    assert!(state.aggro_of(pet).unwrap().contains(rat.id));
}
