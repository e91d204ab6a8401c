use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityId, EntityKind, ObjectState, RegionId};
use crate::error::{CoreError, CoreResult};
use crate::geometry::Point;

/// Metadata about one region's slice of the world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
    /// Human-readable region name.
    pub name: String,
    /// The region this registry covers.
    pub region: RegionId,
    /// When the registry was created.
    pub created_at: DateTime<Utc>,
}

impl WorldMeta {
    /// Metadata for a named region.
    pub fn new(name: impl Into<String>, region: RegionId) -> Self {
        Self {
            name: name.into(),
            region,
            created_at: Utc::now(),
        }
    }
}

/// Entity registry for one region. Owns every entity living there and hands
/// out stable [`EntityId`] handles.
///
/// Iteration follows insertion order so that everything built on top of the
/// registry (perception scans, aggro insertion order) is deterministic.
#[derive(Debug, Clone)]
pub struct World {
    /// Region metadata.
    pub meta: WorldMeta,
    entities: HashMap<EntityId, Entity>,

    // Indexes
    order: Vec<EntityId>,
    by_kind: HashMap<EntityKind, Vec<EntityId>>,
    by_name_lower: HashMap<String, Vec<EntityId>>,
}

impl World {
    /// Create an empty registry.
    pub fn new(meta: WorldMeta) -> Self {
        Self {
            meta,
            entities: HashMap::new(),
            order: Vec::new(),
            by_kind: HashMap::new(),
            by_name_lower: HashMap::new(),
        }
    }

    /// The region this registry covers.
    pub fn region(&self) -> RegionId {
        self.meta.region
    }

    // -----------------------------------------------------------------------
    // Entity CRUD
    // -----------------------------------------------------------------------

    /// Add an entity to the world. Returns the entity's ID.
    pub fn add_entity(&mut self, entity: Entity) -> CoreResult<EntityId> {
        if self.entities.contains_key(&entity.id) {
            return Err(CoreError::DuplicateId(entity.id));
        }
        if entity.region != self.meta.region {
            return Err(CoreError::WrongRegion {
                entity: entity.id,
                expected: self.meta.region,
                found: entity.region,
            });
        }

        let id = entity.id;
        self.order.push(id);
        self.by_kind.entry(entity.kind).or_default().push(id);
        self.by_name_lower
            .entry(entity.name.to_lowercase())
            .or_default()
            .push(id);
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Move an entity into this region and add it.
    pub fn spawn(&mut self, entity: Entity) -> CoreResult<EntityId> {
        let region = self.meta.region;
        self.add_entity(entity.in_region(region))
    }

    /// Get a reference to an entity by ID.
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// True if the handle resolves to a registered entity.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// True if the entity is registered and in the world (not inactive or deleted).
    /// Dead bodies are still present until they are removed.
    pub fn is_present(&self, id: EntityId) -> bool {
        self.entities
            .get(&id)
            .is_some_and(|e| e.state == ObjectState::Active)
    }

    /// Find the first entity with this name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        self.find_id_by_name(name).and_then(|id| self.entities.get(&id))
    }

    /// Find the first entity ID with this name (case-insensitive).
    pub fn find_id_by_name(&self, name: &str) -> Option<EntityId> {
        self.by_name_lower
            .get(&name.to_lowercase())
            .and_then(|ids| ids.first().copied())
    }

    /// All entity IDs carrying this name (case-insensitive), in insertion order.
    pub fn find_all_by_name(&self, name: &str) -> Vec<EntityId> {
        self.by_name_lower
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Display name for a handle, or `"unknown"` if it does not resolve.
    pub fn entity_name(&self, id: EntityId) -> &str {
        self.entities
            .get(&id)
            .map(|e| e.name.as_str())
            .unwrap_or("unknown")
    }

    /// Change an entity's lifecycle state.
    pub fn set_state(&mut self, id: EntityId, state: ObjectState) -> CoreResult<()> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(CoreError::EntityNotFound(id))?;
        entity.state = state;
        Ok(())
    }

    /// Remove an entity. Outstanding handles stop resolving.
    pub fn remove_entity(&mut self, id: EntityId) -> CoreResult<Entity> {
        let mut entity = self
            .entities
            .remove(&id)
            .ok_or(CoreError::EntityNotFound(id))?;

        // Remove from indexes
        self.order.retain(|eid| *eid != id);
        if let Some(ids) = self.by_kind.get_mut(&entity.kind) {
            ids.retain(|eid| *eid != id);
        }
        let name_lower = entity.name.to_lowercase();
        if let Some(ids) = self.by_name_lower.get_mut(&name_lower) {
            ids.retain(|eid| *eid != id);
            if ids.is_empty() {
                self.by_name_lower.remove(&name_lower);
            }
        }

        entity.state = ObjectState::Deleted;
        Ok(entity)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// All entities of a kind, in insertion order.
    pub fn entities_by_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.by_kind
            .get(&kind)
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    /// All entities, in insertion order.
    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Number of registered entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Active, living entities within `radius` of `center`, optionally
    /// restricted to one kind, in insertion order.
    pub fn living_in_radius(
        &self,
        center: Point,
        radius: u32,
        kind: Option<EntityKind>,
    ) -> Vec<EntityId> {
        let ids: &[EntityId] = match kind {
            Some(k) => self.by_kind.get(&k).map(Vec::as_slice).unwrap_or(&[]),
            None => &self.order,
        };
        ids.iter()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| e.is_active() && e.position.is_within(center, radius))
            .map(|e| e.id)
            .collect()
    }

    /// Distance between two entities, if both resolve.
    pub fn distance_between(&self, a: EntityId, b: EntityId) -> Option<u32> {
        let a = self.entities.get(&a)?;
        let b = self.entities.get(&b)?;
        Some(a.position.distance(b.position))
    }

    /// Pets controlled by `owner`, in insertion order.
    pub fn pets_of(&self, owner: EntityId) -> Vec<EntityId> {
        self.all_entities()
            .filter(|e| e.owner == Some(owner))
            .map(|e| e.id)
            .collect()
    }

    /// Players in the given group, in insertion order.
    pub fn group_members(&self, group: u32) -> Vec<EntityId> {
        self.entities_by_kind(EntityKind::Player)
            .into_iter()
            .filter(|e| e.group == Some(group))
            .map(|e| e.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_world() -> World {
        World::new(WorldMeta::new("Test Region", RegionId(7)))
    }

    #[test]
    fn add_and_get_entity() {
        let mut world = test_world();
        let id = world.spawn(Entity::npc("Goblin", 5)).unwrap();
        let e = world.get_entity(id).unwrap();
        assert_eq!(e.name, "Goblin");
        assert_eq!(e.region, RegionId(7));
        assert!(world.is_present(id));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut world = test_world();
        let goblin = Entity::npc("Goblin", 5);
        world.spawn(goblin.clone()).unwrap();
        assert!(matches!(
            world.spawn(goblin),
            Err(CoreError::DuplicateId(_))
        ));
    }

    #[test]
    fn wrong_region_rejected() {
        let mut world = test_world();
        let result = world.add_entity(Entity::npc("Goblin", 5).in_region(RegionId(1)));
        assert!(matches!(result, Err(CoreError::WrongRegion { .. })));
    }

    #[test]
    fn shared_names_are_allowed_and_case_insensitive() {
        let mut world = test_world();
        let a = world.spawn(Entity::npc("Goblin", 5)).unwrap();
        let b = world.spawn(Entity::npc("Goblin", 6)).unwrap();
        assert_eq!(world.find_id_by_name("goblin"), Some(a));
        assert_eq!(world.find_all_by_name("GOBLIN"), vec![a, b]);
    }

    #[test]
    fn removed_handle_stops_resolving() {
        let mut world = test_world();
        let id = world.spawn(Entity::npc("Goblin", 5)).unwrap();
        let removed = world.remove_entity(id).unwrap();
        assert_eq!(removed.state, ObjectState::Deleted);
        assert!(world.get_entity(id).is_none());
        assert!(!world.is_present(id));
        assert!(world.find_by_name("goblin").is_none());
        assert!(matches!(
            world.remove_entity(id),
            Err(CoreError::EntityNotFound(_))
        ));
    }

    #[test]
    fn inactive_entity_is_not_present() {
        let mut world = test_world();
        let id = world.spawn(Entity::npc("Goblin", 5)).unwrap();
        world.set_state(id, ObjectState::Inactive).unwrap();
        assert!(world.contains(id));
        assert!(!world.is_present(id));
    }

    #[test]
    fn living_in_radius_filters_kind_range_and_death() {
        let mut world = test_world();
        let near = world
            .spawn(Entity::player("Near", 10).at(Point::flat(100, 0)))
            .unwrap();
        world
            .spawn(Entity::player("Far", 10).at(Point::flat(900, 0)))
            .unwrap();
        let dead = world
            .spawn(Entity::player("Dead", 10).at(Point::flat(50, 0)))
            .unwrap();
        world.get_entity_mut(dead).unwrap().health = 0;
        world
            .spawn(Entity::npc("Rat", 1).at(Point::flat(10, 0)))
            .unwrap();

        let found = world.living_in_radius(Point::flat(0, 0), 500, Some(EntityKind::Player));
        assert_eq!(found, vec![near]);
        assert_eq!(world.living_in_radius(Point::flat(0, 0), 500, None).len(), 2);
    }

    #[test]
    fn pets_and_group_members() {
        let mut world = test_world();
        let owner = world.spawn(Entity::player("Owner", 20).in_group(3)).unwrap();
        let mate = world.spawn(Entity::player("Mate", 18).in_group(3)).unwrap();
        world.spawn(Entity::player("Solo", 18)).unwrap();
        let pet = world.spawn(Entity::npc("Wolf", 15).owned_by(owner)).unwrap();

        assert_eq!(world.pets_of(owner), vec![pet]);
        assert_eq!(world.group_members(3), vec![owner, mate]);
    }
}
