use common::eyre::Result;
use resource_key::ResourceKey;

use crate::pool::{Lookup, ResourcePool};

/// A view over a [`ResourcePool`] narrowed to one branch/strategy
/// combination, as produced by [`ResourcePool::extract`] +
/// [`ResourcePool::scoped`].
///
/// Every key passed through [`StrategyResourcePool::get`]/`set`/`contains`
/// is first enriched with the combination's fixed branching-entity values
/// and strategy forks, so callers can address resources with short,
/// unqualified filters (`"T1w"`) and have them resolve against the full,
/// shared pool underneath.
pub struct StrategyResourcePool<'a, V> {
    pool: &'a mut ResourcePool<V>,
    strategy_key: ResourceKey,
}

impl<'a, V: Clone + PartialEq> StrategyResourcePool<'a, V> {
    pub fn new(pool: &'a mut ResourcePool<V>, strategy_key: ResourceKey) -> Self {
        Self { pool, strategy_key }
    }

    pub fn strategy_key(&self) -> &ResourceKey {
        &self.strategy_key
    }

    /// Merge this view's fixed context onto `key`: the context supplies
    /// defaults, `key`'s own entities/desc/tags win on conflict, and
    /// strategies are merged with `key`'s forks taking precedence.
    fn map_key(&self, key: &ResourceKey) -> Result<ResourceKey> {
        let mut entities = self.strategy_key.entities().clone();
        for (entity, value) in key.entities() {
            entities.insert(*entity, value.clone());
        }

        let desc_name = key
            .desc_name()
            .map(|s| s.to_string())
            .or_else(|| self.strategy_key.desc_name().map(|s| s.to_string()));

        let strategy = self.strategy_key.strategy().merged_with(key.strategy());

        ResourceKey::new(key.suffix(), entities, desc_name, strategy, key.tags().clone())
    }

    pub fn get(&self, key: &ResourceKey) -> Result<Option<Lookup<'_, V>>> {
        let mapped = self.map_key(key)?;
        Ok(self.pool.get(&mapped))
    }

    pub fn contains(&self, key: &ResourceKey) -> Result<bool> {
        let mapped = self.map_key(key)?;
        Ok(self.pool.contains(&mapped))
    }

    pub fn set(&mut self, key: ResourceKey, value: V) -> Result<()> {
        let mapped = self.map_key(&key)?;
        self.pool.set(mapped, value)
    }
}
