use std::collections::{BTreeMap, BTreeSet};

use common::eyre::{bail, Result};
use resource_key::{Entity, KeyOverrides, ResourceKey, Strategy, ANY};

/// The result of [`ResourcePool::get`]: either the single best match for a
/// concrete lookup, or every entry satisfying a filter lookup.
#[derive(Debug)]
pub enum Lookup<'a, V> {
    One(&'a V),
    Many(Vec<(&'a ResourceKey, &'a V)>),
}

/// A keyed container mapping [`ResourceKey`] to a resource value `V`, with
/// auxiliary indexes by suffix, tag and branching-entity value, supporting
/// the `extract` query used to materialize strategy/branch combinations.
///
/// `V` is generic so this crate has no notion of "job" or "computed
/// resource": callers (e.g. `execution-graph`) instantiate `ResourcePool<V>`
/// with their own resource value type.
#[derive(Debug, Clone)]
pub struct ResourcePool<V> {
    pool: BTreeMap<ResourceKey, V>,
    by_suffix: BTreeMap<String, BTreeSet<ResourceKey>>,
    by_tag: BTreeMap<String, BTreeSet<ResourceKey>>,
    branches: BTreeMap<Entity, BTreeSet<String>>,
    branched_resources: BTreeMap<Entity, BTreeSet<ResourceKey>>,
}

impl<V> Default for ResourcePool<V> {
    fn default() -> Self {
        Self {
            pool: BTreeMap::new(),
            by_suffix: BTreeMap::new(),
            by_tag: BTreeMap::new(),
            branches: BTreeMap::new(),
            branched_resources: BTreeMap::new(),
        }
    }
}

impl<V: Clone + PartialEq> ResourcePool<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKey, &V)> {
        self.pool.iter()
    }

    fn branching_clean_key(key: &ResourceKey) -> Result<ResourceKey> {
        let mut overrides = KeyOverrides::new();
        for entity in Entity::branching() {
            overrides = overrides.remove(entity);
        }
        key.with(overrides)
    }

    /// Insert a resource under a concrete key. Fails if `key` is a filter or
    /// already present.
    pub fn set(&mut self, key: ResourceKey, value: V) -> Result<()> {
        if key.is_filter() {
            bail!("resource key cannot be a filter: {key}");
        }
        if self.pool.contains_key(&key) {
            bail!("resource key {key} already exists in the pool");
        }

        self.by_suffix
            .entry(key.suffix().to_string())
            .or_default()
            .insert(key.clone());

        for tag in key.tags() {
            self.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        }

        let clean = Self::branching_clean_key(&key)?;
        for entity in Entity::branching() {
            if let Some(value) = key.entity(entity) {
                self.branches.entry(entity).or_default().insert(value.to_string());
                self.branched_resources
                    .entry(entity)
                    .or_default()
                    .insert(clean.clone());
            }
        }

        self.pool.insert(key, value);
        Ok(())
    }

    /// True if any stored key satisfies `key` (`key` acting as the filter).
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.pool.keys().any(|stored| key.matches(stored))
    }

    /// Resolve `key` against the pool.
    ///
    /// If `key` is concrete, returns the exact entry, or failing that the
    /// greatest stored key (by [`ResourceKey`]'s total order) that satisfies
    /// it. If `key` is a filter, returns every satisfying entry.
    pub fn get(&self, key: &ResourceKey) -> Option<Lookup<'_, V>> {
        if key.is_filter() {
            let matches: Vec<(&ResourceKey, &V)> = self
                .pool
                .iter()
                .filter(|(stored, _)| key.matches(stored))
                .collect();
            return Some(Lookup::Many(matches));
        }

        if let Some(value) = self.pool.get(key) {
            return Some(Lookup::One(value));
        }

        let best = self
            .pool
            .keys()
            .filter(|stored| key.matches(stored))
            .max()?;
        self.pool.get(best).map(Lookup::One)
    }

    /// Lookup entries by suffix, as registered through [`ResourcePool::set`].
    pub fn by_suffix(&self, suffix: &str) -> Vec<(&ResourceKey, &V)> {
        self.by_suffix
            .get(suffix)
            .into_iter()
            .flatten()
            .filter_map(|k| self.pool.get(k).map(|v| (k, v)))
            .collect()
    }

    /// Lookup entries by tag, as registered through [`ResourcePool::set`].
    pub fn by_tag(&self, tag: &str) -> Vec<(&ResourceKey, &V)> {
        self.by_tag
            .get(tag)
            .into_iter()
            .flatten()
            .filter_map(|k| self.pool.get(k).map(|v| (k, v)))
            .collect()
    }

    /// Narrow this pool to a view scoped to one `strategy_key`, as returned
    /// by [`ResourcePool::extract`].
    pub fn scoped(&mut self, strategy_key: ResourceKey) -> crate::scoped::StrategyResourcePool<'_, V> {
        crate::scoped::StrategyResourcePool::new(self, strategy_key)
    }

    /// The central query operation: yields, for every valid combination of
    /// branching values and strategy forks observed among the entries
    /// matching `requests`, a `strategy_key` identifying that combination.
    ///
    /// Use [`ResourcePool::scoped`] with each returned key to get a view
    /// narrowed to that combination.
    pub fn extract(&self, requests: &[ResourceKey]) -> Result<Vec<ResourceKey>> {
        let too_broad: Vec<&ResourceKey> = requests.iter().filter(|r| r.is_broad()).collect();
        if !too_broad.is_empty() {
            bail!("extracted resource keys too broad: {too_broad:?}");
        }

        let matches: Vec<Vec<&ResourceKey>> = requests
            .iter()
            .map(|req| self.pool.keys().filter(|stored| req.matches(stored)).collect())
            .collect();

        let mut strategies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for matched in &matches {
            for key in matched {
                for (name, value) in key.strategy().iter() {
                    strategies
                        .entry(name.to_string())
                        .or_default()
                        .insert(value.to_string());
                }
            }
        }

        let active_entities: Vec<Entity> = Entity::branching()
            .filter(|entity| {
                let has_branching = self
                    .branches
                    .get(entity)
                    .map(|values| !values.is_empty())
                    .unwrap_or(false);
                if !has_branching {
                    return false;
                }

                // A request that pins this entity to a concrete value has
                // already resolved it; only an absent or explicitly
                // wildcarded (`*`) request entity leaves it open to branch.
                let not_pinned = requests.iter().all(|req| match req.entity(*entity) {
                    None => true,
                    Some(value) => value == ANY,
                });
                if !not_pinned {
                    return false;
                }

                matches
                    .iter()
                    .flatten()
                    .any(|key| key.entity(*entity).is_some())
            })
            .collect();

        let branching_values: Vec<Vec<String>> = active_entities
            .iter()
            .map(|entity| {
                self.branches
                    .get(entity)
                    .map(|values| values.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .collect();

        let strategy_names: Vec<String> = strategies.keys().cloned().collect();
        let strategy_value_sets: Vec<Vec<String>> = strategy_names
            .iter()
            .map(|name| strategies[name].iter().cloned().collect())
            .collect();

        let mut results = Vec::new();

        for branching_combo in cartesian_product(&branching_values) {
            let expected_branching: BTreeMap<Entity, String> = active_entities
                .iter()
                .copied()
                .zip(branching_combo.iter().cloned())
                .collect();

            for strategy_combo in cartesian_product(&strategy_value_sets) {
                let strategy_combination =
                    Strategy::from_pairs(strategy_names.iter().cloned().zip(strategy_combo.iter().cloned()));

                if let Some(strategy_key) = self.try_combination(
                    requests,
                    &matches,
                    &expected_branching,
                    &strategy_combination,
                )? {
                    results.push(strategy_key);
                }
            }
        }

        Ok(results)
    }

    fn try_combination(
        &self,
        requests: &[ResourceKey],
        matches: &[Vec<&ResourceKey>],
        expected_branching: &BTreeMap<Entity, String>,
        strategy_combination: &Strategy,
    ) -> Result<Option<ResourceKey>> {
        for (request, candidates) in requests.iter().zip(matches.iter()) {
            let mut overrides = KeyOverrides::new();
            if !strategy_combination.is_empty() {
                overrides = overrides.strategy(strategy_combination.clone());
            }
            for (entity, value) in expected_branching {
                overrides = overrides.set(*entity, value.clone());
            }
            let resource_filter = request.with(overrides)?;

            let satisfied: Vec<&&ResourceKey> = candidates
                .iter()
                .filter(|candidate| resource_filter.matches(candidate))
                .collect();

            if satisfied.is_empty() {
                return Ok(None);
            }

            // Every stored entry satisfying this request under this
            // branching/strategy combination is the same logical slot as
            // far as `request` is concerned; if they disagree on value
            // that is the inconsistent-binding hard error (§4.3), not
            // something a per-candidate check (keyed by the differing
            // candidate keys themselves) could ever catch.
            let mut resolved: Option<&V> = None;
            for candidate in satisfied {
                let value = self
                    .pool
                    .get(*candidate)
                    .expect("candidate key was drawn from this pool");
                match resolved {
                    Some(existing) if existing != value => {
                        bail!(
                            "inconsistent resolution extracting {request}: two entries bind it to different resources"
                        );
                    }
                    _ => resolved = Some(value),
                }
            }
        }

        let mut overrides = KeyOverrides::new().suffix(ANY);
        if !strategy_combination.is_empty() {
            overrides = overrides.strategy(strategy_combination.clone());
        }
        for (entity, value) in expected_branching {
            overrides = overrides.set(*entity, value.clone());
        }
        let strategy_key = ResourceKey::of_suffix(ANY)?.with(overrides)?;
        Ok(Some(strategy_key))
    }
}

/// The Cartesian product of a list of value sets, flattened to owned
/// `Vec<String>` rows. An empty `dims` yields a single empty row, matching
/// the convention that "no dimensions" means "exactly one combination".
fn cartesian_product(dims: &[Vec<String>]) -> Vec<Vec<String>> {
    dims.iter().fold(vec![vec![]], |acc, dim| {
        if dim.is_empty() {
            return acc;
        }
        acc.into_iter()
            .flat_map(|prefix| {
                dim.iter().map(move |value| {
                    let mut row = prefix.clone();
                    row.push(value.clone());
                    row
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::parse(s).unwrap()
    }

    #[test]
    fn set_rejects_filter_keys() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        let err = pool.set(key("space-*_T1w"), "x".to_string()).unwrap_err();
        assert!(err.to_string().contains("filter"));
    }

    #[test]
    fn set_rejects_duplicate_keys() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("sub-001_T1w"), "a".to_string()).unwrap();
        let err = pool
            .set(key("sub-001_T1w"), "b".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn get_falls_back_to_greatest_satisfying_key() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("sub-001_T1w"), "generic".to_string()).unwrap();
        pool.set(key("sub-001_ses-001_T1w"), "specific".to_string())
            .unwrap();

        match pool.get(&key("sub-001_ses-001_T1w")).unwrap() {
            Lookup::One(v) => assert_eq!(v, "specific"),
            _ => panic!("expected a single match"),
        }
    }

    #[test]
    fn get_filter_returns_every_satisfying_entry() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("sub-001_T1w"), "a".to_string()).unwrap();
        pool.set(key("sub-002_T1w"), "b".to_string()).unwrap();

        match pool.get(&key("sub-*_T1w")).unwrap() {
            Lookup::Many(entries) => assert_eq!(entries.len(), 2),
            _ => panic!("expected multiple matches"),
        }
    }

    #[test]
    fn extract_rejects_broad_keys() {
        let pool: ResourcePool<String> = ResourcePool::new();
        let err = pool.extract(&[key("*")]).unwrap_err();
        assert!(err.to_string().contains("too broad"));
    }

    #[test]
    fn extract_basic_chain_yields_single_combination() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("sub-001_T1w"), "/a/b/c.nii.gz".to_string())
            .unwrap();

        let combos = pool.extract(&[key("sub-001_T1w")]).unwrap();
        assert_eq!(combos.len(), 1);
    }

    #[test]
    fn extract_strategy_forks_yields_cartesian_product() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("space-orig_T1w"), "t1w".to_string()).unwrap();
        pool.set(key("space-orig_mask"), "mask".to_string()).unwrap();
        pool.set(
            key("space-orig_desc-skullstrip-afni+nuis-gsr_bold"),
            "bold-afni-gsr".to_string(),
        )
        .unwrap();
        pool.set(
            key("space-orig_desc-skullstrip-afni+nuis-nogsr_bold"),
            "bold-afni-nogsr".to_string(),
        )
        .unwrap();
        pool.set(
            key("space-orig_desc-skullstrip-bet+nuis-gsr_bold"),
            "bold-bet-gsr".to_string(),
        )
        .unwrap();
        pool.set(
            key("space-orig_desc-skullstrip-bet+nuis-nogsr_bold"),
            "bold-bet-nogsr".to_string(),
        )
        .unwrap();

        let combos = pool
            .extract(&[key("space-orig_T1w"), key("space-orig_mask"), key("space-orig_bold")])
            .unwrap();
        assert_eq!(combos.len(), 4);
    }

    #[test]
    fn extract_branches_over_subject_session_run() {
        let mut pool: ResourcePool<String> = ResourcePool::new();
        for sub in 1..=4 {
            for ses in 1..=3 {
                for run in 1..=2 {
                    let k = format!("sub-{sub:03}_ses-{ses:03}_run-{run}_space-orig_T1w");
                    pool.set(key(&k), "t1w".to_string()).unwrap();
                    let k = format!("sub-{sub:03}_ses-{ses:03}_run-{run}_space-orig_mask");
                    pool.set(key(&k), "mask".to_string()).unwrap();
                    let k = format!("sub-{sub:03}_ses-{ses:03}_run-{run}_space-orig_bold");
                    pool.set(key(&k), "bold".to_string()).unwrap();
                }
            }
        }

        let combos = pool
            .extract(&[
                key("sub-*_space-orig_T1w"),
                key("sub-*_space-orig_mask"),
                key("sub-*_space-orig_bold"),
            ])
            .unwrap();
        assert_eq!(combos.len(), 24);
    }

    #[test]
    fn extract_reports_inconsistent_binding() {
        // Two distinct stored keys both satisfy the single request filter
        // and disagree in value; the request collapses both into one
        // logical slot, which must be a hard error.
        let mut pool: ResourcePool<String> = ResourcePool::new();
        pool.set(key("sub-001_label-a_T1w"), "a".to_string()).unwrap();
        pool.set(key("sub-001_label-b_T1w"), "b".to_string()).unwrap();

        let err = pool.extract(&[key("sub-001_T1w")]);
        assert!(err.is_err());
    }
}
