use common::strum::{Display, EnumIter, EnumString};

/// The closed vocabulary of entities a [`crate::ResourceKey`] can carry.
///
/// Declaration order is the canonical rendering order used by
/// [`crate::ResourceKey`]'s `Display` impl and by key ordering; `Desc` is
/// deliberately last because its value is folded together with the
/// [`crate::Strategy`] block immediately before the suffix.
#[derive(
    Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
    #[strum(serialize = "sub")]
    Subject,
    #[strum(serialize = "ses")]
    Session,
    Run,
    Task,
    Space,
    Atlas,
    Roi,
    Label,
    #[strum(serialize = "hemi")]
    Hemisphere,
    From,
    To,
    Desc,
}

impl Entity {
    /// All entities in canonical order.
    pub fn all() -> impl Iterator<Item = Entity> {
        use common::strum::IntoEnumIterator;
        Entity::iter()
    }

    /// The branching entities: the ones whose distinct values expand the
    /// Cartesian product during [`crate::ResourcePool::extract`].
    pub fn is_branching(&self) -> bool {
        matches!(
            self,
            Entity::Subject | Entity::Session | Entity::Run | Entity::Task
        )
    }

    pub fn branching() -> impl Iterator<Item = Entity> {
        Entity::all().filter(Entity::is_branching)
    }
}
