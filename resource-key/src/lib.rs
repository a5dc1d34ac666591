//! Structured resource identifiers ([`ResourceKey`]) and the [`Strategy`]
//! forks they can carry.
//!
//! A `ResourceKey` is both a concrete address for a value in a
//! [`resource_pool`](../resource_pool/index.html)-like container and, when it
//! carries `*`/`^` quantifiers, a filter that other keys can be matched
//! against. See [`ResourceKey::matches`] for the matching algebra and
//! [`ResourceKey::parse`]/`Display` for the BIDS-compatible string format.

mod entity;
mod key;
mod strategy;

pub use entity::Entity;
pub use key::{KeyOverrides, ResourceKey, ABSENT, ANY, ENTITY_SEP, STRAT_SEP, VALID_SUFFIXES};
pub use strategy::{Strategy, FORK_SEP, KEYVAL_SEP};
