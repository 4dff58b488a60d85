//! Data models for the ticket backend.
//!
//! Field names serialize in camelCase to match the frontend contract.

mod activity;
mod comment;
mod organization;
mod page;
mod project;
mod ticket;
mod user;

pub use activity::*;
pub use comment::*;
pub use organization::*;
pub use page::*;
pub use project::*;
pub use ticket::*;
pub use user::*;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
