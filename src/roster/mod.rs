//! Roster helpers: squad identities and draft ordering

pub mod draft;
pub mod squad;

pub use draft::{draft_order, DraftPick, DraftSide};
pub use squad::{Resolution, SquadRegistry};
