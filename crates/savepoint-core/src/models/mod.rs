//! Domain models: save records, slot catalog, and sync conflicts.

pub mod conflict;
pub mod save;
pub mod slot;

pub use conflict::{ConflictRecord, ConflictType, ResolutionOption, ResolutionStrategy};
pub use save::{SaveId, SaveMetadata, SaveOptions, SaveRecord};
pub use slot::{SlotDefinition, SlotRegistry};
