//! Photos Module
//!
//! Location vocabulary and the idempotent photo store.

mod location;
mod store;

pub use location::{DamageSite, InvalidLocationLabel, PhotoLocation};
pub use store::{
    PhotoMetadata, PhotoRecord, PhotoStore, PhotoStoreError, PhotoUpload, PutOutcome, SlotState,
};
