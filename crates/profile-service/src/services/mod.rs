//! Business logic for the profile service.

pub mod profile_mutator;

pub use profile_mutator::PatchOutcome;
