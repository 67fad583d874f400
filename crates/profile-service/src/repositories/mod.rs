//! Database access for the profile service.

pub mod profiles;
