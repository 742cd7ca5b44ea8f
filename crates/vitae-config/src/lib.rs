//! # vitae-config
//!
//! Configuration schema, loading, and validation. Loading happens once at
//! startup; components receive the parts of the config they need at
//! construction time; there is no process-wide settings object.

pub mod loader;
pub mod schema;

pub use loader::load;
pub use schema::VitaeConfig;
