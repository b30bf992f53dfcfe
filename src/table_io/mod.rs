//! Adapters that produce input tables and persist results.
pub mod csv;
pub mod random;
