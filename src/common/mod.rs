//! Domain types, request parsing and storage access shared by the engines.

pub mod grouping;
pub mod params;
pub mod table_reader;
pub mod types;
