pub mod bahn;
pub mod embedding;
pub mod meta;
