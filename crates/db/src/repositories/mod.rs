pub mod bahn_repo;
pub mod copy;
pub mod embedding_repo;
pub mod meta_repo;

pub use bahn_repo::BahnRepo;
pub use embedding_repo::EmbeddingRepo;
pub use meta_repo::MetaRepo;
