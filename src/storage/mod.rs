mod engine;
mod in_memory;
mod manager;
mod term_index_mapping;

pub use engine::SnapshotInfo;
pub use engine::SnapshotStatus;
pub use engine::StorageEngineMethods;
pub use engine::StorageMetadata;
pub use engine::WriteOptions;
pub use in_memory::InMemoryStorageEngine;
pub use manager::StorageManager;
pub use term_index_mapping::TermIndexMapping;
