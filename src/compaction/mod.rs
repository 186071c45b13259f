mod manager;

pub use manager::CompactResult;
pub use manager::CompactionManager;
pub use manager::CompactionRecord;
pub use manager::CompactionStatus;
pub use manager::CompactionStopReason;
