//! Cache store implementations

pub mod distributed;
pub mod file;
pub mod memory;

pub use distributed::DistributedStore;
pub use file::FileStore;
pub use memory::MemoryStore;
