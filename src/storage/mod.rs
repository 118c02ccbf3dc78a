pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use traits::StateStore;
