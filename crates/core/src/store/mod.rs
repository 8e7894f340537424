//! Built-in store adapters.

mod memory;

pub use memory::MemoryEntityStore;
