//! Built-in `EntityStore` backends.

pub mod memory;

pub use memory::MemoryStore;
