//! Memory management for the builder.
//!
//! Node and leaf storage lives in chunked arenas: builder tasks bump-allocate from a chunk they own and only take
//! the shared pool's lock to fetch a fresh chunk or to retire a full one.

pub mod arena;

pub use arena::{Arena, ArenaAllocator, ArenaIndex, ArenaPool};
