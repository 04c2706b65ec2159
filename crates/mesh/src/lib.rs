//! Face-exposure meshing for sub-chunks.
//!
//! Turns a sub-chunk's block and light arrays (plus its neighbors' boundary
//! slabs) into renderable vertex/index buffers, split into an opaque and a
//! transparent pass.

mod atlas;
mod mesher;

pub use atlas::*;
pub use mesher::*;
