//! Article block records and their API representation.

pub mod record;

pub use record::{image_fragment, Block, BlockView, MediaStatus, NewBlock};
