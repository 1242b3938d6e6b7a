//! Bounded collections used by the engines.
//!
//! - **[`ring_buffer`]**: fixed-capacity outcome history that drops the oldest
//!   record on overflow

pub mod ring_buffer;

pub use ring_buffer::RingBuffer;
