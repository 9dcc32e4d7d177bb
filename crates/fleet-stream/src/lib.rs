//! fleet-stream: demultiplexing of combined exec output.
//!
//! Executions deliver stdout and stderr over a single byte stream made of
//! 8-byte-header frames. [`Demuxer`] turns that stream back into ordered,
//! channel-tagged chunks; [`encode_frame`] builds frames in the same format.

pub mod demux;
pub mod error;
pub mod frame;

pub use demux::{Demuxer, ExecOutput};
pub use error::DemuxError;
pub use frame::{Channel, HEADER_LEN, OutputChunk, encode_frame, split_frame};
