//! Frame format of the multiplexed exec output stream.
//!
//! ```text
//! byte  0      1  2  3     4  5  6  7      8 ..
//!      [tag ] [reserved ] [ length BE u32 ] [ payload ... ]
//! ```
//!
//! Tag 2 marks stderr. Every other tag value is treated as stdout.

use bytes::{BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 8;

const STDOUT_TAG: u8 = 1;
const STDERR_TAG: u8 = 2;

/// Output channel a chunk was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub fn from_tag(tag: u8) -> Self {
        if tag == STDERR_TAG {
            Channel::Stderr
        } else {
            Channel::Stdout
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Channel::Stdout => STDOUT_TAG,
            Channel::Stderr => STDERR_TAG,
        }
    }
}

/// One demultiplexed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub channel: Channel,
    pub data: Bytes,
}

impl OutputChunk {
    pub fn stdout(data: impl Into<Bytes>) -> Self {
        Self {
            channel: Channel::Stdout,
            data: data.into(),
        }
    }

    pub fn stderr(data: impl Into<Bytes>) -> Self {
        Self {
            channel: Channel::Stderr,
            data: data.into(),
        }
    }
}

/// Encode one frame.
pub fn encode_frame(channel: Channel, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(channel.tag());
    buf.put_bytes(0, 3);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split one complete frame off the front of `buf`, if one is available.
///
/// Leaves `buf` untouched when the header or payload is incomplete.
pub fn split_frame(buf: &mut BytesMut) -> Option<OutputChunk> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if buf.len() < HEADER_LEN + len {
        return None;
    }

    let channel = Channel::from_tag(buf[0]);
    let mut frame = buf.split_to(HEADER_LEN + len);
    let data = frame.split_off(HEADER_LEN).freeze();
    Some(OutputChunk { channel, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let frame = encode_frame(Channel::Stderr, b"oops");
        assert_eq!(&frame[..], &[2, 0, 0, 0, 0, 0, 0, 4, b'o', b'o', b'p', b's']);
    }

    #[test]
    fn unknown_tags_map_to_stdout() {
        assert_eq!(Channel::from_tag(0), Channel::Stdout);
        assert_eq!(Channel::from_tag(1), Channel::Stdout);
        assert_eq!(Channel::from_tag(2), Channel::Stderr);
        assert_eq!(Channel::from_tag(7), Channel::Stdout);
    }

    #[test]
    fn split_waits_for_full_header_and_payload() {
        let frame = encode_frame(Channel::Stdout, b"hello");

        let mut buf = BytesMut::from(&frame[..5]);
        assert!(split_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&frame[5..10]);
        assert!(split_frame(&mut buf).is_none());

        buf.extend_from_slice(&frame[10..]);
        let chunk = split_frame(&mut buf).unwrap();
        assert_eq!(chunk, OutputChunk::stdout(&b"hello"[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn split_ignores_reserved_bytes() {
        let mut buf = BytesMut::from(&[2u8, 9, 9, 9, 0, 0, 0, 1, b'x'][..]);
        assert_eq!(split_frame(&mut buf).unwrap(), OutputChunk::stderr(&b"x"[..]));
    }

    #[test]
    fn split_empty_payload() {
        let mut buf = BytesMut::from(&encode_frame(Channel::Stdout, b"")[..]);
        let chunk = split_frame(&mut buf).unwrap();
        assert!(chunk.data.is_empty());
        assert!(buf.is_empty());
    }
}
