//! packets handling module
//! This module includes the boot switch frame format and its encoding and decoding functions.
//!
//! A boot switch frame is carried directly in an Ethernet frame of type
//! `0x88B6`, the link layer header is handled by the socket or the firmware:
//!
//! ```text
//!  0       4       6
//!  +-------+-------+----------
//!  | magic | code  | (ignored)
//!  +-------+-------+----------
//! ```
//!
//! The code is stored little-endian. Requests leave the code at zero.

// core
use core::fmt;

// byteorder
use byteorder::{ByteOrder, LittleEndian};

// constants
use crate::constants::*;

/// Frame Decoding Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    TooShort(usize),
    BadMagic([u8; UNBS_MAGIC_LEN]),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::TooShort(len) => write!(f, "frame too short ({} bytes)", len),
            FrameError::BadMagic(m) => write!(f, "bad magic bytes {:02x?}", m),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// Decoded Boot Switch Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    code: Option<u16>,
    len: usize,
}

// DecodedFrame methods
impl DecodedFrame {
    // code() getter
    // None when the frame only carried the magic bytes
    pub fn code(&self) -> Option<u16> {
        self.code
    }
    // len() getter
    pub fn len(&self) -> usize {
        self.len
    }
    // is_unknown() method
    // true when the arbiter answered with the 'unknown requester' sentinel
    pub fn is_unknown(&self) -> bool {
        self.code == Some(UNBS_CODE_UNKNOWN)
    }
}

// encode_frame() function
fn encode_frame(code: u16) -> [u8; UNBS_FRAME_LEN] {
    let mut frame = [0u8; UNBS_FRAME_LEN];
    frame[..UNBS_MAGIC_LEN].copy_from_slice(&UNBS_MAGIC);
    LittleEndian::write_u16(&mut frame[UNBS_CODE_POS..UNBS_FRAME_LEN], code);
    frame
}

// encode_request() function
/// Build a boot code request frame
pub fn encode_request() -> [u8; UNBS_FRAME_LEN] {
    encode_frame(0)
}

// encode_response() function
/// Build a response frame carrying a boot code (or `UNBS_CODE_UNKNOWN`)
pub fn encode_response(code: u16) -> [u8; UNBS_FRAME_LEN] {
    encode_frame(code)
}

// decode() function
/// Validate and decode a received boot switch frame
///
/// The length is checked first, then the magic bytes; bytes beyond the
/// code are ignored.
pub fn decode(frame: &[u8]) -> Result<DecodedFrame, FrameError> {
    // ignore frames too short to hold the magic bytes
    if frame.len() < UNBS_MAGIC_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }

    // verify the magic bytes
    if frame[..UNBS_MAGIC_LEN] != UNBS_MAGIC {
        let mut magic = [0u8; UNBS_MAGIC_LEN];
        magic.copy_from_slice(&frame[..UNBS_MAGIC_LEN]);
        return Err(FrameError::BadMagic(magic));
    }

    // read the boot code, if present
    let code = if frame.len() >= UNBS_FRAME_LEN {
        Some(LittleEndian::read_u16(&frame[UNBS_CODE_POS..UNBS_FRAME_LEN]))
    } else {
        None
    };

    Ok(DecodedFrame {
        code,
        len: frame.len(),
    })
}

// Tests
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_layout() {
        assert_eq!(encode_request(), [0xB0, 0x07, 0xB0, 0x07, 0x00, 0x00]);
        let decoded = decode(&encode_request()).unwrap();
        assert_eq!(decoded.code(), Some(0));
        assert_eq!(decoded.len(), UNBS_FRAME_LEN);
    }

    #[test]
    fn response_is_little_endian() {
        assert_eq!(encode_response(0x0007), [0xB0, 0x07, 0xB0, 0x07, 0x07, 0x00]);
        assert_eq!(encode_response(0x1234)[4..], [0x34, 0x12]);
        let decoded = decode(&encode_response(0x2001)).unwrap();
        assert_eq!(decoded.code(), Some(0x2001));
        assert!(!decoded.is_unknown());
        assert!(decode(&encode_response(UNBS_CODE_UNKNOWN)).unwrap().is_unknown());
    }

    #[test]
    fn too_short_frames() {
        assert_eq!(decode(&[]), Err(FrameError::TooShort(0)));
        assert_eq!(decode(&[0xB0, 0x07, 0xB0]), Err(FrameError::TooShort(3)));
    }

    #[test]
    fn altered_magic() {
        let mut frame = encode_response(7);
        frame[0] = 0xB1;
        assert_eq!(
            decode(&frame),
            Err(FrameError::BadMagic([0xB1, 0x07, 0xB0, 0x07]))
        );
        // a short frame is reported as short before its magic is looked at
        assert_eq!(decode(&[0u8, 1, 2]), Err(FrameError::TooShort(3)));
    }

    #[test]
    fn magic_only_and_padded_frames() {
        // older agents only transmit the magic bytes
        let decoded = decode(&UNBS_MAGIC).unwrap();
        assert_eq!(decoded.code(), None);

        // zero-padded ethernet payloads are accepted, padding ignored
        let mut padded = [0xAAu8; 46];
        padded[..UNBS_FRAME_LEN].copy_from_slice(&encode_response(0x0102));
        assert_eq!(decode(&padded).unwrap().code(), Some(0x0102));
    }
}
