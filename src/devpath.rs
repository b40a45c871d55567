//! device path module
//! This module provides a structured decoder and encoder for firmware device paths.
//!
//! A device path is a sequence of variable-length nodes, each starting with a
//! four byte header (type, sub-type, little-endian total length), terminated
//! by an end node of type `0x7F`.

// alloc
use alloc::vec::Vec;

// core
use core::fmt;

// byteorder
use byteorder::{ByteOrder, LittleEndian};

// constants
use crate::constants::*;

/// Device Path Decoding Error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePathError {
    // node header or body runs past the end of the buffer
    Truncated { offset: usize },
    // node length smaller than its own header
    BadNodeLength { offset: usize, length: u16 },
    // no end node before the end of the buffer
    Unterminated,
    // node body does not fit the 16-bit length field
    NodeTooLong(usize),
}

impl fmt::Display for DevicePathError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DevicePathError::Truncated { offset } => {
                write!(f, "device path node truncated at offset {}", offset)
            }
            DevicePathError::BadNodeLength { offset, length } => write!(
                f,
                "device path node at offset {} has invalid length {}",
                offset, length
            ),
            DevicePathError::Unterminated => write!(f, "device path has no end node"),
            DevicePathError::NodeTooLong(len) => {
                write!(f, "device path node body of {} bytes is too long", len)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DevicePathError {}

/// Device Path Node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePathNode {
    kind: u8,
    sub_kind: u8,
    data: Vec<u8>,
}

// DevicePathNode methods
impl DevicePathNode {
    // new() method
    pub fn new(kind: u8, sub_kind: u8, data: Vec<u8>) -> Result<DevicePathNode, DevicePathError> {
        if data.len() > usize::from(u16::MAX) - EFI_DP_HEADER_LEN {
            return Err(DevicePathError::NodeTooLong(data.len()));
        }
        Ok(DevicePathNode {
            kind,
            sub_kind,
            data,
        })
    }
    // file_path() method
    // build a media file path node from a file name
    pub fn file_path(name: &str) -> Result<DevicePathNode, DevicePathError> {
        let mut data = Vec::with_capacity((name.len() + 1) * 2);
        for unit in name.encode_utf16().chain(core::iter::once(0)) {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        DevicePathNode::new(EFI_DP_TYPE_MEDIA, EFI_DP_SUBTYPE_FILE_PATH, data)
    }
    // getters
    pub fn kind(&self) -> u8 {
        self.kind
    }
    pub fn sub_kind(&self) -> u8 {
        self.sub_kind
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    // encoded_len() method
    pub fn encoded_len(&self) -> usize {
        EFI_DP_HEADER_LEN + self.data.len()
    }
    pub fn is_hard_drive(&self) -> bool {
        self.kind == EFI_DP_TYPE_MEDIA && self.sub_kind == EFI_DP_SUBTYPE_HARD_DRIVE
    }
    pub fn is_file_path(&self) -> bool {
        self.kind == EFI_DP_TYPE_MEDIA && self.sub_kind == EFI_DP_SUBTYPE_FILE_PATH
    }
    // encode_into() method
    fn encode_into(&self, out: &mut Vec<u8>) {
        let mut length = [0u8; 2];
        // bounded by new()
        LittleEndian::write_u16(&mut length, self.encoded_len() as u16);
        out.push(self.kind);
        out.push(self.sub_kind);
        out.extend_from_slice(&length);
        out.extend_from_slice(&self.data);
    }
    // utf16_units() method
    // iterate over the NUL-terminated UCS-2 string of a file path node
    fn utf16_units<'a>(&'a self) -> impl Iterator<Item = u16> + 'a {
        self.data
            .chunks_exact(2)
            .map(|c| LittleEndian::read_u16(c))
            .take_while(|&u| u != 0)
    }
}

impl fmt::Display for DevicePathNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_file_path() {
            write!(f, "File(")?;
            for c in core::char::decode_utf16(self.utf16_units()) {
                write!(f, "{}", c.unwrap_or(core::char::REPLACEMENT_CHARACTER))?;
            }
            write!(f, ")")
        } else if self.is_hard_drive() && self.data.len() >= 4 {
            write!(f, "HD({})", LittleEndian::read_u32(&self.data[..4]))
        } else {
            write!(f, "Path({},{})", self.kind, self.sub_kind)
        }
    }
}

/// Device Path
///
/// The terminating end node is implied and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevicePath {
    nodes: Vec<DevicePathNode>,
}

// DevicePath methods
impl DevicePath {
    // new() method
    pub fn new(nodes: Vec<DevicePathNode>) -> DevicePath {
        DevicePath { nodes }
    }

    // decode() method
    /// Decode the first device path instance found in `bytes`
    ///
    /// Returns the path and the number of bytes consumed, end node included.
    /// Decoding stops at the first end node, either end-of-instance or
    /// end-of-path.
    pub fn decode(bytes: &[u8]) -> Result<(DevicePath, usize), DevicePathError> {
        let mut nodes = Vec::new();
        let mut offset = 0;

        loop {
            if offset == bytes.len() {
                return Err(DevicePathError::Unterminated);
            }
            if bytes.len() - offset < EFI_DP_HEADER_LEN {
                return Err(DevicePathError::Truncated { offset });
            }

            // read node header
            let kind = bytes[offset];
            let sub_kind = bytes[offset + 1];
            let length = LittleEndian::read_u16(&bytes[offset + 2..offset + 4]);
            if usize::from(length) < EFI_DP_HEADER_LEN {
                return Err(DevicePathError::BadNodeLength { offset, length });
            }
            let end = offset + usize::from(length);
            if end > bytes.len() {
                return Err(DevicePathError::Truncated { offset });
            }

            if kind == EFI_DP_TYPE_END {
                return Ok((DevicePath { nodes }, end));
            }

            nodes.push(DevicePathNode {
                kind,
                sub_kind,
                data: bytes[offset + EFI_DP_HEADER_LEN..end].to_vec(),
            });
            offset = end;
        }
    }

    // from_bytes() method
    pub fn from_bytes(bytes: &[u8]) -> Result<DevicePath, DevicePathError> {
        DevicePath::decode(bytes).map(|(path, _)| path)
    }

    // to_bytes() method
    /// Encode the path, terminated by an end-of-path node
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for node in &self.nodes {
            node.encode_into(&mut out);
        }
        out.extend_from_slice(&[
            EFI_DP_TYPE_END,
            EFI_DP_SUBTYPE_END_ENTIRE,
            EFI_DP_HEADER_LEN as u8,
            0,
        ]);
        out
    }

    // encoded_len() method
    pub fn encoded_len(&self) -> usize {
        self.nodes.iter().map(|n| n.encoded_len()).sum::<usize>() + EFI_DP_HEADER_LEN
    }

    // getters
    pub fn nodes(&self) -> &[DevicePathNode] {
        &self.nodes
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn first(&self) -> Option<&DevicePathNode> {
        self.nodes.first()
    }
    // last() method
    // for a volume this is the partition node
    pub fn last(&self) -> Option<&DevicePathNode> {
        self.nodes.last()
    }

    // push() method
    pub fn push(&mut self, node: DevicePathNode) {
        self.nodes.push(node);
    }

    // append() method
    /// Build a new path made of this path followed by `suffix`
    pub fn append(&self, suffix: &[DevicePathNode]) -> DevicePath {
        let mut nodes = Vec::with_capacity(self.nodes.len() + suffix.len());
        nodes.extend_from_slice(&self.nodes);
        nodes.extend_from_slice(suffix);
        DevicePath { nodes }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.nodes.is_empty() {
            return write!(f, "End");
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", node)?;
        }
        Ok(())
    }
}
