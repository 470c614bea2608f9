/*!
Frame layout, checksum and validation.

A frame is exactly 29 bytes:

| Offset | Content                    |
|--------|----------------------------|
| 0      | Sync marker `0xD1`         |
| 1      | Device identity            |
| 2..5   | Rotation Y                 |
| 5..8   | Rotation X                 |
| 8..11  | Rotation Z                 |
| 11..14 | Translation X              |
| 14..17 | Translation Z              |
| 17..20 | Translation Y              |
| 20..23 | Zoom                       |
| 23..26 | Focus                      |
| 26..28 | Reserved                   |
| 28     | Checksum                   |
*/

use crate::error::FrameError;
use crate::field::{decode24_at, encode24};
use crate::protocol::{CHECKSUM_SEED, FRAME_LEN, SYNC_MARKER};

/// The 3-byte fields carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RotateX,
    RotateY,
    RotateZ,
    TranslateX,
    TranslateY,
    TranslateZ,
    Zoom,
    Focus,
}

impl Field {
    /// Byte offset of the field's most significant byte
    pub fn offset(self) -> usize {
        match self {
            Self::RotateY => 2,
            Self::RotateX => 5,
            Self::RotateZ => 8,
            Self::TranslateX => 11,
            Self::TranslateZ => 14,
            Self::TranslateY => 17,
            Self::Zoom => 20,
            Self::Focus => 23,
        }
    }
}

/// Checksum byte for the first 28 bytes of a frame
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    CHECKSUM_SEED.wrapping_sub(sum)
}

/// A complete 29-byte frame.
///
/// Frames handed out by the synchronizer have already passed [`Frame::validate`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Wrap raw bytes without validating them
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self { bytes }
    }

    /// Wrap and validate a slice
    pub fn parse(data: &[u8], expected_device_id: u8) -> Result<Self, FrameError> {
        let bytes: [u8; FRAME_LEN] = data
            .try_into()
            .map_err(|_| FrameError::InvalidLength(data.len()))?;
        let frame = Self { bytes };
        frame.validate(expected_device_id)?;
        Ok(frame)
    }

    /// Check device identity, then checksum
    pub fn validate(&self, expected_device_id: u8) -> Result<(), FrameError> {
        let found = self.device_id();
        if found != expected_device_id {
            return Err(FrameError::DeviceMismatch { expected: expected_device_id, found });
        }

        let expected = checksum(&self.bytes[..FRAME_LEN - 1]);
        let found = self.bytes[FRAME_LEN - 1];
        if expected != found {
            return Err(FrameError::Checksum { expected, found });
        }

        Ok(())
    }

    /// Device identity byte
    pub fn device_id(&self) -> u8 {
        self.bytes[1]
    }

    /// Raw unsigned value of a field
    pub fn raw(&self, field: Field) -> u32 {
        decode24_at(&self.bytes, field.offset())
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Frame").field(&hex::encode(self.bytes)).finish()
    }
}

/// Builds well-formed frames, mainly for synthetic sources and tests
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    bytes: [u8; FRAME_LEN],
}

impl FrameBuilder {
    pub fn new(device_id: u8) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = SYNC_MARKER;
        bytes[1] = device_id;
        Self { bytes }
    }

    /// Set a field to a raw 24-bit value
    pub fn field(mut self, field: Field, raw: u32) -> Self {
        let offset = field.offset();
        self.bytes[offset..offset + 3].copy_from_slice(&encode24(raw));
        self
    }

    /// Finish the frame, computing its checksum
    pub fn build(mut self) -> Frame {
        self.bytes[FRAME_LEN - 1] = checksum(&self.bytes[..FRAME_LEN - 1]);
        Frame { bytes: self.bytes }
    }
}
