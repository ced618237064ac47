use crate::store::RegionHandle;
use crate::wire::EncodingTag;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("declared payload length {declared} does not match {actual} received bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("no {tag:?} layout is {len} bytes long")]
    UnsupportedLength { tag: EncodingTag, len: usize },
    #[error("{remaining} unread bytes after {tag:?} payload")]
    TrailingBytes { tag: EncodingTag, remaining: usize },
    #[error("string field is not NUL-terminated UTF-8")]
    InvalidString,
    #[error("length-prefixed blob declared a negative size")]
    NegativeBlobSize,
    #[error("update for unregistered region {0}")]
    UnknownRegion(RegionHandle),
    #[error("kinematic update for unknown entity {local_id} in region {region}")]
    UnknownEntity { region: RegionHandle, local_id: u32 },
    #[error("record would create an entity but carries no global id")]
    MissingIdentity,
}
