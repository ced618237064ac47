pub mod compressed;
pub mod fields;
pub mod full;
pub mod motion;
pub mod reader;
pub mod sequence;
pub mod update;
pub mod writer;

pub use compressed::{CompressedFlags, CompressedUpdate, OPTIONAL_FIELDS, OptionalField};
pub use fields::{ExtraParam, HoverText, NameValue, SoundAttachment};
pub use full::FullUpdate;
pub use motion::{MotionBounds, MotionLayout, PrecisionTier, TerseMotion};
pub use reader::WireReader;
pub use sequence::is_stale;
pub use update::{
    DecodeContext, DecodedUpdate, EncodingTag, UpdatePayload, UpdateRecord, parse_compressed_terse,
    write_compressed_terse,
};
pub use writer::WireWriter;
