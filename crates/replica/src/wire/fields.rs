use serde::{Deserialize, Serialize};

use super::{WireReader, WireWriter};
use crate::error::DecodeError;
use crate::store::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundAttachment {
    pub sound_id: ObjectId,
    pub gain: f32,
    pub flags: u8,
    pub radius: f32,
}

/// Floating text drawn above an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverText {
    pub text: String,
    pub color: [u8; 4],
}

impl HoverText {
    /// Builds from wire bytes, where the alpha channel arrives inverted.
    pub fn from_wire(text: String, wire_color: [u8; 4]) -> Self {
        let [r, g, b, a] = wire_color;
        Self {
            text,
            color: [r, g, b, 255 - a],
        }
    }

    pub fn wire_color(&self) -> [u8; 4] {
        let [r, g, b, a] = self.color;
        [r, g, b, 255 - a]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraParam {
    pub kind: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value_type: String,
    pub class: String,
    pub send_to: String,
    pub value: String,
}

/// Parses newline-separated `Name TYPE CLASS SENDTO value...` lines. Lines
/// with fewer than five tokens are skipped.
pub fn parse_name_values(text: &str) -> Vec<NameValue> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(value_type), Some(class), Some(send_to)) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            if !line.trim().is_empty() {
                log::debug!("skipping malformed name-value line {line:?}");
            }
            continue;
        };

        let value = tokens.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            log::debug!("skipping name-value {name} without a value");
            continue;
        }

        out.push(NameValue {
            name: name.to_owned(),
            value_type: value_type.to_owned(),
            class: class.to_owned(),
            send_to: send_to.to_owned(),
            value,
        });
    }
    out
}

pub fn format_name_values(values: &[NameValue]) -> String {
    values
        .iter()
        .map(|nv| {
            format!(
                "{} {} {} {} {}",
                nv.name, nv.value_type, nv.class, nv.send_to, nv.value
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn read_extra_params(reader: &mut WireReader<'_>) -> Result<Vec<ExtraParam>, DecodeError> {
    let count = reader.read_u8()?;
    let mut params = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = reader.read_u16()?;
        let data = reader.read_sized_blob()?;
        params.push(ExtraParam { kind, data });
    }
    Ok(params)
}

pub fn write_extra_params(writer: &mut WireWriter, params: &[ExtraParam]) {
    let count = params.len().min(u8::MAX as usize);
    writer.write_u8(count as u8);
    for param in &params[..count] {
        writer.write_u16(param.kind).write_sized_blob(&param.data);
    }
}
