use glam::Vec3;

use super::fields::{self, ExtraParam, HoverText, NameValue, SoundAttachment};
use super::motion::{MotionBounds, MotionLayout, TerseMotion};
use super::{EncodingTag, WireReader, WireWriter, reader::text_from_bytes};
use crate::error::DecodeError;
use crate::store::ObjectId;

/// Unquantized record carrying every attribute of an object.
#[derive(Debug, Clone, PartialEq)]
pub struct FullUpdate {
    pub crc: u32,
    pub parent_id: u32,
    pub owner: Option<ObjectId>,
    pub sound: Option<SoundAttachment>,
    pub material: u8,
    pub click_action: u8,
    pub scale: Vec3,
    pub motion: TerseMotion,
    pub update_flags: u32,
    pub state: u8,
    pub name_values: Vec<NameValue>,
    pub data: Vec<u8>,
    pub text: Option<HoverText>,
    pub media_url: Option<String>,
    pub particle_system: Vec<u8>,
    pub extra_params: Vec<ExtraParam>,
}

impl FullUpdate {
    pub fn new(motion: TerseMotion) -> Self {
        Self {
            crc: 0,
            parent_id: 0,
            owner: None,
            sound: None,
            material: 0,
            click_action: 0,
            scale: Vec3::ONE,
            motion,
            update_flags: 0,
            state: 0,
            name_values: Vec::new(),
            data: Vec::new(),
            text: None,
            media_url: None,
            particle_system: Vec::new(),
            extra_params: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8], bounds: &MotionBounds) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(bytes);

        let crc = reader.read_u32()?;
        let parent_id = reader.read_u32()?;
        let sound_id = reader.read_object_id()?;
        let owner_id = reader.read_object_id()?;
        let gain = reader.read_f32()?;
        let sound_flags = reader.read_u8()?;
        let radius = reader.read_f32()?;
        let material = reader.read_u8()?;
        let click_action = reader.read_u8()?;
        let scale = reader.read_vec3()?;

        let motion_bytes = reader.read_blob_u8()?;
        let layout =
            MotionLayout::from_len(motion_bytes.len()).ok_or(DecodeError::UnsupportedLength {
                tag: EncodingTag::Full,
                len: motion_bytes.len(),
            })?;
        let motion = TerseMotion::read(&mut WireReader::new(&motion_bytes), layout, bounds)?;

        let update_flags = reader.read_u32()?;
        let state = reader.read_u8()?;
        let name_values = fields::parse_name_values(&text_from_bytes(&reader.read_blob_u16()?)?);
        let data = reader.read_blob_u16()?;

        let text = text_from_bytes(&reader.read_blob_u8()?)?;
        let text_color = reader.read_array::<4>()?;
        let media_url = text_from_bytes(&reader.read_blob_u8()?)?;
        let particle_system = reader.read_blob_u8()?;

        let param_bytes = reader.read_blob_u8()?;
        let extra_params = if param_bytes.is_empty() {
            Vec::new()
        } else {
            fields::read_extra_params(&mut WireReader::new(&param_bytes))?
        };

        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes {
                tag: EncodingTag::Full,
                remaining: reader.remaining(),
            });
        }

        let sound = (!sound_id.is_nil()).then_some(SoundAttachment {
            sound_id,
            gain,
            flags: sound_flags,
            radius,
        });
        let owner = (sound.is_some() || !particle_system.is_empty()).then_some(owner_id);

        Ok(Self {
            crc,
            parent_id,
            owner,
            sound,
            material,
            click_action,
            scale,
            motion,
            update_flags,
            state,
            name_values,
            data,
            text: (!text.is_empty()).then(|| HoverText::from_wire(text, text_color)),
            media_url: (!media_url.is_empty()).then_some(media_url),
            particle_system,
            extra_params,
        })
    }

    pub fn to_bytes(&self, bounds: &MotionBounds) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(160);
        let sound = self.sound.unwrap_or(SoundAttachment {
            sound_id: ObjectId::NIL,
            gain: 0.0,
            flags: 0,
            radius: 0.0,
        });

        w.write_u32(self.crc)
            .write_u32(self.parent_id)
            .write_object_id(sound.sound_id)
            .write_object_id(self.owner.unwrap_or(ObjectId::NIL))
            .write_f32(sound.gain)
            .write_u8(sound.flags)
            .write_f32(sound.radius)
            .write_u8(self.material)
            .write_u8(self.click_action)
            .write_vec3(self.scale)
            .write_blob_u8(&self.motion.to_bytes(bounds))
            .write_u32(self.update_flags)
            .write_u8(self.state)
            .write_blob_u16(fields::format_name_values(&self.name_values).as_bytes())
            .write_blob_u16(&self.data);

        match &self.text {
            Some(text) => w
                .write_blob_u8(text.text.as_bytes())
                .write_bytes(&text.wire_color()),
            None => w.write_blob_u8(&[]).write_bytes(&[0, 0, 0, 255]),
        };

        w.write_blob_u8(self.media_url.as_deref().unwrap_or_default().as_bytes())
            .write_blob_u8(&self.particle_system);

        if self.extra_params.is_empty() {
            w.write_blob_u8(&[]);
        } else {
            let mut params = WireWriter::new();
            fields::write_extra_params(&mut params, &self.extra_params);
            w.write_blob_u8(&params.into_bytes());
        }

        w.into_bytes()
    }
}
