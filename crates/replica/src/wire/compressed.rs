use bitflags::bitflags;
use glam::{Quat, Vec3};

use super::fields::{self, ExtraParam, HoverText, NameValue, SoundAttachment};
use super::{WireReader, WireWriter};
use crate::error::DecodeError;
use crate::store::ObjectId;

/// Size of the fixed-layout particle block carried by older senders.
pub const LEGACY_PARTICLES_LEN: usize = 86;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CompressedFlags: u32 {
        const SCRATCH_PAD = 0x001;
        const TREE = 0x002;
        const TEXT = 0x004;
        const PARTICLES = 0x008;
        const SOUND = 0x010;
        const PARENT_ID = 0x020;
        const ANGULAR_VELOCITY = 0x080;
        const NAME_VALUES = 0x100;
        const MEDIA_URL = 0x200;
    }
}

/// Self-describing record whose optional tail is selected by [`CompressedFlags`].
/// Cached records share the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedUpdate {
    pub crc: u32,
    pub material: u8,
    pub click_action: u8,
    pub scale: Vec3,
    pub position: Vec3,
    pub rotation: Quat,
    pub flags: CompressedFlags,
    pub owner: Option<ObjectId>,
    pub angular_velocity: Vec3,
    pub parent_id: u32,
    pub tree_species: Option<u8>,
    pub scratch_pad: Option<Vec<u8>>,
    pub text: Option<HoverText>,
    pub media_url: Option<String>,
    pub particles: Option<Vec<u8>>,
    pub extra_params: Vec<ExtraParam>,
    pub sound: Option<SoundAttachment>,
    pub name_values: Vec<NameValue>,
}

impl CompressedUpdate {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            crc: 0,
            material: 0,
            click_action: 0,
            scale: Vec3::ONE,
            position,
            rotation,
            flags: CompressedFlags::empty(),
            owner: None,
            angular_velocity: Vec3::ZERO,
            parent_id: 0,
            tree_species: None,
            scratch_pad: None,
            text: None,
            media_url: None,
            particles: None,
            extra_params: Vec::new(),
            sound: None,
            name_values: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(bytes);

        let crc = reader.read_u32()?;
        let material = reader.read_u8()?;
        let click_action = reader.read_u8()?;
        let scale = reader.read_vec3()?;
        let position = reader.read_vec3()?;
        let rotation = reader.read_rotation_vector()?;
        let flags = CompressedFlags::from_bits_retain(reader.read_u32()?);
        let owner_id = reader.read_object_id()?;

        let mut update = Self {
            crc,
            material,
            click_action,
            scale,
            flags,
            ..Self::new(position, rotation)
        };

        for field in &OPTIONAL_FIELDS {
            if (field.present)(flags) {
                (field.read)(&mut reader, &mut update)?;
            }
        }

        if flags.intersects(CompressedFlags::SOUND | CompressedFlags::PARTICLES) {
            update.owner = Some(owner_id);
        }
        Ok(update)
    }

    /// Flags matching the optional fields actually populated, plus any
    /// unrecognized bits carried in `flags`.
    pub fn wire_flags(&self) -> CompressedFlags {
        let mut flags =
            CompressedFlags::from_bits_retain(self.flags.bits() & !CompressedFlags::all().bits());
        flags.set(CompressedFlags::ANGULAR_VELOCITY, self.angular_velocity != Vec3::ZERO);
        flags.set(CompressedFlags::PARENT_ID, self.parent_id != 0);
        flags.set(CompressedFlags::TREE, self.tree_species.is_some());
        flags.set(
            CompressedFlags::SCRATCH_PAD,
            self.tree_species.is_none() && self.scratch_pad.is_some(),
        );
        flags.set(CompressedFlags::TEXT, self.text.is_some());
        flags.set(CompressedFlags::MEDIA_URL, self.media_url.is_some());
        flags.set(CompressedFlags::PARTICLES, self.particles.is_some());
        flags.set(CompressedFlags::SOUND, self.sound.is_some());
        flags.set(CompressedFlags::NAME_VALUES, !self.name_values.is_empty());
        flags
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let flags = self.wire_flags();
        let mut writer = WireWriter::with_capacity(128);
        writer
            .write_u32(self.crc)
            .write_u8(self.material)
            .write_u8(self.click_action)
            .write_vec3(self.scale)
            .write_vec3(self.position)
            .write_rotation_vector(self.rotation)
            .write_u32(flags.bits())
            .write_object_id(self.owner.unwrap_or(ObjectId::NIL));

        for field in &OPTIONAL_FIELDS {
            if (field.present)(flags) {
                (field.write)(self, &mut writer);
            }
        }
        writer.into_bytes()
    }
}

/// One entry of the optional tail. Entries are visited strictly in table
/// order; each one that is present consumes its bytes before the next.
pub struct OptionalField {
    pub name: &'static str,
    pub present: fn(CompressedFlags) -> bool,
    pub read: fn(&mut WireReader<'_>, &mut CompressedUpdate) -> Result<(), DecodeError>,
    pub write: fn(&CompressedUpdate, &mut WireWriter),
}

pub static OPTIONAL_FIELDS: [OptionalField; 10] = [
    OptionalField {
        name: "angular_velocity",
        present: |f| f.contains(CompressedFlags::ANGULAR_VELOCITY),
        read: |r, u| {
            u.angular_velocity = r.read_vec3()?;
            Ok(())
        },
        write: |u, w| {
            w.write_vec3(u.angular_velocity);
        },
    },
    OptionalField {
        name: "parent_id",
        present: |f| f.contains(CompressedFlags::PARENT_ID),
        read: |r, u| {
            u.parent_id = r.read_u32()?;
            Ok(())
        },
        write: |u, w| {
            w.write_u32(u.parent_id);
        },
    },
    OptionalField {
        name: "tree_species",
        present: |f| f.contains(CompressedFlags::TREE),
        read: |r, u| {
            u.tree_species = Some(r.read_u8()?);
            Ok(())
        },
        write: |u, w| {
            w.write_u8(u.tree_species.unwrap_or_default());
        },
    },
    OptionalField {
        name: "scratch_pad",
        present: |f| f.contains(CompressedFlags::SCRATCH_PAD) && !f.contains(CompressedFlags::TREE),
        read: |r, u| {
            u.scratch_pad = Some(r.read_sized_blob()?);
            Ok(())
        },
        write: |u, w| {
            w.write_sized_blob(u.scratch_pad.as_deref().unwrap_or_default());
        },
    },
    OptionalField {
        name: "text",
        present: |f| f.contains(CompressedFlags::TEXT),
        read: |r, u| {
            let text = r.read_cstring()?;
            let color = r.read_array::<4>()?;
            u.text = Some(HoverText::from_wire(text, color));
            Ok(())
        },
        write: |u, w| match &u.text {
            Some(text) => {
                w.write_cstring(&text.text).write_bytes(&text.wire_color());
            }
            None => {
                w.write_cstring("").write_bytes(&[0, 0, 0, 255]);
            }
        },
    },
    OptionalField {
        name: "media_url",
        present: |f| f.contains(CompressedFlags::MEDIA_URL),
        read: |r, u| {
            u.media_url = Some(r.read_cstring()?);
            Ok(())
        },
        write: |u, w| {
            w.write_cstring(u.media_url.as_deref().unwrap_or_default());
        },
    },
    OptionalField {
        name: "particles",
        present: |f| f.contains(CompressedFlags::PARTICLES),
        read: |r, u| {
            u.particles = Some(r.read_bytes(LEGACY_PARTICLES_LEN)?);
            Ok(())
        },
        write: |u, w| {
            let mut block = u.particles.clone().unwrap_or_default();
            block.resize(LEGACY_PARTICLES_LEN, 0);
            w.write_bytes(&block);
        },
    },
    OptionalField {
        name: "extra_params",
        present: |_| true,
        read: |r, u| {
            u.extra_params = fields::read_extra_params(r)?;
            Ok(())
        },
        write: |u, w| fields::write_extra_params(w, &u.extra_params),
    },
    OptionalField {
        name: "sound",
        present: |f| f.contains(CompressedFlags::SOUND),
        read: |r, u| {
            u.sound = Some(SoundAttachment {
                sound_id: r.read_object_id()?,
                gain: r.read_f32()?,
                flags: r.read_u8()?,
                radius: r.read_f32()?,
            });
            Ok(())
        },
        write: |u, w| {
            let sound = u.sound.unwrap_or(SoundAttachment {
                sound_id: ObjectId::NIL,
                gain: 0.0,
                flags: 0,
                radius: 0.0,
            });
            w.write_object_id(sound.sound_id)
                .write_f32(sound.gain)
                .write_u8(sound.flags)
                .write_f32(sound.radius);
        },
    },
    OptionalField {
        name: "name_values",
        present: |f| f.contains(CompressedFlags::NAME_VALUES),
        read: |r, u| {
            u.name_values = fields::parse_name_values(&r.read_cstring()?);
            Ok(())
        },
        write: |u, w| {
            w.write_cstring(&fields::format_name_values(&u.name_values));
        },
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: CompressedFlags) -> WireWriter {
        let mut w = WireWriter::new();
        w.write_u32(1)
            .write_u8(3)
            .write_u8(0)
            .write_vec3(Vec3::ONE)
            .write_vec3(Vec3::new(10.0, 20.0, 30.0))
            .write_rotation_vector(Quat::IDENTITY)
            .write_u32(flags.bits())
            .write_object_id(ObjectId::from_bytes([5; 16]));
        w
    }

    #[test]
    fn table_order_matches_flag_layout() {
        let names: Vec<_> = OPTIONAL_FIELDS.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            [
                "angular_velocity",
                "parent_id",
                "tree_species",
                "scratch_pad",
                "text",
                "media_url",
                "particles",
                "extra_params",
                "sound",
                "name_values",
            ]
        );
    }

    #[test]
    fn fields_read_in_fixed_order() {
        let flags = CompressedFlags::PARENT_ID | CompressedFlags::TEXT | CompressedFlags::SOUND;
        let mut w = header(flags);
        // parent before text before extra params before sound
        w.write_u32(42)
            .write_cstring("hello")
            .write_bytes(&[1, 2, 3, 255])
            .write_u8(0)
            .write_object_id(ObjectId::from_bytes([7; 16]))
            .write_f32(1.0)
            .write_u8(0)
            .write_f32(10.0);
        let update = CompressedUpdate::parse(&w.into_bytes()).unwrap();

        assert_eq!(update.parent_id, 42);
        assert_eq!(update.text.as_ref().map(|t| t.text.as_str()), Some("hello"));
        assert_eq!(update.text.as_ref().map(|t| t.color), Some([1, 2, 3, 0]));
        assert_eq!(update.sound.map(|s| s.radius), Some(10.0));
        assert_eq!(update.owner, Some(ObjectId::from_bytes([5; 16])));
        assert_eq!(update.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn owner_dropped_without_sound_or_particles() {
        let mut w = header(CompressedFlags::empty());
        w.write_u8(0);
        let update = CompressedUpdate::parse(&w.into_bytes()).unwrap();
        assert_eq!(update.owner, None);
        assert_eq!(update.parent_id, 0);
        assert_eq!(update.position, Vec3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn tree_suppresses_scratch_pad() {
        let mut w = header(CompressedFlags::TREE | CompressedFlags::SCRATCH_PAD);
        w.write_u8(9).write_u8(0);
        let update = CompressedUpdate::parse(&w.into_bytes()).unwrap();
        assert_eq!(update.tree_species, Some(9));
        assert_eq!(update.scratch_pad, None);
    }

    #[test]
    fn populated_record_reads_back() {
        let update = CompressedUpdate {
            owner: Some(ObjectId::from_bytes([8; 16])),
            angular_velocity: Vec3::new(0.0, 0.0, 1.5),
            parent_id: 17,
            scratch_pad: Some(vec![1, 2, 3]),
            media_url: Some("http://example.invalid".into()),
            particles: Some(vec![4; LEGACY_PARTICLES_LEN]),
            extra_params: vec![ExtraParam {
                kind: 0x30,
                data: vec![0; 17],
            }],
            name_values: fields::parse_name_values("Title STRING RW SV Boss"),
            ..CompressedUpdate::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY)
        };
        let decoded = CompressedUpdate::parse(&update.to_bytes()).unwrap();
        assert_eq!(decoded.flags, update.wire_flags());
        assert_eq!(decoded.owner, update.owner);
        assert_eq!(decoded.angular_velocity, update.angular_velocity);
        assert_eq!(decoded.parent_id, 17);
        assert_eq!(decoded.scratch_pad, update.scratch_pad);
        assert_eq!(decoded.particles, update.particles);
        assert_eq!(decoded.extra_params, update.extra_params);
        assert_eq!(decoded.name_values, update.name_values);
    }

    #[test]
    fn truncated_optional_field_fails() {
        let mut w = header(CompressedFlags::ANGULAR_VELOCITY);
        w.write_f32(1.0);
        assert!(matches!(
            CompressedUpdate::parse(&w.into_bytes()),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
