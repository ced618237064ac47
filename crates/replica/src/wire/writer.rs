use byteorder::{ByteOrder, LittleEndian};
use glam::{Quat, Vec3, Vec4};

use crate::store::ObjectId;

/// Little-endian packer producing the layouts [`super::WireReader`] reads.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_i32(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        let mut b = [0u8; 4];
        LittleEndian::write_f32(&mut b, value);
        self.buf.extend_from_slice(&b);
        self
    }

    pub fn write_vec3(&mut self, value: Vec3) -> &mut Self {
        self.write_f32(value.x).write_f32(value.y).write_f32(value.z)
    }

    pub fn write_vec4(&mut self, value: Vec4) -> &mut Self {
        self.write_f32(value.x)
            .write_f32(value.y)
            .write_f32(value.z)
            .write_f32(value.w)
    }

    /// Writes the vector part of `rotation`, flipped so the dropped scalar
    /// part is non-negative.
    pub fn write_rotation_vector(&mut self, rotation: Quat) -> &mut Self {
        let q = if rotation.w < 0.0 { -rotation } else { rotation };
        self.write_vec3(Vec3::new(q.x, q.y, q.z))
    }

    pub fn write_codes_u16(&mut self, codes: &[u32]) -> &mut Self {
        for &code in codes {
            self.write_u16(code as u16);
        }
        self
    }

    pub fn write_codes_u8(&mut self, codes: &[u32]) -> &mut Self {
        for &code in codes {
            self.write_u8(code as u8);
        }
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_object_id(&mut self, id: ObjectId) -> &mut Self {
        self.write_bytes(id.as_bytes())
    }

    pub fn write_sized_blob(&mut self, bytes: &[u8]) -> &mut Self {
        self.write_i32(bytes.len() as i32).write_bytes(bytes)
    }

    /// Writes at most 255 bytes behind a one-byte length. Longer blobs are
    /// cut with a warning.
    pub fn write_blob_u8(&mut self, bytes: &[u8]) -> &mut Self {
        let len = clipped_len(bytes.len(), u8::MAX as usize);
        self.write_u8(len as u8).write_bytes(&bytes[..len])
    }

    /// Writes at most 65535 bytes behind a two-byte length. Longer blobs are
    /// cut with a warning.
    pub fn write_blob_u16(&mut self, bytes: &[u8]) -> &mut Self {
        let len = clipped_len(bytes.len(), u16::MAX as usize);
        self.write_u16(len as u16).write_bytes(&bytes[..len])
    }

    pub fn write_cstring(&mut self, text: &str) -> &mut Self {
        let body = text.split('\0').next().unwrap_or_default();
        self.write_bytes(body.as_bytes()).write_u8(0)
    }
}

fn clipped_len(len: usize, max: usize) -> usize {
    if len > max {
        log::warn!("blob of {len} bytes truncated to {max}");
    }
    len.min(max)
}
