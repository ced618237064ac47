use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use glam::{Quat, Vec3, Vec4};

use crate::error::DecodeError;
use crate::store::ObjectId;

/// Little-endian cursor over an update payload.
pub struct WireReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        let remaining = self.remaining();
        if remaining < needed {
            Err(DecodeError::Truncated { needed, remaining })
        } else {
            Ok(())
        }
    }

    fn truncated(&self, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            needed,
            remaining: self.remaining(),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.cursor.read_u8().map_err(|_| self.truncated(1))
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.ensure(2)?;
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| self.truncated(2))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| self.truncated(4))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.ensure(4)?;
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| self.truncated(4))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.ensure(4)?;
        self.cursor
            .read_f32::<LittleEndian>()
            .map_err(|_| self.truncated(4))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, DecodeError> {
        self.ensure(12)?;
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec4(&mut self) -> Result<Vec4, DecodeError> {
        self.ensure(16)?;
        Ok(Vec4::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Reads a rotation sent as its vector part; the scalar part is rebuilt
    /// from the unit-length constraint.
    pub fn read_rotation_vector(&mut self) -> Result<Quat, DecodeError> {
        let v = self.read_vec3()?;
        Ok(rotation_from_vector(v))
    }

    pub fn read_u16x3(&mut self) -> Result<[u32; 3], DecodeError> {
        self.ensure(6)?;
        Ok([
            self.read_u16()? as u32,
            self.read_u16()? as u32,
            self.read_u16()? as u32,
        ])
    }

    pub fn read_u16x4(&mut self) -> Result<[u32; 4], DecodeError> {
        self.ensure(8)?;
        Ok([
            self.read_u16()? as u32,
            self.read_u16()? as u32,
            self.read_u16()? as u32,
            self.read_u16()? as u32,
        ])
    }

    pub fn read_u8x3(&mut self) -> Result<[u32; 3], DecodeError> {
        let b = self.read_array::<3>()?;
        Ok([b[0] as u32, b[1] as u32, b[2] as u32])
    }

    pub fn read_u8x4(&mut self) -> Result<[u32; 4], DecodeError> {
        let b = self.read_array::<4>()?;
        Ok([b[0] as u32, b[1] as u32, b[2] as u32, b[3] as u32])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.ensure(N)?;
        let mut buf = [0u8; N];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.truncated(N))?;
        Ok(buf)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        self.ensure(len)?;
        let mut buf = vec![0u8; len];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| self.truncated(len))?;
        Ok(buf)
    }

    pub fn read_object_id(&mut self) -> Result<ObjectId, DecodeError> {
        Ok(ObjectId::from_bytes(self.read_array::<16>()?))
    }

    /// Blob preceded by a signed 32-bit size.
    pub fn read_sized_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let size = self.read_i32()?;
        if size < 0 {
            return Err(DecodeError::NegativeBlobSize);
        }
        self.read_bytes(size as usize)
    }

    pub fn read_blob_u8(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u8()? as usize;
        self.read_bytes(len)
    }

    pub fn read_blob_u16(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// NUL-terminated UTF-8 string.
    pub fn read_cstring(&mut self) -> Result<String, DecodeError> {
        let start = self.position();
        let data = *self.cursor.get_ref();
        let rest = &data[start.min(data.len())..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::InvalidString)?;
        let text = std::str::from_utf8(&rest[..nul]).map_err(|_| DecodeError::InvalidString)?;
        self.cursor.set_position((start + nul + 1) as u64);
        Ok(text.to_owned())
    }
}

/// Variable-length text field; anything from the first NUL on is dropped.
pub fn text_from_bytes(bytes: &[u8]) -> Result<String, DecodeError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidString)
}

pub fn rotation_from_vector(v: Vec3) -> Quat {
    let t = 1.0 - v.length_squared();
    let w = if t > 0.0 { t.sqrt() } else { 0.0 };
    Quat::from_xyzw(v.x, v.y, v.z, w)
}
