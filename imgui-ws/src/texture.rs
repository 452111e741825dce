//! Textures and their wire record.
//!
//! ```text
//! texture_id: u32 (4)
//! type:       i32 (4)
//! width:      i32 (4)
//! height:     i32 (4)
//! revision:   i32 (4)
//! pixels:     width * height * bytes_per_pixel
//! ```

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ImGuiWsError;

pub type TextureId = u32;

/// Size of the record header preceding the pixels.
pub const TEXTURE_HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TextureType {
    Alpha8 = 0,
    Gray8 = 1,
    Rgb24 = 2,
    Rgba32 = 3,
}

impl TextureType {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            TextureType::Alpha8 | TextureType::Gray8 => 1,
            TextureType::Rgb24 => 3,
            TextureType::Rgba32 => 4,
        }
    }
}

/// One uploaded texture. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureType,
    pub width: i32,
    pub height: i32,
    /// Starts at 1, bumped on every replacement.
    pub revision: i32,
    record: Bytes,
}

impl Texture {
    pub fn new(
        id: TextureId,
        kind: TextureType,
        width: i32,
        height: i32,
        revision: i32,
        pixels: &[u8],
    ) -> Result<Self, ImGuiWsError> {
        let (w, h) = match (usize::try_from(width), usize::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(ImGuiWsError::InvalidTexture(format!(
                    "texture {id}: negative size {width}x{height}"
                )));
            }
        };
        let expected = w * h * kind.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ImGuiWsError::InvalidTexture(format!(
                "texture {id}: expected {expected} pixel bytes, got {}",
                pixels.len()
            )));
        }

        let mut record = BytesMut::with_capacity(TEXTURE_HEADER_SIZE + pixels.len());
        record.put_u32_le(id);
        record.put_i32_le(kind as i32);
        record.put_i32_le(width);
        record.put_i32_le(height);
        record.put_i32_le(revision);
        record.put_slice(pixels);

        Ok(Self {
            id,
            kind,
            width,
            height,
            revision,
            record: record.freeze(),
        })
    }

    /// The wire record served by `imgui.texture_data[%d]`.
    pub fn record(&self) -> &Bytes {
        &self.record
    }
}

/// All textures, ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureSet {
    textures: BTreeMap<TextureId, Texture>,
}

impl TextureSet {
    /// Insert or replace a texture; returns its new revision.
    pub fn set(
        &mut self,
        id: TextureId,
        kind: TextureType,
        width: i32,
        height: i32,
        pixels: &[u8],
    ) -> Result<i32, ImGuiWsError> {
        let revision = self.textures.get(&id).map_or(1, |t| t.revision + 1);
        let texture = Texture::new(id, kind, width, height, revision, pixels)?;
        self.textures.insert(id, texture);
        Ok(revision)
    }

    pub fn get(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Texture ids in ascending order; position is the dense index.
    pub fn ids(&self) -> Vec<TextureId> {
        self.textures.keys().copied().collect()
    }
}
