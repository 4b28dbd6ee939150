//! Face texture extraction and skin tone estimation.

mod extract;
mod skin;

pub use extract::{
    ExtractedTexture, TextureError, apply_contrast, decode_image, extract_texture, rgba_from_raw,
};
pub use skin::{SkinToneSample, sample_skin_tone};
