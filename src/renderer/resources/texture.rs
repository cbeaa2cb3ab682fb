use std::path::Path;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::image::Image;

pub const TEXTURE_FILE: &str = "texture.png";

/// Tightly packed RGBA8 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexturePixels {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TexturePixels {
    pub fn decode(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .wrap_err_with(|| format!("Failed to load texture {}", path.display()))?;
        let rgba = image.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
        })
    }

    /// Single opaque white texel
    pub fn placeholder() -> Self {
        Self {
            data: vec![255; 4],
            width: 1,
            height: 1,
        }
    }

    pub fn decode_or_placeholder(path: &Path) -> Self {
        Self::decode(path).unwrap_or_else(|err| {
            log::warn!("{err:#}, using a 1x1 placeholder");
            Self::placeholder()
        })
    }
}

pub struct ColorTexture {
    pub image: Image,
}

impl ColorTexture {
    pub fn new(pixels: &TexturePixels, dev: &RenderDevice) -> Result<Self> {
        let image = Image::new_color_image(&pixels.data, pixels.width, pixels.height, dev)?;
        Ok(Self { image })
    }

    /// `<asset_dir>/texture.png`, falling back to the placeholder
    pub fn load(asset_dir: &Path, dev: &RenderDevice) -> Result<Self> {
        let pixels = TexturePixels::decode_or_placeholder(&asset_dir.join(TEXTURE_FILE));
        log::debug!("Texture {}x{}", pixels.width, pixels.height);
        Self::new(&pixels, dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_texture_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = TexturePixels::decode_or_placeholder(&dir.path().join(TEXTURE_FILE));
        assert_eq!(pixels, TexturePixels::placeholder());
        assert_eq!(pixels.data, vec![255, 255, 255, 255]);
    }

    #[test]
    fn png_is_decoded_to_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TEXTURE_FILE);
        let mut source = image::RgbImage::new(3, 2);
        source.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        source.save(&path).unwrap();

        let pixels = TexturePixels::decode(&path).unwrap();
        assert_eq!((pixels.width, pixels.height), (3, 2));
        assert_eq!(pixels.data.len(), 3 * 2 * 4);
        assert_eq!(&pixels.data[..4], &[10, 20, 30, 255]);
    }
}
