//! Equirectangular HDR environment map, sampled on ray miss.

use std::f32::consts::PI;
use std::path::Path;

use crate::util::{Result, Vec3};

/// Linear RGB environment texture, row 0 at the top (zenith).
#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    width: u32,
    height: u32,
    texels: Vec<Vec3>,
}

impl EnvironmentMap {
    /// Build from raw texels; `texels.len()` must equal `width * height`.
    pub fn from_texels(width: u32, height: u32, texels: Vec<Vec3>) -> Option<Self> {
        if width == 0 || height == 0 || texels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, texels })
    }

    /// Single-texel map returning `color` in every direction.
    pub fn constant(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color],
        }
    }

    /// Load an HDR/EXR (or any format `image` decodes) file.
    pub fn load(path: &Path) -> Result<Self> {
        use image::{GenericImageView, ImageReader};

        let img = ImageReader::open(path)?.decode()?;
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb32f();
        let texels = rgb.as_raw().chunks_exact(3).map(|px| Vec3::new(px[0], px[1], px[2])).collect();
        log::info!("loaded environment {} ({width}x{height})", path.display());
        Ok(Self { width, height, texels })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Radiance arriving from direction `dir` (need not be normalized).
    pub fn lookup(&self, dir: Vec3) -> Vec3 {
        let d = dir.normalize_or_zero();
        let theta = d.x.atan2(d.z);
        let u = (theta + PI) * (0.5 / PI);
        let v = 0.5 * (1.0 + d.y.clamp(-1.0, 1.0));

        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = (((1.0 - v) * self.height as f32) as u32).min(self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_map() {
        let env = EnvironmentMap::constant(Vec3::new(0.5, 0.25, 1.0));
        assert_eq!(env.lookup(Vec3::Y), Vec3::new(0.5, 0.25, 1.0));
        assert_eq!(env.lookup(-Vec3::X), Vec3::new(0.5, 0.25, 1.0));
    }

    #[test]
    fn test_zenith_and_nadir_rows() {
        let sky = Vec3::new(0.0, 0.0, 1.0);
        let ground = Vec3::new(0.0, 1.0, 0.0);
        let env = EnvironmentMap::from_texels(2, 2, vec![sky, sky, ground, ground]).unwrap();
        assert_eq!(env.lookup(Vec3::Y), sky);
        assert_eq!(env.lookup(-Vec3::Y), ground);
    }

    #[test]
    fn test_texel_count_checked() {
        assert!(EnvironmentMap::from_texels(2, 2, vec![Vec3::ZERO; 3]).is_none());
        assert!(EnvironmentMap::from_texels(0, 1, vec![]).is_none());
    }

    #[test]
    fn test_load_hdr_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.hdr");
        let img = image::Rgb32FImage::from_pixel(4, 2, image::Rgb([2.0, 1.0, 0.5]));
        image::DynamicImage::ImageRgb32F(img).save(&path).unwrap();

        let env = EnvironmentMap::load(&path).unwrap();
        assert_eq!(env.dimensions(), (4, 2));
        let c = env.lookup(Vec3::Z);
        assert!((c - Vec3::new(2.0, 1.0, 0.5)).length() < 0.05);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(EnvironmentMap::load(Path::new("/nonexistent/sky.hdr")).is_err());
    }
}
