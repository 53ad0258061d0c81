use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use half::f16;
use image::{DynamicImage, ImageReader};
use std::f32::consts::{PI, TAU};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_MIP_LEVELS: u32 = 8;
const IRRADIANCE_WIDTH: u32 = 64;
const IRRADIANCE_HEIGHT: u32 = 32;
const IRRADIANCE_SAMPLE_COUNT: usize = 64;

/// Linear-light equirectangular image. Background, reflections, and
/// irradiance all derive from one of these.
#[derive(Clone, Debug)]
pub struct EquirectImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec3>,
}

impl EquirectImage {
    fn pixel(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Bilinear lookup along a direction, wrapping in longitude and
    /// clamping at the poles.
    pub fn sample_direction(&self, dir: Vec3) -> Vec3 {
        let d = dir.normalize();
        let theta = d.y.clamp(-1.0, 1.0).acos();
        let phi = d.z.atan2(d.x);
        let u = (phi + PI) / TAU;
        let v = theta / PI;
        let x = u * (self.width as f32 - 1.0);
        let y = v * (self.height as f32 - 1.0);
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;

        let ix0 = x0.rem_euclid(self.width as f32) as u32;
        let ix1 = (x0 + 1.0).rem_euclid(self.width as f32) as u32;
        let iy0 = y0.clamp(0.0, (self.height - 1) as f32) as u32;
        let iy1 = (y0 + 1.0).clamp(0.0, (self.height - 1) as f32) as u32;

        let c0 = self.pixel(ix0, iy0) * (1.0 - tx) + self.pixel(ix1, iy0) * tx;
        let c1 = self.pixel(ix0, iy1) * (1.0 - tx) + self.pixel(ix1, iy1) * tx;
        c0 * (1.0 - ty) + c1 * ty
    }

    fn downsample(&self) -> EquirectImage {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let x0 = (x * 2).min(self.width - 1);
                let x1 = (x * 2 + 1).min(self.width - 1);
                let y0 = (y * 2).min(self.height - 1);
                let y1 = (y * 2 + 1).min(self.height - 1);
                let sum = self.pixel(x0, y0) + self.pixel(x1, y0) + self.pixel(x0, y1) + self.pixel(x1, y1);
                pixels.push(sum * 0.25);
            }
        }
        EquirectImage { width, height, pixels }
    }
}

/// Decoded environment plus the derived lookups the renderer samples:
/// a blur mip chain and a small cosine-convolved irradiance map.
#[derive(Clone, Debug)]
pub struct EnvironmentAsset {
    pub label: String,
    pub source: Option<PathBuf>,
    pub levels: Vec<EquirectImage>,
    pub irradiance: EquirectImage,
}

impl EnvironmentAsset {
    pub fn decode(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let image = load_equirect(path)?;
        let label = label_from_path(path);
        Ok(Self::from_image(label, Some(path.to_path_buf()), image))
    }

    /// Fallback used when no bundled environment can be fetched: a soft
    /// sky gradient with a single bright patch so reflections stay
    /// readable.
    pub fn generated_default() -> Self {
        let width = 256u32;
        let height = 128u32;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            let v = y as f32 / (height - 1) as f32;
            for x in 0..width {
                let u = x as f32 / (width - 1) as f32;
                let horizon = (1.0 - (2.0 * (v - 0.5)).abs()).clamp(0.0, 1.0);
                let sky = Vec3::new(0.25, 0.35, 0.6) * (1.0 - v) + Vec3::new(0.65, 0.7, 0.9) * v;
                let sun_dir = Vec2::new(u - 0.2, v - 0.35);
                let sun = (1.0 - sun_dir.length() * 6.0).max(0.0).powf(12.0);
                let ground =
                    Vec3::new(0.08, 0.07, 0.05) * (1.0 - horizon) + Vec3::new(0.2, 0.18, 0.16) * horizon;
                let mut color = sky * (0.6 + 0.4 * horizon) + ground * (1.0 - horizon);
                color += Vec3::new(1.0, 0.9, 0.75) * sun * 8.0;
                pixels.push(color);
            }
        }
        let image = EquirectImage { width, height, pixels };
        Self::from_image("generated".to_string(), None, image)
    }

    fn from_image(label: String, source: Option<PathBuf>, image: EquirectImage) -> Self {
        let irradiance = compute_irradiance(&image);
        let mut levels = vec![image];
        while (levels.len() as u32) < MAX_MIP_LEVELS {
            let last = levels.last().expect("at least the base level");
            if last.width <= 4 || last.height <= 4 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { label, source, levels, irradiance }
    }

    pub fn base(&self) -> &EquirectImage {
        &self.levels[0]
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

/// Display label for a dropped or bundled environment file: the bare
/// file stem, matching what the selector shows.
pub fn label_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn load_equirect(path: &Path) -> Result<EquirectImage> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("Failed to open environment {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to probe environment {}", path.display()))?;
    let dyn_img =
        reader.decode().with_context(|| format!("Failed to decode environment {}", path.display()))?;
    Ok(equirect_from_dynamic(&dyn_img))
}

fn equirect_from_dynamic(image: &DynamicImage) -> EquirectImage {
    let rgb = image.to_rgb32f();
    let width = rgb.width();
    let height = rgb.height();
    let pixels = rgb.pixels().map(|p| Vec3::new(p.0[0], p.0[1], p.0[2])).collect();
    EquirectImage { width, height, pixels }
}

fn compute_irradiance(image: &EquirectImage) -> EquirectImage {
    let width = IRRADIANCE_WIDTH.min(image.width.max(1));
    let height = IRRADIANCE_HEIGHT.min(image.height.max(1));
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        let theta = (y as f32 + 0.5) / height as f32 * PI;
        for x in 0..width {
            let phi = (x as f32 + 0.5) / width as f32 * TAU - PI;
            let normal =
                Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin()).normalize();
            let mut sum = Vec3::ZERO;
            let mut weight = 0.0f32;
            for sample in 0..IRRADIANCE_SAMPLE_COUNT {
                let xi = hammersley(sample as u32, IRRADIANCE_SAMPLE_COUNT as u32);
                let dir = cosine_sample_hemisphere(normal, xi);
                let n_dot_l = normal.dot(dir).max(0.0);
                if n_dot_l > 0.0 {
                    sum += image.sample_direction(dir) * n_dot_l;
                    weight += n_dot_l;
                }
            }
            pixels.push(if weight > 0.0 { sum / weight } else { Vec3::ZERO });
        }
    }
    EquirectImage { width, height, pixels }
}

fn cosine_sample_hemisphere(normal: Vec3, xi: Vec2) -> Vec3 {
    let r = xi.x.sqrt();
    let theta = TAU * xi.y;
    let local = Vec3::new(r * theta.cos(), r * theta.sin(), (1.0 - xi.x).sqrt());
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = normal.cross(up).normalize();
    let bitangent = normal.cross(tangent);
    tangent * local.x + bitangent * local.y + normal * local.z
}

fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f32 {
    let mut b = bits;
    b = (b << 16) | (b >> 16);
    b = ((b & 0x5555_5555) << 1) | ((b & 0xAAAA_AAAA) >> 1);
    b = ((b & 0x3333_3333) << 2) | ((b & 0xCCCC_CCCC) >> 2);
    b = ((b & 0x0F0F_0F0F) << 4) | ((b & 0xF0F0_F0F0) >> 4);
    b = ((b & 0x00FF_00FF) << 8) | ((b & 0xFF00_FF00) >> 8);
    (b as f32) * 2.328_306_4e-10
}

/// GPU-resident environment: an Rgba16Float equirect with the CPU mip
/// chain uploaded level by level, plus the irradiance map.
pub struct EnvironmentGpu {
    _radiance_texture: wgpu::Texture,
    radiance_view: wgpu::TextureView,
    _irradiance_texture: wgpu::Texture,
    irradiance_view: wgpu::TextureView,
    sampler: Arc<wgpu::Sampler>,
    mip_count: u32,
}

impl EnvironmentGpu {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        asset: &EnvironmentAsset,
        sampler: Arc<wgpu::Sampler>,
    ) -> Self {
        let base = asset.base();
        let mip_count = asset.mip_count();
        let radiance_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Environment Radiance"),
            size: wgpu::Extent3d { width: base.width, height: base.height, depth_or_array_layers: 1 },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (level, image) in asset.levels.iter().enumerate() {
            write_equirect_level(queue, &radiance_texture, level as u32, image);
        }
        let radiance_view = radiance_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Environment Radiance View"),
            base_mip_level: 0,
            mip_level_count: Some(mip_count),
            ..Default::default()
        });

        let irradiance = &asset.irradiance;
        let irradiance_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Environment Irradiance"),
            size: wgpu::Extent3d {
                width: irradiance.width,
                height: irradiance.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_equirect_level(queue, &irradiance_texture, 0, irradiance);
        let irradiance_view = irradiance_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Environment Irradiance View"),
            ..Default::default()
        });

        Self {
            _radiance_texture: radiance_texture,
            radiance_view,
            _irradiance_texture: irradiance_texture,
            irradiance_view,
            sampler,
            mip_count,
        }
    }

    pub fn create_sampler(device: &wgpu::Device) -> Arc<wgpu::Sampler> {
        Arc::new(device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        }))
    }

    pub fn radiance_view(&self) -> &wgpu::TextureView {
        &self.radiance_view
    }

    pub fn irradiance_view(&self) -> &wgpu::TextureView {
        &self.irradiance_view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }
}

fn write_equirect_level(queue: &wgpu::Queue, texture: &wgpu::Texture, level: u32, image: &EquirectImage) {
    let mut half_data = Vec::with_capacity(image.pixels.len() * 4);
    for pixel in &image.pixels {
        half_data.push(f16::from_f32(pixel.x).to_bits());
        half_data.push(f16::from_f32(pixel.y).to_bits());
        half_data.push(f16::from_f32(pixel.z).to_bits());
        half_data.push(f16::from_f32(1.0).to_bits());
    }
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(&half_data),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(image.width * 8),
            rows_per_image: Some(image.height),
        },
        wgpu::Extent3d { width: image.width, height: image.height, depth_or_array_layers: 1 },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn label_is_the_file_stem() {
        assert_eq!(label_from_path(Path::new("scenes/Royal Esplanade.hdr")), "Royal Esplanade");
        assert_eq!(label_from_path(Path::new("env.hdr")), "env");
    }

    #[test]
    fn decode_builds_mip_chain_and_irradiance() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("flat.png");
        let mut img = RgbImage::new(64, 32);
        for (_, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([128, 64, 200]);
        }
        img.save(&path).expect("save png");

        let asset = EnvironmentAsset::decode(&path).expect("decode");
        assert_eq!(asset.label, "flat");
        assert!(asset.mip_count() > 1);
        for pair in asset.levels.windows(2) {
            assert!(pair[1].width <= pair[0].width);
            assert!(pair[1].height <= pair[0].height);
        }
        assert_eq!(asset.irradiance.width, IRRADIANCE_WIDTH);
        // A constant image convolves to (nearly) itself.
        let base = asset.base().pixel(0, 0);
        let irr = asset.irradiance.pixel(IRRADIANCE_WIDTH / 2, IRRADIANCE_HEIGHT / 2);
        assert!((base - irr).length() < 0.05 * base.length().max(1.0));
    }

    #[test]
    fn generated_default_is_well_formed() {
        let asset = EnvironmentAsset::generated_default();
        assert_eq!(asset.label, "generated");
        assert!(asset.source.is_none());
        assert!(asset.base().pixels.iter().all(|p| p.x >= 0.0 && p.y >= 0.0 && p.z >= 0.0));
    }

    #[test]
    fn sample_direction_wraps_longitude() {
        let asset = EnvironmentAsset::generated_default();
        let a = asset.base().sample_direction(Vec3::new(0.0, 0.0, -1.0));
        assert!(a.x.is_finite() && a.y.is_finite() && a.z.is_finite());
    }
}
