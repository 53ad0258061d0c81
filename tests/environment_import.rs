use std::path::Path;

use vitrine::environment::{label_from_path, EnvironmentAsset};

fn write_gradient_hdr(path: &Path, width: u32, height: u32) {
    use image::codecs::hdr::HdrEncoder;
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let u = x as f32 / (width - 1) as f32;
            let v = y as f32 / (height - 1) as f32;
            pixels.push(image::Rgb([4.0 * (1.0 - v), u, 0.5]));
        }
    }
    let file = std::fs::File::create(path).expect("create hdr");
    HdrEncoder::new(std::io::BufWriter::new(file))
        .encode(&pixels, width as usize, height as usize)
        .expect("encode hdr");
}

#[test]
fn hdr_roundtrip_preserves_radiance() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("gradient.hdr");
    write_gradient_hdr(&path, 32, 16);

    let asset = EnvironmentAsset::decode(&path).expect("decode hdr");
    assert_eq!(asset.label, "gradient");
    assert_eq!(asset.source.as_deref(), Some(path.as_path()));
    let base = asset.base();
    assert_eq!((base.width, base.height), (32, 16));

    // HDR values above 1.0 must survive (top row stores 4.0 red).
    let top_left = base.pixels[0];
    assert!(top_left.x > 3.5, "expected bright top row, got {top_left:?}");
    // RGBE carries ~1% mantissa error at this magnitude.
    assert!((top_left.z - 0.5).abs() < 0.02);
}

#[test]
fn mip_chain_halves_until_floor() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("chain.hdr");
    write_gradient_hdr(&path, 64, 32);

    let asset = EnvironmentAsset::decode(&path).expect("decode hdr");
    assert!(asset.mip_count() > 2);
    for pair in asset.levels.windows(2) {
        assert_eq!(pair[1].width, (pair[0].width / 2).max(1));
        assert_eq!(pair[1].height, (pair[0].height / 2).max(1));
    }
    let last = asset.levels.last().expect("levels");
    assert!(last.width >= 1 && last.height >= 1);
}

#[test]
fn bundled_studio_environment_decodes() {
    let asset = EnvironmentAsset::decode("assets/environments/studio.hdr").expect("bundled hdr");
    assert_eq!(asset.label, "studio");
    let base = asset.base();
    assert_eq!((base.width, base.height), (128, 64));
    // The overhead softbox is brighter than the floor.
    let zenith = base.pixels[(base.width / 2) as usize];
    let nadir = base.pixels[((base.height - 1) * base.width + base.width / 2) as usize];
    assert!(zenith.x > nadir.x);
}

#[test]
fn labels_come_from_file_stems() {
    assert_eq!(label_from_path(Path::new("a/b/env.hdr")), "env");
    assert_eq!(label_from_path(Path::new("royal_esplanade_1k.hdr")), "royal_esplanade_1k");
    assert_eq!(label_from_path(Path::new("dir.with.dots/scene.take2.hdr")), "scene.take2");
}

#[test]
fn missing_file_is_an_error_not_a_panic() {
    assert!(EnvironmentAsset::decode("definitely/not/here.hdr").is_err());
}
