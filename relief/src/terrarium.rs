//! Terrarium elevation encoding.
//!
//! Terrarium tiles store elevation in the red, green and blue channels of an
//! ordinary RGB image:
//!
//! ```text
//! height = (r·256 + g + b/256) − 32768
//! ```
//!
//! giving a range of −32768 m to about +32767.996 m in 1/256 m steps.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use crate::coords::TileAddress;
use crate::error::{ReliefError, Result};
use crate::tile::ElevationRaster;

/// Offset subtracted after combining the channels.
pub const TERRARIUM_OFFSET: f64 = 32768.0;

/// Decode one pixel into metres.
///
/// Total over all inputs; no rounding beyond IEEE-754 arithmetic.
///
/// # Examples
///
/// ```
/// use relief::terrarium::decode;
///
/// assert_eq!(decode(128, 0, 0), 0.0);
/// assert_eq!(decode(0, 128, 0), -32640.0);
/// assert_eq!(decode(0, 0, 0), -32768.0);
/// ```
pub fn decode(r: u8, g: u8, b: u8) -> f32 {
    (r as f64 * 256.0 + g as f64 + b as f64 / 256.0 - TERRARIUM_OFFSET) as f32
}

/// Encode metres into a Terrarium pixel.
///
/// Values outside the representable range saturate at the ends. The blue
/// channel keeps the fraction truncated to 1/256 m.
pub fn encode(height: f32) -> [u8; 3] {
    let v = (height as f64 + TERRARIUM_OFFSET).clamp(0.0, 65535.0 + 255.0 / 256.0);
    let whole = v.floor();
    let r = (whole / 256.0).floor() as u8;
    let g = (whole % 256.0) as u8;
    let b = ((v - whole) * 256.0).floor() as u8;
    [r, g, b]
}

/// Decode a Terrarium raster image (PNG) into an [`ElevationRaster`].
///
/// # Errors
///
/// Returns [`ReliefError::Decode`] if the bytes are not a readable image or
/// its dimensions are not `tile_res × tile_res`.
pub fn decode_tile(address: TileAddress, bytes: &[u8], tile_res: u32) -> Result<ElevationRaster> {
    let image = image::load_from_memory(bytes).map_err(|e| ReliefError::Decode {
        address,
        reason: e.to_string(),
    })?;

    if image.width() != tile_res || image.height() != tile_res {
        return Err(ReliefError::Decode {
            address,
            reason: format!(
                "expected {}x{} raster, got {}x{}",
                tile_res,
                tile_res,
                image.width(),
                image.height()
            ),
        });
    }

    let rgb = image.to_rgb8();
    let samples = rgb
        .pixels()
        .map(|Rgb([r, g, b])| decode(*r, *g, *b))
        .collect();

    ElevationRaster::from_samples(tile_res, samples).ok_or_else(|| ReliefError::Decode {
        address,
        reason: "sample count does not match raster size".to_string(),
    })
}

/// Encode a raster as a Terrarium PNG.
///
/// The inverse of [`decode_tile`] up to the 1/256 m quantisation; used to
/// produce local tile sets and fixtures.
pub fn encode_png(raster: &ElevationRaster) -> Result<Vec<u8>> {
    let res = raster.tile_res();
    let image = RgbImage::from_fn(res, res, |col, row| Rgb(encode(raster.sample(col, row))));

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_exact_values() {
        assert_eq!(decode(0, 128, 0), 128.0 - 32768.0);
        assert_eq!(decode(0, 128, 0), -32640.0);
        assert_eq!(decode(128, 0, 0), 0.0);
        assert_eq!(decode(0, 0, 0), -32768.0);
        assert_eq!(decode(128, 1, 128), 1.5);
        assert_eq!(decode(255, 255, 255), 65535.0 + 255.0 / 256.0 - 32768.0);
    }

    #[test]
    fn test_encode_inverts_decode() {
        for height in [-32768.0, -412.5, 0.0, 1.5, 3776.0, 8848.25] {
            let [r, g, b] = encode(height);
            assert_eq!(decode(r, g, b), height, "height {}", height);
        }
        assert_eq!(encode(0.0), [128, 0, 0]);
        assert_eq!(encode(-40000.0), [0, 0, 0]);
    }

    #[test]
    fn test_decode_tile_png() {
        let mut raster = ElevationRaster::zeroed(16);
        raster.set(3, 5, 1234.5);
        let png = encode_png(&raster).unwrap();

        let decoded = decode_tile(TileAddress::new(7, 1, 1), &png, 16).unwrap();
        assert_eq!(decoded.tile_res(), 16);
        assert_eq!(decoded.sample(3, 5), 1234.5);
        assert_eq!(decoded.sample(0, 0), 0.0);
    }

    #[test]
    fn test_decode_tile_wrong_size() {
        let png = encode_png(&ElevationRaster::zeroed(8)).unwrap();
        let err = decode_tile(TileAddress::new(7, 1, 1), &png, 16).unwrap_err();
        assert!(matches!(err, ReliefError::Decode { .. }));
        assert!(err.to_string().contains("8x8"));
    }

    #[test]
    fn test_decode_tile_garbage() {
        let err = decode_tile(TileAddress::new(7, 1, 1), b"<html>404</html>", 16).unwrap_err();
        assert!(matches!(err, ReliefError::Decode { .. }));
    }
}
