//! Geohash encoding for node locations.

use crate::error::{FfmrError, Result};

/// Precision used for the `location` tag
pub const DEFAULT_PRECISION: usize = 12;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Encode a coordinate as a geohash of `precision` characters.
///
/// Bits alternate between longitude and latitude, longitude first.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Result<String> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(FfmrError::nodes(format!("latitude {} out of range", latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(FfmrError::nodes(format!("longitude {} out of range", longitude)));
    }

    let mut lat = (-90.0_f64, 90.0_f64);
    let mut lon = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut even = true;
    let mut bit = 0;
    let mut index = 0usize;

    while hash.len() < precision {
        let (range, value) = if even {
            (&mut lon, longitude)
        } else {
            (&mut lat, latitude)
        };
        let mid = (range.0 + range.1) / 2.0;
        if value >= mid {
            index |= 1 << (4 - bit);
            range.0 = mid;
        } else {
            range.1 = mid;
        }
        even = !even;

        bit += 1;
        if bit == 5 {
            hash.push(BASE32[index] as char);
            bit = 0;
            index = 0;
        }
    }

    Ok(hash)
}
