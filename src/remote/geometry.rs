//! PostGIS geometry helpers.
//!
//! The backend stores coordinates in a single `geography(Point)` column.
//! Writes go up as WKT. REST reads project the column into `lat`/`lng`
//! scalars server-side, but realtime change frames carry the raw column
//! value as EWKB hex, so inbound frames need a local decoder.

use crate::orbit::state::GeoPoint;

const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const WKB_POINT: u32 = 1;

/// WKT for a point write. PostGIS expects longitude first.
pub(crate) fn wkt_point(point: &GeoPoint) -> String {
    format!("POINT({} {})", point.lng, point.lat)
}

/// Decodes a hex-encoded (E)WKB point as emitted in realtime payloads.
/// Returns `None` for anything that is not a plain 2D point, including
/// truncated or non-hex input.
pub(crate) fn decode_ewkb_point(hex_str: &str) -> Option<GeoPoint> {
    let bytes = hex::decode(hex_str).ok()?;
    if bytes.len() < 5 {
        return None;
    }

    let big_endian = match bytes[0] {
        0 => true,
        1 => false,
        _ => return None,
    };
    let read_u32 = |b: &[u8]| -> Option<u32> {
        let arr: [u8; 4] = b.get(..4)?.try_into().ok()?;
        Some(if big_endian {
            u32::from_be_bytes(arr)
        } else {
            u32::from_le_bytes(arr)
        })
    };
    let read_f64 = |b: &[u8]| -> Option<f64> {
        let arr: [u8; 8] = b.get(..8)?.try_into().ok()?;
        Some(if big_endian {
            f64::from_be_bytes(arr)
        } else {
            f64::from_le_bytes(arr)
        })
    };

    let type_word = read_u32(&bytes[1..])?;
    if type_word & !EWKB_SRID_FLAG != WKB_POINT {
        return None;
    }

    // An SRID word sits between the type and the coordinates when flagged.
    let coords_at = if type_word & EWKB_SRID_FLAG != 0 { 9 } else { 5 };

    let lng = read_f64(bytes.get(coords_at..)?)?;
    let lat = read_f64(bytes.get(coords_at + 8..)?)?;
    Some(GeoPoint { lat, lng })
}
