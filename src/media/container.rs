//! WebP (RIFF) container helpers.
//!
//! libwebp's simple encoder emits a bare `VP8 `/`VP8L` file with no room for
//! metadata. Resolution is carried by an `EXIF` chunk, which requires the
//! extended `VP8X` header:
//!
//! ```text
//! RIFF <size> WEBP
//!   VP8X  flags, canvas width-1, canvas height-1 (24-bit LE each)
//!   VP8 / VP8L / ALPH ...   image data, unchanged
//!   EXIF  TIFF blob
//! ```

use thiserror::Error;

use super::transform::Dpi;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const VP8X_PAYLOAD_LEN: usize = 10;

const FLAG_ALPHA: u8 = 0x10;
const FLAG_EXIF: u8 = 0x08;

/// TIFF resolution unit: inches.
const UNIT_INCH: u16 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("not a WebP file")]
    NotWebp,

    #[error("truncated {0} chunk")]
    Truncated(String),

    #[error("no image data chunk")]
    MissingImage,
}

/// One chunk of a RIFF body.
#[derive(Debug, Clone, Copy)]
struct Chunk<'a> {
    fourcc: [u8; 4],
    payload: &'a [u8],
}

fn chunks(webp: &[u8]) -> Result<Vec<Chunk<'_>>, ContainerError> {
    if webp.len() < RIFF_HEADER_LEN || &webp[..4] != b"RIFF" || &webp[8..12] != b"WEBP" {
        return Err(ContainerError::NotWebp);
    }

    let mut out = Vec::new();
    let mut offset = RIFF_HEADER_LEN;
    while offset + CHUNK_HEADER_LEN <= webp.len() {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&webp[offset..offset + 4]);
        let size = u32::from_le_bytes([
            webp[offset + 4],
            webp[offset + 5],
            webp[offset + 6],
            webp[offset + 7],
        ]) as usize;

        let start = offset + CHUNK_HEADER_LEN;
        let payload = webp
            .get(start..start + size)
            .ok_or_else(|| ContainerError::Truncated(String::from_utf8_lossy(&fourcc).into_owned()))?;
        out.push(Chunk { fourcc, payload });

        // Payloads are padded to an even length.
        offset = start + size + (size & 1);
    }
    Ok(out)
}

fn push_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

fn push_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Whether a `VP8L` bitstream declares an alpha channel.
fn lossless_has_alpha(payload: &[u8]) -> bool {
    // 0x2f signature, then 14 bits width-1, 14 bits height-1, 1 bit alpha.
    payload.len() >= 5
        && payload[0] == 0x2f
        && (u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]) >> 28) & 1 == 1
}

/// Payload of the first chunk named `fourcc`.
pub fn find_chunk<'a>(webp: &'a [u8], fourcc: &[u8; 4]) -> Option<&'a [u8]> {
    chunks(webp)
        .ok()?
        .into_iter()
        .find(|chunk| &chunk.fourcc == fourcc)
        .map(|chunk| chunk.payload)
}

/// Rewrite a WebP file so it carries `exif`, replacing any EXIF chunk
/// already present. `width` and `height` are the canvas size.
pub fn embed_exif(
    webp: &[u8],
    width: u32,
    height: u32,
    exif: &[u8],
) -> Result<Vec<u8>, ContainerError> {
    let chunks = chunks(webp)?;

    let mut flags = FLAG_EXIF;
    let mut body = Vec::with_capacity(webp.len() + exif.len() + 32);
    let mut has_image = false;

    for chunk in &chunks {
        match &chunk.fourcc {
            b"VP8X" => flags |= chunk.payload.first().copied().unwrap_or(0),
            b"EXIF" => {}
            fourcc => {
                if fourcc == b"VP8L" && lossless_has_alpha(chunk.payload) {
                    flags |= FLAG_ALPHA;
                }
                if fourcc == b"ALPH" {
                    flags |= FLAG_ALPHA;
                }
                has_image |= matches!(fourcc, b"VP8 " | b"VP8L" | b"ANMF");
                push_chunk(&mut body, fourcc, chunk.payload);
            }
        }
    }
    if !has_image {
        return Err(ContainerError::MissingImage);
    }
    push_chunk(&mut body, b"EXIF", exif);

    let mut vp8x = Vec::with_capacity(VP8X_PAYLOAD_LEN);
    vp8x.extend_from_slice(&[flags, 0, 0, 0]);
    push_u24(&mut vp8x, width.saturating_sub(1));
    push_u24(&mut vp8x, height.saturating_sub(1));

    let mut out = Vec::with_capacity(RIFF_HEADER_LEN + CHUNK_HEADER_LEN + VP8X_PAYLOAD_LEN + body.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(b"WEBP");
    push_chunk(&mut out, b"VP8X", &vp8x);
    out.extend_from_slice(&body);

    let riff_size = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&riff_size.to_le_bytes());
    Ok(out)
}

/// Express a resolution as a TIFF RATIONAL.
fn rational(value: f64) -> (u32, u32) {
    if value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        (value as u32, 1)
    } else {
        ((value * 1000.0).round().min(f64::from(u32::MAX)) as u32, 1000)
    }
}

/// Little-endian TIFF blob with XResolution, YResolution and
/// ResolutionUnit (inches) in IFD0.
pub fn resolution_exif(dpi: Dpi) -> Vec<u8> {
    const ENTRIES: u16 = 3;
    const IFD_OFFSET: u32 = 8;
    // header + entry count + entries + next-IFD offset
    const DATA_OFFSET: u32 = IFD_OFFSET + 2 + ENTRIES as u32 * 12 + 4;

    let mut tiff = Vec::with_capacity(DATA_OFFSET as usize + 16);
    tiff.extend_from_slice(b"II\x2a\x00");
    tiff.extend_from_slice(&IFD_OFFSET.to_le_bytes());
    tiff.extend_from_slice(&ENTRIES.to_le_bytes());

    let mut entry = |tag: u16, kind: u16, value: u32| {
        tiff.extend_from_slice(&tag.to_le_bytes());
        tiff.extend_from_slice(&kind.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&value.to_le_bytes());
    };
    entry(0x011A, 5, DATA_OFFSET); // XResolution, RATIONAL
    entry(0x011B, 5, DATA_OFFSET + 8); // YResolution, RATIONAL
    entry(0x0128, 3, u32::from(UNIT_INCH)); // ResolutionUnit, SHORT

    tiff.extend_from_slice(&0u32.to_le_bytes());
    for value in [dpi.x, dpi.y] {
        let (numerator, denominator) = rational(value);
        tiff.extend_from_slice(&numerator.to_le_bytes());
        tiff.extend_from_slice(&denominator.to_le_bytes());
    }
    tiff
}
