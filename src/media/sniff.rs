//! Content-type detection for downloaded origin assets.
//!
//! The declared `Content-Type` wins. Without one, the first bytes of the body
//! are matched against known image signatures by prefix. Signatures are of
//! different lengths (JPEG needs only 3 bytes), so a fixed-width equality
//! against the whole sniff window would never recognise a JPEG.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

/// Fallback when nothing is declared and no signature matches.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Bytes inspected at the start of the body.
const SNIFF_WINDOW: usize = 6;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
];

/// Classify a response body.
///
/// The stream is rewound to offset 0 before returning, so the caller can read
/// the full body afterwards.
pub fn sniff<R: Read + Seek>(declared: Option<&str>, body: &mut R) -> io::Result<String> {
    if let Some(content_type) = declared.filter(|ct| !ct.trim().is_empty()) {
        return Ok(content_type.to_string());
    }

    body.seek(SeekFrom::Start(0))?;
    let mut window = [0u8; SNIFF_WINDOW];
    let filled = fill(body, &mut window)?;
    body.seek(SeekFrom::Start(0))?;

    Ok(sniff_bytes(&window[..filled]).to_string())
}

/// Match a byte prefix against the known signatures.
pub fn sniff_bytes(header: &[u8]) -> &'static str {
    SIGNATURES
        .iter()
        .find(|(signature, _)| header.starts_with(signature))
        .map_or(OCTET_STREAM, |(_, mime)| mime)
}

/// Whether a content type names an image.
pub fn is_image(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// Read until `buf` is full or the stream ends.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_declared_type_returned_verbatim() {
        let mut body = Cursor::new(b"\x89PNG\r\n\x1a\n".to_vec());
        let ct = sniff(Some("image/jpeg; charset=binary"), &mut body).unwrap();
        assert_eq!(ct, "image/jpeg; charset=binary");
    }

    #[test]
    fn test_blank_declared_type_falls_back_to_signature() {
        let mut body = Cursor::new(b"GIF89a\x01\x00".to_vec());
        assert_eq!(sniff(Some("  "), &mut body).unwrap(), "image/gif");
    }

    #[test]
    fn test_signatures() {
        assert_eq!(sniff_bytes(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_bytes(b"GIF87a...."), "image/gif");
        assert_eq!(sniff_bytes(b"GIF89a"), "image/gif");
        assert_eq!(sniff_bytes(b"<html>"), OCTET_STREAM);
        assert_eq!(sniff_bytes(b""), OCTET_STREAM);
    }

    #[test]
    fn test_jpeg_matches_by_prefix_not_fixed_window() {
        // A JPEG only shares 3 bytes with its signature; the remaining bytes
        // of the 6-byte window vary (APP0/APP1 marker, segment length).
        let header = b"\xFF\xD8\xFF\xE1\x00\x18";
        assert_ne!(&header[..], b"\xFF\xD8\xFF", "a fixed 6-byte compare would miss this");
        assert_eq!(sniff_bytes(header), "image/jpeg");

        // Bodies shorter than the window still match.
        let mut body = Cursor::new(b"\xFF\xD8\xFF".to_vec());
        assert_eq!(sniff(None, &mut body).unwrap(), "image/jpeg");
    }

    #[test]
    fn test_sniff_rewinds_stream() {
        let payload = b"\x89PNG\r\n\x1a\nrest-of-the-image".to_vec();
        let mut body = Cursor::new(payload.clone());

        assert_eq!(sniff(None, &mut body).unwrap(), "image/png");
        assert_eq!(body.position(), 0);

        let mut all = Vec::new();
        body.read_to_end(&mut all).unwrap();
        assert_eq!(all, payload);
    }

    #[test]
    fn test_sniff_rewinds_partially_read_stream() {
        let mut body = Cursor::new(b"GIF87a-frames".to_vec());
        body.set_position(4);
        assert_eq!(sniff(None, &mut body).unwrap(), "image/gif");
        assert_eq!(body.position(), 0);
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/png"));
        assert!(is_image("IMAGE/JPEG"));
        assert!(!is_image("text/html"));
        assert!(!is_image(OCTET_STREAM));
        assert!(!is_image("img"));
    }
}
