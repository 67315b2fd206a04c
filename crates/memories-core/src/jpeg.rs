//! Just enough JPEG segment handling to lift an Exif block out of one file
//! and splice one into another. Entropy-coded data after SOS is never
//! touched.

use std::io;
use std::ops::Range;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// APP1 payload prefix that marks an Exif block
pub const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest TIFF block that fits one APP1 segment
const MAX_TIFF_LEN: usize = u16::MAX as usize - 2 - EXIF_HEADER.len();

struct Segment {
    marker: u8,
    /// Whole segment including the 0xFF marker bytes
    span: Range<usize>,
    /// Payload after the length field
    payload: Range<usize>,
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Marker segments between SOI and the start of scan. Returns them with
/// the offset where the untouched remainder (SOS onward) begins.
fn header_segments(jpeg: &[u8]) -> io::Result<(Vec<Segment>, usize)> {
    if jpeg.len() < 4 || jpeg[..2] != SOI {
        return Err(invalid("not a JPEG file"));
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    loop {
        if pos >= jpeg.len() {
            return Err(invalid("JPEG ended before start of scan"));
        }
        if jpeg[pos] != 0xFF {
            return Err(invalid("expected JPEG marker"));
        }
        let start = pos;
        // Fill bytes
        while pos < jpeg.len() && jpeg[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = jpeg.get(pos) else {
            return Err(invalid("truncated JPEG marker"));
        };
        pos += 1;

        if marker == SOS || marker == EOI {
            return Ok((segments, start));
        }
        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        let len_bytes = jpeg
            .get(pos..pos + 2)
            .ok_or_else(|| invalid("truncated JPEG segment length"))?;
        let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if len < 2 || pos + len > jpeg.len() {
            return Err(invalid("JPEG segment length out of range"));
        }
        segments.push(Segment {
            marker,
            span: start..pos + len,
            payload: pos + 2..pos + len,
        });
        pos += len;
    }
}

fn is_exif(jpeg: &[u8], seg: &Segment) -> bool {
    seg.marker == APP1 && jpeg[seg.payload.clone()].starts_with(EXIF_HEADER)
}

/// TIFF bytes of the first Exif APP1 segment, if any
pub fn exif_block(jpeg: &[u8]) -> io::Result<Option<&[u8]>> {
    let (segments, _) = header_segments(jpeg)?;
    Ok(segments
        .iter()
        .find(|s| is_exif(jpeg, s))
        .map(|s| &jpeg[s.payload.start + EXIF_HEADER.len()..s.payload.end]))
}

/// Copy of `jpeg` whose Exif block is `tiff`. Existing Exif segments are
/// dropped; the new one goes right after SOI, or after a leading JFIF APP0.
pub fn with_exif_block(jpeg: &[u8], tiff: &[u8]) -> io::Result<Vec<u8>> {
    if tiff.len() > MAX_TIFF_LEN {
        return Err(invalid("Exif block too large for one APP1 segment"));
    }
    let (segments, scan_start) = header_segments(jpeg)?;

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&SOI);

    let mut kept = segments.iter().filter(|s| !is_exif(jpeg, s)).peekable();
    if let Some(app0) = kept.next_if(|s| s.marker == APP0) {
        out.extend_from_slice(&jpeg[app0.span.clone()]);
    }

    let len = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);

    for seg in kept {
        out.extend_from_slice(&jpeg[seg.span.clone()]);
    }
    out.extend_from_slice(&jpeg[scan_start..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jpeg() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
            .encode_image(&img)
            .unwrap();
        buf
    }

    #[test]
    fn test_no_exif_in_fresh_jpeg() {
        assert!(exif_block(&sample_jpeg()).unwrap().is_none());
    }

    #[test]
    fn test_insert_then_replace() {
        let jpeg = sample_jpeg();
        let with_one = with_exif_block(&jpeg, b"MM\0*first").unwrap();
        assert_eq!(exif_block(&with_one).unwrap(), Some(&b"MM\0*first"[..]));

        let with_two = with_exif_block(&with_one, b"II*\0second").unwrap();
        assert_eq!(exif_block(&with_two).unwrap(), Some(&b"II*\0second"[..]));
        // Old block is gone, not stacked
        assert_eq!(with_two.len(), with_one.len() + 1);

        // Still decodes
        image::load_from_memory(&with_two).unwrap();
    }

    #[test]
    fn test_rejects_non_jpeg() {
        assert!(exif_block(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(with_exif_block(b"nope", b"II*\0").is_err());
    }
}
