//! Carrying EXIF metadata from a source JPEG into an encoded JPEG.
//!
//! The encoder writes bare JPEG streams, so "keep metadata" means lifting
//! the source's APP1 `Exif` segment and splicing it in right after the
//! output's SOI/APP0 header. Nothing inside the EXIF payload is parsed or
//! rewritten.
//!
//! ```text
//! source:  FFD8 | FFE0 JFIF | FFE1 Exif… | … | FFDA scan
//! output:  FFD8 | FFE0 JFIF |                  … | FFDA scan
//!                            ▲ insert APP1 here
//! ```

const SOI: u8 = 0xD8;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const SOS: u8 = 0xDA;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// A JPEG marker segment: its marker byte and the byte range it covers
/// (including the `FF xx` marker and the length field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    marker: u8,
    start: usize,
    end: usize,
}

/// Walk the header segments of a JPEG up to (not including) the scan.
fn header_segments(data: &[u8]) -> Vec<Segment> {
    let mut segments = Vec::new();
    if data.len() < 4 || data[0] != 0xFF || data[1] != SOI {
        return segments;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            break;
        }
        let marker = data[pos + 1];
        // Fill bytes before a marker
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == SOS {
            break;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > data.len() {
            break;
        }
        segments.push(Segment {
            marker,
            start: pos,
            end,
        });
        pos = end;
    }
    segments
}

/// Return the full APP1 Exif segment (marker + length + payload), if any.
pub fn extract_exif_segment(jpeg: &[u8]) -> Option<Vec<u8>> {
    header_segments(jpeg)
        .into_iter()
        .find(|s| s.marker == APP1 && jpeg[s.start + 4..s.end].starts_with(EXIF_HEADER))
        .map(|s| jpeg[s.start..s.end].to_vec())
}

/// Insert an APP1 segment into `jpeg`, replacing any Exif segment it has.
///
/// Returns `None` when `jpeg` is not a JPEG stream.
pub fn insert_exif_segment(jpeg: &[u8], exif_segment: &[u8]) -> Option<Vec<u8>> {
    let segments = header_segments(jpeg);
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != SOI {
        return None;
    }

    // After SOI, or after a leading APP0 (JFIF must stay first).
    let insert_at = segments
        .first()
        .filter(|s| s.marker == APP0)
        .map(|s| s.end)
        .unwrap_or(2);

    let existing = segments
        .iter()
        .find(|s| s.marker == APP1 && jpeg[s.start + 4..s.end].starts_with(EXIF_HEADER));

    let mut out = Vec::with_capacity(jpeg.len() + exif_segment.len());
    match existing {
        Some(old) => {
            out.extend_from_slice(&jpeg[..old.start]);
            out.extend_from_slice(exif_segment);
            out.extend_from_slice(&jpeg[old.end..]);
        }
        None => {
            out.extend_from_slice(&jpeg[..insert_at]);
            out.extend_from_slice(exif_segment);
            out.extend_from_slice(&jpeg[insert_at..]);
        }
    }
    Some(out)
}

/// Copy the Exif segment of `source` into `encoded`.
///
/// Returns `encoded` unchanged when either side is not a JPEG or the source
/// carries no Exif.
pub fn transplant_exif(source: &[u8], encoded: Vec<u8>) -> Vec<u8> {
    match extract_exif_segment(source) {
        Some(segment) => insert_exif_segment(&encoded, &segment).unwrap_or(encoded),
        None => encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + 2) as u16;
        let mut seg = vec![0xFF, marker];
        seg.extend_from_slice(&len.to_be_bytes());
        seg.extend_from_slice(payload);
        seg
    }

    fn jpeg_with(segments: &[Vec<u8>]) -> Vec<u8> {
        let mut data = vec![0xFF, SOI];
        for s in segments {
            data.extend_from_slice(s);
        }
        // SOS + a couple of scan bytes + EOI
        data.extend_from_slice(&[0xFF, SOS, 0x00, 0x02, 0x12, 0x34, 0xFF, 0xD9]);
        data
    }

    fn exif_payload(tag: &[u8]) -> Vec<u8> {
        let mut p = EXIF_HEADER.to_vec();
        p.extend_from_slice(tag);
        p
    }

    #[test]
    fn extract_finds_exif_app1() {
        let exif = app_segment(APP1, &exif_payload(b"MM-data"));
        let jpeg = jpeg_with(&[app_segment(APP0, b"JFIF\0"), exif.clone()]);
        assert_eq!(extract_exif_segment(&jpeg), Some(exif));
    }

    #[test]
    fn extract_ignores_xmp_app1() {
        let xmp = app_segment(APP1, b"http://ns.adobe.com/xap/1.0/\0<x/>");
        let jpeg = jpeg_with(&[xmp]);
        assert_eq!(extract_exif_segment(&jpeg), None);
    }

    #[test]
    fn extract_from_non_jpeg_is_none() {
        assert_eq!(extract_exif_segment(b"\x89PNG\r\n\x1a\n"), None);
    }

    #[test]
    fn insert_goes_after_jfif_header() {
        let app0 = app_segment(APP0, b"JFIF\0");
        let jpeg = jpeg_with(&[app0.clone()]);
        let exif = app_segment(APP1, &exif_payload(b"II"));

        let out = insert_exif_segment(&jpeg, &exif).unwrap();
        let offset = 2 + app0.len();
        assert_eq!(&out[offset..offset + exif.len()], exif.as_slice());
        assert_eq!(out.len(), jpeg.len() + exif.len());
        assert_eq!(extract_exif_segment(&out), Some(exif));
    }

    #[test]
    fn insert_replaces_existing_exif() {
        let old = app_segment(APP1, &exif_payload(b"old"));
        let jpeg = jpeg_with(&[old]);
        let new = app_segment(APP1, &exif_payload(b"newer"));

        let out = insert_exif_segment(&jpeg, &new).unwrap();
        assert_eq!(extract_exif_segment(&out), Some(new));
        assert_eq!(header_segments(&out).len(), 1);
    }

    #[test]
    fn transplant_without_source_exif_is_identity() {
        let encoded = jpeg_with(&[]);
        let source = jpeg_with(&[app_segment(APP0, b"JFIF\0")]);
        assert_eq!(transplant_exif(&source, encoded.clone()), encoded);
    }

    #[test]
    fn transplant_into_real_encoded_jpeg() {
        let source = jpeg_with(&[app_segment(APP1, &exif_payload(b"camera"))]);
        let img = image::DynamicImage::new_rgb8(8, 8);
        let mut encoded = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Jpeg)
            .unwrap();

        let out = transplant_exif(&source, encoded);
        assert!(extract_exif_segment(&out).is_some());
        assert!(image::load_from_memory(&out).is_ok());
    }
}
