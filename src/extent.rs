//! Per-format extent resolution: given a header hit, decide where the
//! candidate file ends.
//!
//! Each resolver reads through the `RawReader` directly at absolute
//! offsets rather than from a caller-supplied chunk buffer, so a
//! resolved extent never borrows memory owned by the sliding scan
//! window.

use crate::evidence::RawReader;
use crate::signature::{Signature, SizeRule};

const WINDOW: usize = 256 * 1024;

pub enum Extent {
    Found(u64),
    BestEffort(u64),
}

impl Extent {
    pub fn end(&self) -> u64 {
        match self {
            Extent::Found(e) | Extent::BestEffort(e) => *e,
        }
    }
}

/// Resolve the end offset of a candidate whose header matched at
/// `global_pos`: try the rule named by `size_rule` first, fall back to a
/// bounded footer re-read when that rule fails and a footer is defined,
/// and skip the candidate otherwise.
pub fn resolve(reader: &dyn RawReader, sig: &Signature, global_pos: u64) -> Option<Extent> {
    let primary = match &sig.size_rule {
        SizeRule::None => None,
        SizeRule::IsoBmff {
            allowed_brands,
            scan_limit,
        } => resolve_iso_bmff(reader, global_pos, allowed_brands, *scan_limit).map(Extent::Found),
        SizeRule::RiffWithSubtype { subtype } => {
            resolve_riff(reader, global_pos, subtype).map(Extent::Found)
        }
        SizeRule::ZipEocd { scan_limit } => {
            resolve_zip_eocd(reader, global_pos, *scan_limit).map(Extent::Found)
        }
        SizeRule::Custom(f) => f(reader, global_pos, sig.max_size).map(Extent::Found),
    };

    let resolved = match (&sig.size_rule, primary) {
        (SizeRule::None, _) => {
            let footer = sig.footer?;
            resolve_footer(reader, global_pos, sig.header.len(), footer, sig.footer_trailer_len, sig.max_size)
                .map(Extent::Found)
        }
        (_, Some(e)) => Some(e),
        (_, None) => sig
            .footer
            .and_then(|footer| resolve_bounded_fallback(reader, global_pos, footer)),
    }?;

    if resolved.end().saturating_sub(global_pos) <= sig.max_size {
        Some(resolved)
    } else {
        None
    }
}

/// Stream-read forward from `reader`, looking for `needle`. Reads in fixed
/// windows with a `needle.len()-1`-byte carry so a match straddling a
/// window boundary is still found, bounded by `limit` bytes scanned.
fn search_forward(reader: &dyn RawReader, start: u64, needle: &[u8], limit: u64) -> Option<u64> {
    if needle.is_empty() {
        return None;
    }
    let mut carry: Vec<u8> = Vec::new();
    let mut pos = start;
    let mut scanned = 0u64;
    let mut window = vec![0u8; WINDOW];

    loop {
        if scanned >= limit {
            return None;
        }
        let n = reader.read_at(pos, &mut window).ok()?;
        if n == 0 {
            return None;
        }
        let mut hay = carry.clone();
        hay.extend_from_slice(&window[..n]);

        if let Some(rel) = memchr::memmem::find(&hay, needle) {
            let match_start = pos - carry.len() as u64 + rel as u64;
            return Some(match_start);
        }

        let keep = needle.len().saturating_sub(1).min(hay.len());
        carry = hay[hay.len() - keep..].to_vec();
        pos += n as u64;
        scanned += n as u64;
        if n < window.len() {
            return None;
        }
    }
}

fn resolve_footer(
    reader: &dyn RawReader,
    global_pos: u64,
    header_len: usize,
    footer: &[u8],
    trailer_len: u64,
    max_size: u64,
) -> Option<u64> {
    let search_start = global_pos + header_len as u64;
    let match_pos = search_forward(reader, search_start, footer, max_size)?;
    Some(match_pos + footer.len() as u64 + trailer_len)
}

/// Row "None of the above, but footer defined": a bounded re-read of a
/// fixed window from the hit, searching for the footer; if the footer is
/// genuinely absent, the whole window is returned as a best-effort guess
/// rather than rejecting the candidate outright.
fn resolve_bounded_fallback(reader: &dyn RawReader, global_pos: u64, footer: &[u8]) -> Option<Extent> {
    let window_len = 2 * WINDOW;
    let mut buf = vec![0u8; window_len];
    let n = reader.read_at(global_pos, &mut buf).ok()?;
    if n == 0 {
        return None;
    }
    if let Some(rel) = memchr::memmem::find(&buf[..n], footer) {
        return Some(Extent::Found(global_pos + rel as u64 + footer.len() as u64));
    }
    Some(Extent::BestEffort(global_pos + n as u64))
}

fn read_exact_at(reader: &dyn RawReader, offset: u64, len: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = reader.read_at(offset, &mut buf).ok()?;
    if n < len {
        return None;
    }
    Some(buf)
}

/// Walk ISO-BMFF boxes starting at the `ftyp` box, located 4 bytes before
/// the literal `ftyp` tag match (the box's declared size precedes its
/// type tag). Handles the 64-bit extended size form; rejects anything
/// whose first box is not `ftyp` with an allowed brand.
fn resolve_iso_bmff(
    reader: &dyn RawReader,
    global_pos: u64,
    allowed_brands: &[&[u8; 4]],
    scan_limit: u64,
) -> Option<u64> {
    const BOX_HEADER_LEN: u64 = 8;
    const EXTENDED_HEADER_LEN: u64 = 16;

    let header = read_exact_at(reader, global_pos, BOX_HEADER_LEN as usize)?;
    if &header[4..8] != b"ftyp" {
        return None;
    }
    let brand = read_exact_at(reader, global_pos + BOX_HEADER_LEN, 4)?;
    let brand: &[u8; 4] = brand.as_slice().try_into().ok()?;
    if !allowed_brands.contains(&brand) {
        return None;
    }

    let mut offset = global_pos;
    let mut last_good = global_pos;
    let mut box_count = 0u32;

    loop {
        if offset - global_pos >= scan_limit {
            break;
        }
        let header = match read_exact_at(reader, offset, BOX_HEADER_LEN as usize) {
            Some(h) => h,
            None => break,
        };
        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let box_size = if size32 == 1 {
            let ext = match read_exact_at(reader, offset, EXTENDED_HEADER_LEN as usize) {
                Some(e) => e,
                None => break,
            };
            u64::from_be_bytes(ext[8..16].try_into().unwrap())
        } else if size32 == 0 {
            break;
        } else {
            size32
        };

        if box_size < BOX_HEADER_LEN {
            break;
        }
        offset += box_size;
        last_good = offset;
        box_count += 1;
    }

    if box_count < 1 {
        return None;
    }
    Some(last_good)
}

fn resolve_riff(reader: &dyn RawReader, global_pos: u64, subtype: &[u8; 4]) -> Option<u64> {
    let header = read_exact_at(reader, global_pos, 12)?;
    if &header[0..4] != b"RIFF" {
        return None;
    }
    let declared_size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as u64;
    if &header[8..12] != subtype.as_slice() {
        return None;
    }
    Some(global_pos + declared_size + 8)
}

fn resolve_zip_eocd(reader: &dyn RawReader, global_pos: u64, scan_limit: u64) -> Option<u64> {
    let eocd_sig = [0x50, 0x4B, 0x05, 0x06];
    let eocd_offset = search_forward(reader, global_pos + 4, &eocd_sig, scan_limit)?;
    let fixed = read_exact_at(reader, eocd_offset, 22)?;
    let comment_len = u16::from_le_bytes(fixed[20..22].try_into().unwrap()) as u64;
    Some(eocd_offset + 22 + comment_len)
}

// --- Custom resolvers (SizeRule::Custom users) ---

fn is_valid_page_size(page_size: u32) -> bool {
    (512..=65536).contains(&page_size) && page_size.is_power_of_two()
}

pub fn resolve_sqlite(reader: &dyn RawReader, global_pos: u64, max_size: u64) -> Option<u64> {
    let header = read_exact_at(reader, global_pos, 100)?;
    let raw_page_size = u16::from_be_bytes(header[16..18].try_into().unwrap());
    let page_size: u32 = if raw_page_size == 1 { 65536 } else { raw_page_size as u32 };
    if !is_valid_page_size(page_size) {
        return None;
    }
    let page_count = u32::from_be_bytes(header[28..32].try_into().unwrap()) as u64;
    let total = page_count.saturating_mul(page_size as u64);
    if total == 0 || total > max_size {
        return None;
    }
    Some(global_pos + total)
}

const MAX_IFD_ENTRIES: usize = 4096;
const MAX_TIFF_DATA_BYTES: u64 = 64 * 1024 * 1024;

fn resolve_tiff(reader: &dyn RawReader, global_pos: u64, max_size: u64, big_endian: bool) -> Option<u64> {
    let header = read_exact_at(reader, global_pos, 8)?;
    let ifd_offset = if big_endian {
        u32::from_be_bytes(header[4..8].try_into().unwrap())
    } else {
        u32::from_le_bytes(header[4..8].try_into().unwrap())
    } as u64;

    let mut end = global_pos + 8;
    let mut next_ifd = ifd_offset;
    let mut guard = 0;

    while next_ifd != 0 && guard < 16 {
        guard += 1;
        let count_bytes = read_exact_at(reader, global_pos + next_ifd, 2)?;
        let count = if big_endian {
            u16::from_be_bytes(count_bytes.try_into().unwrap())
        } else {
            u16::from_le_bytes(count_bytes.try_into().unwrap())
        } as usize;
        if count > MAX_IFD_ENTRIES {
            return None;
        }

        let entries_start = global_pos + next_ifd + 2;
        end = end.max(entries_start + count as u64 * 12 + 6);

        for i in 0..count {
            let entry = read_exact_at(reader, entries_start + i as u64 * 12, 12)?;
            let value = if big_endian {
                u32::from_be_bytes(entry[8..12].try_into().unwrap())
            } else {
                u32::from_le_bytes(entry[8..12].try_into().unwrap())
            } as u64;
            let candidate = global_pos + value;
            if candidate > global_pos && candidate - global_pos <= max_size {
                end = end.max(candidate);
            }
        }

        if end.saturating_sub(global_pos) > MAX_TIFF_DATA_BYTES.min(max_size) {
            return None;
        }

        let next_bytes = read_exact_at(reader, entries_start + count as u64 * 12, 4)?;
        next_ifd = if big_endian {
            u32::from_be_bytes(next_bytes.try_into().unwrap())
        } else {
            u32::from_le_bytes(next_bytes.try_into().unwrap())
        } as u64;
    }

    if end.saturating_sub(global_pos) > max_size {
        return None;
    }
    Some(end)
}

pub fn resolve_tiff_le(reader: &dyn RawReader, global_pos: u64, max_size: u64) -> Option<u64> {
    resolve_tiff(reader, global_pos, max_size, false)
}

pub fn resolve_tiff_be(reader: &dyn RawReader, global_pos: u64, max_size: u64) -> Option<u64> {
    resolve_tiff(reader, global_pos, max_size, true)
}

/// Unicode PST (2003+) NDB header: `totalFileSize` is an 8-byte
/// little-endian field at offset 0xB8. Rejected outright if absurd rather
/// than falling back, since PST has no footer to fall back to.
pub fn resolve_pst(reader: &dyn RawReader, global_pos: u64, max_size: u64) -> Option<u64> {
    let field = read_exact_at(reader, global_pos + 0xB8, 8)?;
    let size = u64::from_le_bytes(field.try_into().unwrap());
    if size < 512 || size > max_size {
        return None;
    }
    Some(global_pos + size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::FileSource;

    fn reader_for(bytes: &[u8]) -> (tempfile::TempDir, FileSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.bin");
        std::fs::write(&path, bytes).unwrap();
        let src = FileSource::open(&path).unwrap();
        (dir, src)
    }

    #[test]
    fn footer_search_finds_jpeg_eoi() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend(vec![0u8; 300]);
        data.extend_from_slice(&[0xFF, 0xD9]);
        let (_d, src) = reader_for(&data);
        let end = resolve_footer(&src, 0, 3, &[0xFF, 0xD9], 0, 1_000_000).unwrap();
        assert_eq!(end, data.len() as u64);
    }

    #[test]
    fn png_footer_includes_crc_trailer() {
        let mut data = b"\x89PNG\r\n\x1A\n".to_vec();
        data.extend_from_slice(b"IEND");
        data.extend_from_slice(&[0u8; 4]);
        let (_d, src) = reader_for(&data);
        let end = resolve_footer(&src, 0, 8, b"IEND", 4, 1_000_000).unwrap();
        assert_eq!(end, data.len() as u64);
    }

    #[test]
    fn riff_wave_extent_is_declared_size_plus_eight() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&24u32.to_le_bytes());
        data.extend_from_slice(b"WAVE");
        data.extend_from_slice(&[0u8; 24]);
        let (_d, src) = reader_for(&data);
        let end = resolve_riff(&src, 0, b"WAVE").unwrap();
        assert_eq!(end, 32);
    }

    #[test]
    fn riff_rejects_non_wave_subtype() {
        let mut data = b"RIFF".to_vec();
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"AVI ");
        let (_d, src) = reader_for(&data);
        assert!(resolve_riff(&src, 0, b"WAVE").is_none());
    }

    #[test]
    fn iso_bmff_walks_boxes_and_requires_matching_brand() {
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(b"qt  ");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&8u32.to_be_bytes());
        data.extend_from_slice(b"moov");
        let (_d, src) = reader_for(&data);
        let end = resolve_iso_bmff(&src, 0, &[b"qt  "], 1_000_000).unwrap();
        assert_eq!(end, data.len() as u64);
        assert!(resolve_iso_bmff(&src, 0, &[b"isom"], 1_000_000).is_none());
    }

    #[test]
    fn zip_eocd_scan_locates_record() {
        let mut data = b"PK\x03\x04".to_vec();
        data.extend(vec![0u8; 50]);
        let eocd_at = data.len();
        data.extend_from_slice(&[0x50, 0x4B, 0x05, 0x06]);
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&0u16.to_le_bytes());
        let (_d, src) = reader_for(&data);
        let end = resolve_zip_eocd(&src, 0, 1_000_000).unwrap();
        assert_eq!(end, eocd_at as u64 + 22);
    }

    #[test]
    fn sqlite_extent_is_page_size_times_page_count() {
        let mut header = vec![0u8; 100];
        header[0..16].copy_from_slice(b"SQLite format 3\x00");
        header[16..18].copy_from_slice(&4096u16.to_be_bytes());
        header[28..32].copy_from_slice(&10u32.to_be_bytes());
        let (_d, src) = reader_for(&header);
        let end = resolve_sqlite(&src, 0, 1_000_000_000).unwrap();
        assert_eq!(end, 4096 * 10);
    }

    #[test]
    fn sqlite_rejects_non_power_of_two_page_size() {
        let mut header = vec![0u8; 100];
        header[16..18].copy_from_slice(&5000u16.to_be_bytes());
        header[28..32].copy_from_slice(&10u32.to_be_bytes());
        let (_d, src) = reader_for(&header);
        assert!(resolve_sqlite(&src, 0, 1_000_000_000).is_none());
    }

    #[test]
    fn bounded_fallback_returns_whole_window_when_footer_missing() {
        let data = vec![0u8; 1024];
        let (_d, src) = reader_for(&data);
        match resolve_bounded_fallback(&src, 0, b"NOPE") {
            Some(Extent::BestEffort(end)) => assert_eq!(end, 1024),
            other => panic!("expected best-effort extent, got {:?}", other.map(|e| e.end())),
        }
    }
}
