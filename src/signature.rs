//! Declarative table of recognised file formats.
//!
//! Ported from `original_source/openrecover/signatures.py`'s
//! `FileSignature`/`ALL_SIGNATURES`, with the dynamic per-field size
//! extraction (`normalize_carve_data`'s `getattr` probing in
//! `original_source/openrecover/utils.py`) replaced by the compile-checked
//! `SizeRule` tag below.

use crate::evidence::RawReader;

/// How an `ExtentResolver` determines where a candidate ends, beyond a
/// literal footer search. `Custom` covers formats whose extent comes from
/// parsing their own header fields (SQLite, TIFF-family, PST) rather than
/// from a footer or a generic container rule.
#[derive(Clone, Copy)]
pub enum SizeRule {
    None,
    IsoBmff {
        allowed_brands: &'static [&'static [u8; 4]],
        scan_limit: u64,
    },
    RiffWithSubtype {
        subtype: &'static [u8; 4],
    },
    ZipEocd {
        scan_limit: u64,
    },
    Custom(fn(&dyn RawReader, u64, u64) -> Option<u64>),
}

#[derive(Clone, Copy)]
pub struct Signature {
    pub name: &'static str,
    pub extension: &'static str,
    pub header: &'static [u8],
    pub footer: Option<&'static [u8]>,
    /// Extra bytes appended after the footer match to reach the true end
    /// (e.g. PNG's 4-byte IEND CRC, which follows the literal `IEND` tag
    /// the footer search matches against).
    pub footer_trailer_len: u64,
    pub max_size: u64,
    pub header_adjust: i64,
    pub size_rule: SizeRule,
}

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

const ISO_BMFF_MP4_BRANDS: &[&[u8; 4]] = &[b"isom", b"iso2", b"mp41", b"mp42", b"3gp5", b"3g2a"];
const ISO_BMFF_MOV_BRANDS: &[&[u8; 4]] = &[b"qt  "];
const ISO_BMFF_M4_BRANDS: &[&[u8; 4]] = &[b"M4V ", b"M4A "];
const ISO_BMFF_HEIC_BRANDS: &[&[u8; 4]] = &[b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];
const ISO_BMFF_AVIF_BRANDS: &[&[u8; 4]] = &[b"avif"];

pub fn default_signatures() -> Vec<Signature> {
    vec![
        Signature {
            name: "jpeg",
            extension: "jpg",
            header: &[0xFF, 0xD8, 0xFF],
            footer: Some(&[0xFF, 0xD9]),
            footer_trailer_len: 0,
            max_size: 50 * MIB,
            header_adjust: 0,
            size_rule: SizeRule::None,
        },
        Signature {
            name: "png",
            extension: "png",
            header: &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
            footer: Some(b"IEND"),
            footer_trailer_len: 4,
            max_size: 100 * MIB,
            header_adjust: 0,
            size_rule: SizeRule::None,
        },
        Signature {
            name: "gif",
            extension: "gif",
            header: b"GIF8",
            footer: Some(&[0x00, 0x3B]),
            footer_trailer_len: 0,
            max_size: 50 * MIB,
            header_adjust: 0,
            size_rule: SizeRule::None,
        },
        Signature {
            name: "pdf",
            extension: "pdf",
            header: b"%PDF-",
            footer: Some(b"%%EOF"),
            footer_trailer_len: 0,
            max_size: GIB,
            header_adjust: 0,
            size_rule: SizeRule::None,
        },
        Signature {
            name: "zip",
            extension: "zip",
            header: b"PK\x03\x04",
            footer: None,
            footer_trailer_len: 0,
            max_size: 4 * GIB,
            header_adjust: 0,
            size_rule: SizeRule::ZipEocd {
                scan_limit: 64 * MIB,
            },
        },
        Signature {
            name: "wav",
            extension: "wav",
            header: b"RIFF",
            footer: None,
            footer_trailer_len: 0,
            max_size: 4 * GIB,
            header_adjust: 0,
            size_rule: SizeRule::RiffWithSubtype { subtype: b"WAVE" },
        },
        Signature {
            name: "mp4",
            extension: "mp4",
            header: b"ftyp",
            footer: None,
            footer_trailer_len: 0,
            max_size: 8 * GIB,
            header_adjust: 4,
            size_rule: SizeRule::IsoBmff {
                allowed_brands: ISO_BMFF_MP4_BRANDS,
                scan_limit: 8 * GIB,
            },
        },
        Signature {
            name: "mov",
            extension: "mov",
            header: b"ftyp",
            footer: None,
            footer_trailer_len: 0,
            max_size: 8 * GIB,
            header_adjust: 4,
            size_rule: SizeRule::IsoBmff {
                allowed_brands: ISO_BMFF_MOV_BRANDS,
                scan_limit: 8 * GIB,
            },
        },
        Signature {
            name: "m4",
            extension: "m4v",
            header: b"ftyp",
            footer: None,
            footer_trailer_len: 0,
            max_size: 8 * GIB,
            header_adjust: 4,
            size_rule: SizeRule::IsoBmff {
                allowed_brands: ISO_BMFF_M4_BRANDS,
                scan_limit: 8 * GIB,
            },
        },
        Signature {
            name: "heic",
            extension: "heic",
            header: b"ftyp",
            footer: None,
            footer_trailer_len: 0,
            max_size: 100 * MIB,
            header_adjust: 4,
            size_rule: SizeRule::IsoBmff {
                allowed_brands: ISO_BMFF_HEIC_BRANDS,
                scan_limit: 100 * MIB,
            },
        },
        Signature {
            name: "avif",
            extension: "avif",
            header: b"ftyp",
            footer: None,
            footer_trailer_len: 0,
            max_size: 100 * MIB,
            header_adjust: 4,
            size_rule: SizeRule::IsoBmff {
                allowed_brands: ISO_BMFF_AVIF_BRANDS,
                scan_limit: 100 * MIB,
            },
        },
        Signature {
            name: "tiff_le",
            extension: "tiff",
            header: b"II*\x00",
            footer: None,
            footer_trailer_len: 0,
            max_size: 200 * MIB,
            header_adjust: 0,
            size_rule: SizeRule::Custom(crate::extent::resolve_tiff_le),
        },
        Signature {
            name: "tiff_be",
            extension: "tiff",
            header: b"MM\x00*",
            footer: None,
            footer_trailer_len: 0,
            max_size: 200 * MIB,
            header_adjust: 0,
            size_rule: SizeRule::Custom(crate::extent::resolve_tiff_be),
        },
        Signature {
            name: "pst",
            extension: "pst",
            header: b"!BDN",
            footer: None,
            footer_trailer_len: 0,
            max_size: 50 * GIB,
            header_adjust: 0,
            size_rule: SizeRule::Custom(crate::extent::resolve_pst),
        },
        Signature {
            name: "sqlite",
            extension: "sqlite",
            header: b"SQLite format 3\x00",
            footer: None,
            footer_trailer_len: 0,
            max_size: 16 * GIB,
            header_adjust: 0,
            size_rule: SizeRule::Custom(crate::extent::resolve_sqlite),
        },
    ]
}

/// Select signatures by name for `--types`; an empty list selects all.
pub fn select<'a>(signatures: &'a [Signature], names: &[String]) -> Vec<&'a Signature> {
    if names.is_empty() {
        return signatures.iter().collect();
    }
    signatures
        .iter()
        .filter(|s| names.iter().any(|n| n.eq_ignore_ascii_case(s.name)))
        .collect()
}
