//! POSIX ustar header blocks.

use crate::error::{ArchiveError, Result};

pub(crate) const BLOCK_LEN: usize = 512;
/// Default blocking factor of 20 blocks.
pub(crate) const RECORD_LEN: u64 = 20 * BLOCK_LEN as u64;

pub(crate) const TYPE_FILE: u8 = b'0';
pub(crate) const TYPE_OLD_FILE: u8 = 0;
pub(crate) const TYPE_DIR: u8 = b'5';
pub(crate) const TYPE_GNU_LONGNAME: u8 = b'L';
pub(crate) const TYPE_GNU_LONGLINK: u8 = b'K';
pub(crate) const TYPE_PAX_LOCAL: u8 = b'x';
pub(crate) const TYPE_PAX_GLOBAL: u8 = b'g';

pub(crate) const GNU_LONGLINK_NAME: &[u8] = b"././@LongLink";

pub(crate) const NAME_LEN: usize = 100;
pub(crate) const PREFIX_LEN: usize = 155;

const NAME: std::ops::Range<usize> = 0..100;
const MODE: std::ops::Range<usize> = 100..108;
const UID: std::ops::Range<usize> = 108..116;
const GID: std::ops::Range<usize> = 116..124;
const SIZE: std::ops::Range<usize> = 124..136;
const MTIME: std::ops::Range<usize> = 136..148;
const CHKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..263;
const VERSION: std::ops::Range<usize> = 263..265;
const PREFIX: std::ops::Range<usize> = 345..500;

const USTAR_MAGIC: &[u8] = b"ustar\0";

pub(crate) type Block = [u8; BLOCK_LEN];

/// How an entry name is spread over the name and prefix fields.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum NameLayout<'a> {
    Fits(&'a [u8]),
    Split { prefix: &'a [u8], name: &'a [u8] },
    TooLong,
}

impl<'a> NameLayout<'a> {
    pub(crate) fn of(name: &'a [u8]) -> Self {
        if name.len() <= NAME_LEN {
            return NameLayout::Fits(name);
        }

        let split = name
            .iter()
            .enumerate()
            .rev()
            .filter(|&(_, &b)| b == b'/')
            .map(|(i, _)| i)
            .find(|&i| i <= PREFIX_LEN && name.len() - i - 1 <= NAME_LEN && i + 1 < name.len());

        match split {
            Some(i) => NameLayout::Split {
                prefix: &name[..i],
                name: &name[i + 1..],
            },
            None => NameLayout::TooLong,
        }
    }
}

/// Field values of one header block.
#[derive(Debug)]
pub(crate) struct HeaderFields<'a> {
    pub name: &'a [u8],
    pub prefix: &'a [u8],
    pub mode: u32,
    pub size: u64,
    pub mtime: u64,
    pub typeflag: u8,
}

pub(crate) fn encode(fields: &HeaderFields<'_>) -> Result<Block> {
    let mut block = [0u8; BLOCK_LEN];

    block[..fields.name.len().min(NAME_LEN)]
        .copy_from_slice(&fields.name[..fields.name.len().min(NAME_LEN)]);
    write_octal(&mut block[MODE], fields.mode as u64)?;
    write_octal(&mut block[UID], 0)?;
    write_octal(&mut block[GID], 0)?;
    write_octal(&mut block[SIZE], fields.size)?;
    write_octal(&mut block[MTIME], fields.mtime)?;
    block[TYPEFLAG] = fields.typeflag;
    block[MAGIC].copy_from_slice(USTAR_MAGIC);
    block[VERSION].copy_from_slice(b"00");

    let prefix_len = fields.prefix.len().min(PREFIX_LEN);
    block[PREFIX.start..PREFIX.start + prefix_len].copy_from_slice(&fields.prefix[..prefix_len]);

    seal(&mut block);
    Ok(block)
}

/// Rewrite the size field and the checksum of an encoded block.
pub(crate) fn set_size(block: &mut Block, size: u64) -> Result<()> {
    write_octal(&mut block[SIZE], size)?;
    seal(block);
    Ok(())
}

fn seal(block: &mut Block) {
    block[CHKSUM].copy_from_slice(b"        ");
    let sum: u32 = block.iter().map(|&b| b as u32).sum();
    let digits = format!("{:06o}\0 ", sum);
    block[CHKSUM].copy_from_slice(digits.as_bytes());
}

/// `value` as zero-padded octal digits followed by a NUL.
fn write_octal(field: &mut [u8], value: u64) -> Result<()> {
    let width = field.len() - 1;
    let digits = format!("{:0width$o}", value, width = width);
    if digits.len() > width {
        return Err(ArchiveError::invalid_argument(format!(
            "value {} does not fit a {}-digit octal field",
            value, width
        )));
    }
    field[..width].copy_from_slice(digits.as_bytes());
    field[width] = 0;
    Ok(())
}

/// Octal, or GNU base-256 if the high bit of the first byte is set.
pub(crate) fn parse_numeric(field: &[u8]) -> Result<u64> {
    if field.first().map_or(false, |&b| b & 0x80 != 0) {
        let mut value: u64 = (field[0] & 0x7f) as u64;
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(b as u64))
                .ok_or_else(|| ArchiveError::corrupt("numeric header field overflows"))?;
        }
        return Ok(value);
    }

    let text = std::str::from_utf8(field)
        .map_err(|_| ArchiveError::corrupt("non-ASCII numeric header field"))?;
    let text = text.trim_matches(|c| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8)
        .map_err(|_| ArchiveError::corrupt(format!("invalid octal header field `{}`", text)))
}

/// Accepts both the unsigned and the historic signed checksum.
pub(crate) fn verify_checksum(block: &Block) -> Result<()> {
    let stored = parse_numeric(&block[CHKSUM])?;

    let (mut unsigned, mut signed) = (0u64, 0i64);
    for (i, &b) in block.iter().enumerate() {
        let b = if CHKSUM.contains(&i) { b' ' } else { b };
        unsigned += b as u64;
        signed += b as i8 as i64;
    }

    if stored == unsigned || stored as i64 == signed {
        Ok(())
    } else {
        Err(ArchiveError::corrupt("tar header checksum mismatch"))
    }
}

pub(crate) fn name(block: &Block) -> &[u8] {
    super::super::field_str(&block[NAME])
}

/// The ustar prefix, if this is a ustar block that has one.
pub(crate) fn prefix(block: &Block) -> Option<&[u8]> {
    if &block[MAGIC] != USTAR_MAGIC {
        return None;
    }
    match super::super::field_str(&block[PREFIX]) {
        [] => None,
        prefix => Some(prefix),
    }
}

pub(crate) fn mode(block: &Block) -> Result<u32> {
    Ok(parse_numeric(&block[MODE])? as u32)
}

pub(crate) fn size(block: &Block) -> Result<u64> {
    parse_numeric(&block[SIZE])
}

pub(crate) fn mtime(block: &Block) -> Result<u64> {
    parse_numeric(&block[MTIME])
}

pub(crate) fn typeflag(block: &Block) -> u8 {
    block[TYPEFLAG]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_layouts() {
        assert_eq!(NameLayout::of(b"a.txt"), NameLayout::Fits(b"a.txt"));

        let long = format!("{}/{}", "d".repeat(120), "f".repeat(50));
        match NameLayout::of(long.as_bytes()) {
            NameLayout::Split { prefix, name } => {
                assert_eq!(prefix.len(), 120);
                assert_eq!(name.len(), 50);
            }
            other => panic!("unexpected layout {:?}", other),
        }

        let unsplittable = "x".repeat(101);
        assert_eq!(NameLayout::of(unsplittable.as_bytes()), NameLayout::TooLong);
    }

    #[test]
    fn encoded_block_verifies() {
        let mut block = encode(&HeaderFields {
            name: b"hello.txt",
            prefix: b"",
            mode: 0o644,
            size: 5,
            mtime: 1_600_000_000,
            typeflag: TYPE_FILE,
        })
        .unwrap();

        verify_checksum(&block).unwrap();
        assert_eq!(name(&block), b"hello.txt");
        assert_eq!(size(&block).unwrap(), 5);
        assert_eq!(mode(&block).unwrap(), 0o644);
        assert_eq!(mtime(&block).unwrap(), 1_600_000_000);
        assert_eq!(&block[124..136], b"00000000005\0");

        set_size(&mut block, 4096).unwrap();
        verify_checksum(&block).unwrap();
        assert_eq!(size(&block).unwrap(), 4096);

        block[0] = b'j';
        assert!(verify_checksum(&block).is_err());
    }

    #[test]
    fn signed_checksum_is_accepted() {
        let mut block = encode(&HeaderFields {
            name: "caf\u{e9}/\u{fc}ber.txt".as_bytes(),
            prefix: b"",
            mode: 0o644,
            size: 0,
            mtime: 0,
            typeflag: TYPE_FILE,
        })
        .unwrap();

        // Old writers summed the bytes as signed chars.
        block[CHKSUM].copy_from_slice(b"        ");
        let signed: i64 = block.iter().map(|&b| b as i8 as i64).sum();
        let unsigned: i64 = block.iter().map(|&b| b as i64).sum();
        assert_ne!(signed, unsigned);

        block[CHKSUM].copy_from_slice(format!("{:06o}\0 ", signed).as_bytes());
        verify_checksum(&block).unwrap();

        block[CHKSUM].copy_from_slice(format!("{:06o}\0 ", signed + 1).as_bytes());
        assert!(verify_checksum(&block).is_err());
    }

    #[test]
    fn octal_overflow_is_rejected() {
        let mut block = [0u8; BLOCK_LEN];
        assert!(write_octal(&mut block[SIZE], 0o77777777777).is_ok());
        assert!(write_octal(&mut block[SIZE], 0o100000000000).is_err());
    }

    #[test]
    fn base256_sizes() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[7] = 0x02;
        assert_eq!(parse_numeric(&field).unwrap(), 2u64 << 32);
    }
}
