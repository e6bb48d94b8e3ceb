//! POSIX ustar archives, with GNU long-name records for names that do not
//! fit the name and prefix fields.

use std::io::Read;

use crate::channel::ByteSink;
use crate::counting::{padding_for, OutputChannel};
use crate::entry::{from_unix_seconds, EntryDescriptor, S_IFDIR, S_IFREG};
use crate::error::{ArchiveError, Result};
use crate::formats::{
    field_str, provisional_size, read_block, read_exact, skip, utf8_name, DecodedEntry,
    EntryDecoder, EntryEncoder,
};
use crate::limit::SizeLimit;
use crate::registry::{FormatKey, WriterOptions};

mod header;

use self::header::{Block, HeaderFields, NameLayout, BLOCK_LEN, RECORD_LEN};

/// Longest GNU long name this reader accepts.
const MAX_LONG_NAME: u64 = 64 * 1024;

#[derive(Debug)]
pub struct TarEncoder {
    long_names: bool,
    header: Option<(u64, Block)>,
    provisional: u64,
}

impl TarEncoder {
    pub fn new(options: &WriterOptions) -> Self {
        TarEncoder {
            long_names: options.tar_long_names,
            header: None,
            provisional: 0,
        }
    }

    fn write_long_name<S: ByteSink>(&self, out: &mut OutputChannel<S>, name: &[u8]) -> Result<()> {
        let len = name.len() as u64 + 1;
        let block = header::encode(&HeaderFields {
            name: header::GNU_LONGLINK_NAME,
            prefix: b"",
            mode: 0,
            size: len,
            mtime: 0,
            typeflag: header::TYPE_GNU_LONGNAME,
        })?;
        out.write(&block)?;
        out.write(name)?;
        out.write(&[0])?;
        out.pad_to(BLOCK_LEN as u64)
    }
}

impl EntryEncoder for TarEncoder {
    fn format(&self) -> FormatKey {
        FormatKey::Tar
    }

    fn size_limit(&self) -> SizeLimit {
        SizeLimit::USTAR
    }

    fn validate(&self, entry: &EntryDescriptor) -> Result<()> {
        let name = entry.name();
        if !self.long_names && NameLayout::of(name.as_bytes()) == NameLayout::TooLong {
            return Err(ArchiveError::invalid_argument(format!(
                "file name '{}' is too long (> {} bytes)",
                name,
                header::NAME_LEN
            )));
        }
        Ok(())
    }

    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        let name = entry.name();
        let (name_field, prefix_field) = match NameLayout::of(name.as_bytes()) {
            NameLayout::Fits(name) => (name, &b""[..]),
            NameLayout::Split { prefix, name } => (name, prefix),
            NameLayout::TooLong => {
                self.write_long_name(out, name.as_bytes())?;
                (&name.as_bytes()[..header::NAME_LEN], &b""[..])
            }
        };

        let typeflag = if entry.is_directory() {
            header::TYPE_DIR
        } else {
            header::TYPE_FILE
        };

        self.provisional = provisional_size(entry, self.size_limit());
        let block = header::encode(&HeaderFields {
            name: name_field,
            prefix: prefix_field,
            mode: entry.permissions(),
            size: self.provisional,
            mtime: entry.modified().timestamp().max(0) as u64,
            typeflag,
        })?;

        let offset = out.position();
        out.write(&block)?;
        self.header = Some((offset, block));
        Ok(())
    }

    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        out.pad_to(BLOCK_LEN as u64)?;

        let size = entry.size().unwrap_or(0);
        if let Some((offset, mut block)) = self.header.take() {
            if size != self.provisional {
                header::set_size(&mut block, size)?;
                out.patch(&block, offset)?;
            }
        }
        Ok(())
    }

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        out.write_zeros(2 * BLOCK_LEN as u64)?;
        out.pad_to(RECORD_LEN)
    }
}

#[derive(Debug, Default)]
pub struct TarDecoder;

impl TarDecoder {
    pub fn new() -> Self {
        TarDecoder
    }
}

impl EntryDecoder for TarDecoder {
    fn format(&self) -> FormatKey {
        FormatKey::Tar
    }

    fn next_header<R: Read>(&mut self, src: &mut R) -> Result<Option<DecodedEntry>> {
        let mut block: Block = [0u8; BLOCK_LEN];
        let mut long_name: Option<String> = None;

        loop {
            if !read_block(src, &mut block)? || block.iter().all(|&b| b == 0) {
                return Ok(None);
            }
            header::verify_checksum(&block)?;

            let size = header::size(&block)?;
            let padding = padding_for(size, BLOCK_LEN as u64);

            match header::typeflag(&block) {
                header::TYPE_GNU_LONGNAME => {
                    if size > MAX_LONG_NAME {
                        return Err(ArchiveError::corrupt("GNU long name is too long"));
                    }
                    let mut buf = vec![0u8; size as usize];
                    read_exact(src, &mut buf)?;
                    skip(src, padding)?;
                    long_name = Some(utf8_name(field_str(&buf))?);
                    continue;
                }
                header::TYPE_GNU_LONGLINK | header::TYPE_PAX_LOCAL | header::TYPE_PAX_GLOBAL => {
                    tracing::trace!(
                        typeflag = header::typeflag(&block),
                        size,
                        "skipping extension header"
                    );
                    skip(src, size + padding)?;
                    continue;
                }
                _ => {}
            }

            let name = match long_name.take() {
                Some(name) => name,
                None => match header::prefix(&block) {
                    Some(prefix) => {
                        let mut full = prefix.to_vec();
                        full.push(b'/');
                        full.extend_from_slice(header::name(&block));
                        utf8_name(&full)?
                    }
                    None => utf8_name(header::name(&block))?,
                },
            };

            let typeflag = header::typeflag(&block);
            let is_dir = typeflag == header::TYPE_DIR
                || (typeflag == header::TYPE_OLD_FILE && name.ends_with('/'));
            let kind = if is_dir { S_IFDIR } else { S_IFREG };
            let mode = kind | (header::mode(&block)? & 0o7777);
            let mtime = i64::try_from(header::mtime(&block)?).unwrap_or(i64::MAX);

            let data_len = if is_dir { 0 } else { size };
            return Ok(Some(DecodedEntry {
                entry: EntryDescriptor::from_parts(name, data_len, from_unix_seconds(mtime), mode),
                data_len,
                padding: if is_dir { size + padding } else { padding },
            }));
        }
    }
}
