//! Resolves format identifiers to codecs.

use std::fmt;
use std::io::{Read, Seek};
use std::str::FromStr;

use crate::channel::ByteSink;
use crate::error::{ArchiveError, Result};
use crate::formats::{
    ar::{ArDecoder, ArEncoder},
    cpio::{CpioDecoder, CpioEncoder},
    jar::JarEncoder,
    tar::{TarDecoder, TarEncoder},
    zip::{ZipEncoder, ZipReader},
    ContainerWriter, StreamReader,
};
use crate::session::{ReaderSession, WriterSession};

/// Anything a reader session can pull bytes from.
pub trait ByteSource: Read + Seek {}

impl<T: Read + Seek + ?Sized> ByteSource for T {}

/// Identifier of a container format. Parsing is case-sensitive.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FormatKey {
    Zip,
    Jar,
    Ar,
    Cpio,
    Tar,
}

impl FormatKey {
    pub const fn all() -> &'static [FormatKey] {
        &[
            FormatKey::Zip,
            FormatKey::Jar,
            FormatKey::Ar,
            FormatKey::Cpio,
            FormatKey::Tar,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FormatKey::Zip => "zip",
            FormatKey::Jar => "jar",
            FormatKey::Ar => "ar",
            FormatKey::Cpio => "cpio",
            FormatKey::Tar => "tar",
        }
    }
}

impl fmt::Display for FormatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKey {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        FormatKey::all()
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(s.to_string()))
    }
}

/// Options for writer sessions created through the registry.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Emit GNU long-name records for tar names that do not fit ustar fields.
    pub tar_long_names: bool,
    /// Archive comment for zip and jar.
    pub zip_comment: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            tar_long_names: true,
            zip_comment: None,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tar_long_names(mut self, enabled: bool) -> Self {
        self.tar_long_names = enabled;
        self
    }

    pub fn with_zip_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.zip_comment = Some(comment.into());
        self
    }
}

/// Maps format keys to codec constructors.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatKey>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        FormatRegistry {
            formats: FormatKey::all().to_vec(),
        }
    }
}

impl FormatRegistry {
    /// A registry with every built-in format.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with no formats; add them with [`register`](Self::register).
    pub fn empty() -> Self {
        FormatRegistry {
            formats: Vec::new(),
        }
    }

    pub fn register(mut self, key: FormatKey) -> Self {
        if !self.formats.contains(&key) {
            self.formats.push(key);
        }
        self
    }

    /// Registered formats in registration order.
    pub fn formats(&self) -> &[FormatKey] {
        &self.formats
    }

    pub fn create_writer<'a, S: ByteSink + 'a>(
        &self,
        key: Option<&str>,
        sink: Option<S>,
    ) -> Result<Box<dyn WriterSession + 'a>> {
        self.create_writer_with_options(key, sink, &WriterOptions::default())
    }

    pub fn create_writer_with_options<'a, S: ByteSink + 'a>(
        &self,
        key: Option<&str>,
        sink: Option<S>,
        options: &WriterOptions,
    ) -> Result<Box<dyn WriterSession + 'a>> {
        let key =
            key.ok_or_else(|| ArchiveError::invalid_argument("Archivername must not be null."))?;
        let sink =
            sink.ok_or_else(|| ArchiveError::invalid_argument("OutputStream must not be null."))?;
        let format = self.resolve(key)?;

        tracing::debug!(format = %format, "creating writer session");

        let session: Box<dyn WriterSession + 'a> = match format {
            FormatKey::Zip => Box::new(ContainerWriter::new(sink, ZipEncoder::new(options)?)),
            FormatKey::Jar => Box::new(ContainerWriter::new(sink, JarEncoder::new(options)?)),
            FormatKey::Ar => Box::new(ContainerWriter::new(sink, ArEncoder::new())),
            FormatKey::Cpio => Box::new(ContainerWriter::new(sink, CpioEncoder::new())),
            FormatKey::Tar => Box::new(ContainerWriter::new(sink, TarEncoder::new(options))),
        };
        Ok(session)
    }

    pub fn create_reader<'a, R: ByteSource + 'a>(
        &self,
        key: Option<&str>,
        source: Option<R>,
    ) -> Result<Box<dyn ReaderSession + 'a>> {
        let key =
            key.ok_or_else(|| ArchiveError::invalid_argument("Archivername must not be null."))?;
        let source =
            source.ok_or_else(|| ArchiveError::invalid_argument("InputStream must not be null."))?;
        let format = self.resolve(key)?;

        tracing::debug!(format = %format, "creating reader session");

        let session: Box<dyn ReaderSession + 'a> = match format {
            FormatKey::Zip => Box::new(ZipReader::new(source)),
            FormatKey::Jar => Box::new(ZipReader::jar(source)),
            FormatKey::Ar => Box::new(StreamReader::new(source, ArDecoder::new())),
            FormatKey::Cpio => Box::new(StreamReader::new(source, CpioDecoder::new())),
            FormatKey::Tar => Box::new(StreamReader::new(source, TarDecoder::new())),
        };
        Ok(session)
    }

    fn resolve(&self, key: &str) -> Result<FormatKey> {
        let format = key.parse::<FormatKey>()?;
        if !self.formats.contains(&format) {
            return Err(ArchiveError::UnsupportedFormat(key.to_string()));
        }
        Ok(format)
    }
}
