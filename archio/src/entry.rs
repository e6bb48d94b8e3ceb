use std::fmt;

use chrono::{DateTime, Utc};

/// File type bits of `mode`.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o644;
pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o755;

/// One logical item inside a container.
///
/// Descriptors are built by the caller and handed to a writer session with
/// `open_entry`; reader sessions yield them from `next_entry`. Directory
/// entries carry a size of zero and no content bytes.
#[derive(Clone, Eq, PartialEq)]
pub struct EntryDescriptor {
    pub(crate) name: String,
    pub(crate) size: Option<u64>,
    pub(crate) modified: DateTime<Utc>,
    pub(crate) mode: u32,
}

impl EntryDescriptor {
    /// A regular file whose size is known up front.
    pub fn file<S: Into<String>>(name: S, size: u64) -> EntryDescriptor {
        EntryDescriptor {
            name: name.into(),
            size: Some(size),
            modified: epoch(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// A regular file whose size is only discovered once its content has been written.
    pub fn streamed<S: Into<String>>(name: S) -> EntryDescriptor {
        EntryDescriptor {
            name: name.into(),
            size: None,
            modified: epoch(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// A directory. The name gets a trailing `/` if it lacks one.
    pub fn directory<S: Into<String>>(name: S) -> EntryDescriptor {
        EntryDescriptor {
            name: directory_name(name.into()),
            size: Some(0),
            modified: epoch(),
            mode: DEFAULT_DIR_MODE,
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> EntryDescriptor {
        self.modified = truncate_to_seconds(modified);
        self
    }

    /// Sets the full mode, including the file type bits. If no type bits are
    /// given, the current type is kept.
    pub fn with_mode(mut self, mode: u32) -> EntryDescriptor {
        self.mode = if mode & S_IFMT == 0 {
            (self.mode & S_IFMT) | mode
        } else {
            mode
        };
        if self.is_directory() {
            self.name = directory_name(std::mem::take(&mut self.name));
        }
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared size, or `None` if it was unknown when the entry was opened.
    #[inline]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    #[inline]
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    #[inline]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits only.
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// The name with any trailing `/` removed. Formats that mark directories
    /// with a trailing separator compare entries by this.
    pub fn trimmed_name(&self) -> &str {
        self.name.trim_end_matches('/')
    }

    /// A descriptor as recovered from an archive header.
    pub(crate) fn from_parts(name: String, size: u64, modified: DateTime<Utc>, mode: u32) -> Self {
        EntryDescriptor {
            name,
            size: Some(size),
            modified,
            mode,
        }
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }
}

impl fmt::Debug for EntryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryDescriptor")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("modified", &self.modified.timestamp())
            .field("mode", &format_args!("{:o}", self.mode))
            .finish()
    }
}

fn directory_name(mut name: String) -> String {
    if !name.is_empty() && !name.ends_with('/') {
        name.push('/');
    }
    name
}

pub(crate) fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default()
}

pub(crate) fn from_unix_seconds(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(epoch)
}

pub(crate) fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    from_unix_seconds(time.timestamp())
}
