//! Size limits of the native size fields of each container format.

use crate::error::{ArchiveError, Result};

/// The largest size a format can record without an extension mechanism,
/// along with the human readable spelling used in error messages.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SizeLimit {
    max: u64,
    label: &'static str,
}

impl SizeLimit {
    /// Classic zip: 4-byte unsigned size fields, no zip64.
    pub const ZIP32: SizeLimit = SizeLimit::new(0xFFFF_FFFF, "4GByte");
    /// cpio "newc": eight hex digits.
    pub const CPIO_NEWC: SizeLimit = SizeLimit::new(0xFFFF_FFFF, "4GByte");
    /// ustar: eleven octal digits.
    pub const USTAR: SizeLimit = SizeLimit::new(0o77777777777, "8GByte");
    /// ar: ten decimal digits.
    pub const AR: SizeLimit = SizeLimit::new(9_999_999_999, "10GByte");

    pub const fn new(max: u64, label: &'static str) -> SizeLimit {
        SizeLimit { max, label }
    }

    #[inline]
    pub fn max(&self) -> u64 {
        self.max
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    pub fn exceeded_by(&self, size: u64) -> bool {
        size > self.max
    }

    /// Fails with [`ArchiveError::SizeLimitExceeded`] if `size` cannot be
    /// stored. Performs no I/O.
    pub fn check(&self, name: &str, size: u64) -> Result<()> {
        if self.exceeded_by(size) {
            return Err(self.error_for(name));
        }
        Ok(())
    }

    pub fn error_for(&self, name: &str) -> ArchiveError {
        ArchiveError::SizeLimitExceeded {
            name: name.to_string(),
            limit: self.label,
        }
    }
}
