//! Java archives: zip, with the `0xCAFE` marker extra field on the first entry.

use crate::channel::ByteSink;
use crate::counting::OutputChannel;
use crate::entry::EntryDescriptor;
use crate::error::Result;
use crate::formats::zip::ZipEncoder;
use crate::formats::EntryEncoder;
use crate::limit::SizeLimit;
use crate::registry::{FormatKey, WriterOptions};

#[derive(Debug)]
pub struct JarEncoder {
    inner: ZipEncoder,
}

impl JarEncoder {
    pub fn new(options: &WriterOptions) -> Result<Self> {
        Ok(JarEncoder {
            inner: ZipEncoder::new(options)?.with_jar_marker(),
        })
    }
}

impl EntryEncoder for JarEncoder {
    fn format(&self) -> FormatKey {
        FormatKey::Jar
    }

    fn size_limit(&self) -> SizeLimit {
        self.inner.size_limit()
    }

    fn validate(&self, entry: &EntryDescriptor) -> Result<()> {
        self.inner.validate(entry)
    }

    fn start_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        self.inner.start_entry(out, entry)
    }

    fn update(&mut self, buf: &[u8]) {
        self.inner.update(buf)
    }

    fn finish_entry<S: ByteSink>(
        &mut self,
        out: &mut OutputChannel<S>,
        entry: &EntryDescriptor,
    ) -> Result<()> {
        self.inner.finish_entry(out, entry)
    }

    fn finish_archive<S: ByteSink>(&mut self, out: &mut OutputChannel<S>) -> Result<()> {
        self.inner.finish_archive(out)
    }
}
