use std::io::Cursor;

use archio::{
    EntryDescriptor, ErrorKind, FormatKey, FormatRegistry, SeekableChannel, SessionState,
    WriterSession,
};

type Sink = SeekableChannel<Cursor<Vec<u8>>>;

fn sink() -> Option<Sink> {
    Some(SeekableChannel::new(Cursor::new(Vec::new())))
}

fn writer(key: FormatKey) -> Box<dyn WriterSession> {
    FormatRegistry::new()
        .create_writer(Some(key.as_str()), sink())
        .unwrap()
}

fn sample_entry() -> EntryDescriptor {
    EntryDescriptor::file("hello.txt", 5)
}

fn assert_protocol(result: archio::Result<()>, message: &str) {
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol, "{}", err);
    assert_eq!(err.to_string(), message);
}

#[test]
fn full_sequence_with_finalize() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(sample_entry()).unwrap();
        w.write(b"hel").unwrap();
        w.write(b"lo").unwrap();
        w.close_entry().unwrap();
        w.finalize().unwrap();
        assert_eq!(w.state(), SessionState::Finished);
        w.close().unwrap();
        assert_eq!(w.state(), SessionState::Closed);
    }
}

#[test]
fn finalize_is_optional() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(sample_entry()).unwrap();
        w.write(b"hello").unwrap();
        w.close_entry().unwrap();
        w.close().unwrap();
        assert_eq!(w.state(), SessionState::Closed, "{}", key);
    }
}

#[test]
fn finalize_with_open_entry_fails() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(sample_entry()).unwrap();
        assert_protocol(w.finalize(), "entry still open");
        assert_eq!(w.state(), SessionState::EntryOpen);

        w.close_entry().unwrap();
        w.close().unwrap();
    }
}

#[test]
fn close_with_open_entry_fails() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(sample_entry()).unwrap();
        assert_protocol(w.close(), "entry still open, close it first");
        assert_eq!(w.state(), SessionState::EntryOpen);

        w.close_entry().unwrap();
        w.close().unwrap();
    }
}

#[test]
fn close_entry_without_open_entry_fails() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        assert_protocol(w.close_entry(), "no open entry to close");

        w.open_entry(sample_entry()).unwrap();
        w.close_entry().unwrap();
        assert_protocol(w.close_entry(), "no open entry to close");
        w.close().unwrap();
    }
}

#[test]
fn finalize_after_close_always_fails() {
    for &key in FormatKey::all() {
        // Closed without finalizing.
        let mut w = writer(key);
        w.close().unwrap();
        assert_protocol(w.finalize(), "finalize called after session closed");

        // Closed after finalizing.
        let mut w = writer(key);
        w.finalize().unwrap();
        w.close().unwrap();
        assert_protocol(w.finalize(), "finalize called after session closed");
    }
}

#[test]
fn close_twice_is_harmless() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.add_entry(sample_entry(), b"hello").unwrap();
        w.close().unwrap();
        let written = w.bytes_written();
        w.close().unwrap();
        assert_eq!(w.bytes_written(), written);
    }
}

#[test]
fn double_open_and_late_open_fail() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(sample_entry()).unwrap();
        assert_protocol(
            w.open_entry(EntryDescriptor::file("other", 0)),
            "entry already open",
        );
        w.close_entry().unwrap();
        w.finalize().unwrap();
        assert_protocol(
            w.open_entry(EntryDescriptor::file("late", 0)),
            "session already finished/closed",
        );
        w.close().unwrap();
    }
}

#[test]
fn write_without_entry_fails() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        assert_protocol(w.write(b"x"), "no open entry");
        w.close().unwrap();
    }
}

#[test]
fn empty_writes_are_no_ops() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(EntryDescriptor::streamed("empty")).unwrap();
        let before = w.bytes_written();
        w.write(b"").unwrap();
        assert_eq!(w.bytes_written(), before);
        w.close_entry().unwrap();
        w.close().unwrap();
    }
}

#[test]
fn zero_length_entries_close() {
    for &key in FormatKey::all() {
        let mut w = writer(key);
        w.open_entry(EntryDescriptor::file("nothing", 0)).unwrap();
        w.close_entry().unwrap();
        if key != FormatKey::Ar {
            w.open_entry(EntryDescriptor::directory("dir")).unwrap();
            w.close_entry().unwrap();
        }
        w.close().unwrap();
    }
}

#[test]
fn oversized_entries_are_refused_at_close() {
    for key in [FormatKey::Zip, FormatKey::Jar, FormatKey::Cpio] {
        let mut w = writer(key);
        w.open_entry(EntryDescriptor::file("hello", 5 << 30)).unwrap();
        let err = w.close_entry().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeLimitExceeded);
        assert_eq!(err.to_string(), "hello's size exceeds the limit of 4GByte.");

        // The entry is abandoned; the session can still be torn down.
        assert_eq!(w.state(), SessionState::Idle);
        w.close().unwrap();
    }

    let mut w = writer(FormatKey::Tar);
    w.open_entry(EntryDescriptor::file("big", 9 << 30)).unwrap();
    let err = w.close_entry().unwrap_err();
    assert_eq!(err.to_string(), "big's size exceeds the limit of 8GByte.");
    w.close().unwrap();

    let mut w = writer(FormatKey::Ar);
    w.open_entry(EntryDescriptor::file("big", 10_000_000_000)).unwrap();
    let err = w.close_entry().unwrap_err();
    assert_eq!(err.to_string(), "big's size exceeds the limit of 10GByte.");
    w.close().unwrap();
}

#[test]
fn directories_take_no_content() {
    let mut w = writer(FormatKey::Tar);
    w.open_entry(EntryDescriptor::directory("d")).unwrap();
    assert_protocol(w.write(b"x"), "directory entries carry no content");
    w.close_entry().unwrap();
    w.close().unwrap();
}
