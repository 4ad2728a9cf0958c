//! File handles.

use std::cell::{RefCell, RefMut};
use std::io::{Read, Write};

use crate::error::ErrorKind;
use crate::gc::{alloc, Header, Kind};
use crate::sym::Sym;
use crate::value::Val;

pub enum Handle {
    Stdin,
    Stdout,
    Stderr,
    Fs(std::fs::File),
}

/// Body of a `File` object.
pub struct FileBody {
    pub name: Sym,
    handle: RefCell<Handle>,
    pub readable: bool,
    pub writable: bool,
}

impl FileBody {
    /// Borrow the handle for writing.
    pub fn writer(&self) -> Result<RefMut<'_, Handle>, ErrorKind> {
        let handle = self.handle.borrow_mut();
        if !self.writable || matches!(*handle, Handle::Stdin) {
            return Err(not_permitted("writable"));
        }
        Ok(handle)
    }

    /// Borrow the handle for reading.
    pub fn reader(&self) -> Result<RefMut<'_, Handle>, ErrorKind> {
        let handle = self.handle.borrow_mut();
        if !self.readable || matches!(*handle, Handle::Stdout | Handle::Stderr) {
            return Err(not_permitted("readable"));
        }
        Ok(handle)
    }

    pub fn write_all(&self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.writer()?.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), ErrorKind> {
        self.writer()?.flush()?;
        Ok(())
    }

    pub fn read_to_end(&self) -> Result<Vec<u8>, ErrorKind> {
        let mut buf = vec![];
        self.reader()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Handle::Stdout => std::io::stdout().write(buf),
            Handle::Stderr => std::io::stderr().write(buf),
            Handle::Fs(f) => f.write(buf),
            Handle::Stdin => Err(std::io::ErrorKind::Unsupported.into()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Handle::Stdout => std::io::stdout().flush(),
            Handle::Stderr => std::io::stderr().flush(),
            Handle::Fs(f) => f.flush(),
            Handle::Stdin => Ok(()),
        }
    }
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Handle::Stdin => std::io::stdin().read(buf),
            Handle::Fs(f) => f.read(buf),
            Handle::Stdout | Handle::Stderr => Err(std::io::ErrorKind::Unsupported.into()),
        }
    }
}

fn not_permitted(what: &str) -> ErrorKind {
    ErrorKind::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        format!("file is not {}", what),
    ))
}

impl Val {
    /// Wrap a native handle. `name` is used when printing.
    pub fn file(name: Sym, handle: Handle, readable: bool, writable: bool) -> Val {
        let ptr = alloc::allocate(std::mem::size_of::<FileBody>(), Kind::File);
        unsafe {
            (Header::body(ptr) as *mut FileBody).write(FileBody {
                name,
                handle: RefCell::new(handle),
                readable,
                writable,
            });
            Val::from_header(ptr)
        }
    }

    pub fn as_file(&self) -> Option<&FileBody> {
        if self.is_kind(Kind::File) {
            let ptr = self.header_ptr()?;
            Some(unsafe { &*(Header::body(ptr) as *const FileBody) })
        } else {
            None
        }
    }
}
