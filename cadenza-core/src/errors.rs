// Cadenza
// Copyright (c) 2026 The Project Cadenza Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Cadenza.
#[derive(Debug)]
pub enum Error {
    /// A parameter was null, out of range, or otherwise nonsensical. Generally a programmer
    /// error.
    InvalidParameter(&'static str),
    /// The path did not resolve to any real or virtual entry.
    NotFound,
    /// An IO error occurred on the host filesystem or in the underlying SACD reader.
    IoError(io::Error),
    /// A memory allocation could not be satisfied.
    Memory,
    /// The context exists but no disc image is attached.
    NotOpen,
    /// The seek target is negative or otherwise invalid.
    SeekError(&'static str),
    /// The SACD reader returned fewer frames than requested.
    ReadError(&'static str),
    /// The image is not a valid SACD, a header is malformed, or tag rendering failed.
    FormatError(&'static str),
    /// The DST codec reported a failure.
    DstDecodeError(&'static str),
    /// A read was attempted past the end of the file. Non-fatal; callers may treat a partial
    /// read as success.
    EndOfFile,
    /// The operation requires a directory but the path names a file.
    NotDirectory,
    /// The operation requires a file but the path names a directory.
    IsDirectory,
    /// The overlay's limit on simultaneously registered disc images was reached.
    TooManyOpen,
    /// A write was attempted on a read-only handle.
    Access,
    /// A caller-supplied progress callback requested cancellation.
    Cancelled,
}

impl Error {
    /// Get the stable negative integer code for this error. `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match *self {
            Error::InvalidParameter(_) => -1,
            Error::NotFound => -2,
            Error::IoError(_) => -3,
            Error::Memory => -4,
            Error::NotOpen => -5,
            Error::SeekError(_) => -6,
            Error::ReadError(_) => -7,
            Error::FormatError(_) => -8,
            Error::DstDecodeError(_) => -9,
            Error::EndOfFile => -10,
            Error::NotDirectory => -11,
            Error::IsDirectory => -12,
            Error::TooManyOpen => -13,
            Error::Access => -14,
            Error::Cancelled => -15,
        }
    }

    /// Map this error onto an errno value for filesystem front-ends.
    pub fn to_errno(&self) -> i32 {
        // Values per POSIX <errno.h>.
        const ENOENT: i32 = 2;
        const EIO: i32 = 5;
        const ENOMEM: i32 = 12;
        const EACCES: i32 = 13;
        const EINVAL: i32 = 22;
        const ENOTDIR: i32 = 20;
        const EISDIR: i32 = 21;
        const EMFILE: i32 = 24;
        const EINTR: i32 = 4;

        match *self {
            Error::NotFound => ENOENT,
            Error::IoError(_) | Error::ReadError(_) | Error::DstDecodeError(_) => EIO,
            Error::Memory => ENOMEM,
            Error::Access => EACCES,
            Error::NotDirectory => ENOTDIR,
            Error::IsDirectory => EISDIR,
            Error::TooManyOpen => EMFILE,
            Error::Cancelled => EINTR,
            _ => EINVAL,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::InvalidParameter(msg) => {
                write!(f, "invalid parameter: {}", msg)
            }
            Error::NotFound => {
                write!(f, "not found")
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::Memory => {
                write!(f, "memory allocation error")
            }
            Error::NotOpen => {
                write!(f, "not open")
            }
            Error::SeekError(msg) => {
                write!(f, "seek error: {}", msg)
            }
            Error::ReadError(msg) => {
                write!(f, "read error: {}", msg)
            }
            Error::FormatError(msg) => {
                write!(f, "format error: {}", msg)
            }
            Error::DstDecodeError(msg) => {
                write!(f, "dst decode error: {}", msg)
            }
            Error::EndOfFile => {
                write!(f, "end of file")
            }
            Error::NotDirectory => {
                write!(f, "not a directory")
            }
            Error::IsDirectory => {
                write!(f, "is a directory")
            }
            Error::TooManyOpen => {
                write!(f, "too many open disc images")
            }
            Error::Access => {
                write!(f, "access denied")
            }
            Error::Cancelled => {
                write!(f, "cancelled")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::EndOfFile,
            io::ErrorKind::NotFound => Error::NotFound,
            _ => Error::IoError(err),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create an invalid parameter error.
pub fn invalid_parameter_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InvalidParameter(msg))
}

/// Convenience function to create a not found error.
pub fn not_found_error<T>() -> Result<T> {
    Err(Error::NotFound)
}

/// Convenience function to create a seek error.
pub fn seek_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::SeekError(msg))
}

/// Convenience function to create a read error.
pub fn read_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::ReadError(msg))
}

/// Convenience function to create a format error.
pub fn format_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::FormatError(msg))
}

/// Convenience function to create a DST decode error.
pub fn dst_decode_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DstDecodeError(msg))
}

/// Convenience function to create an end-of-file error.
pub fn end_of_file_error<T>() -> Result<T> {
    Err(Error::EndOfFile)
}
