// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// A typed error carried across every fallible boundary in this workspace.
///
/// Modelled on the teacher's `moonfire_base::Error`: a small classification
/// (`ErrorKind`) plus an optional underlying cause, rather than a bag of
/// ad hoc variants per module.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Error {
            kind,
            msg: msg.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error {
            kind,
            msg: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Renders the message plus the full chain of causes, one per line.
    pub fn chain(&self) -> String {
        let mut out = self.msg.clone();
        let mut cause = self.source.as_deref().map(|e| e as &dyn std::error::Error);
        while let Some(e) = cause {
            out.push_str("\ncaused by: ");
            out.push_str(&e.to_string());
            cause = e.source();
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::with_source(ErrorKind::Io, "i/o error", e)
    }
}

/// Error kind. Narrowed from the teacher's gRPC-style `ErrorKind` to what
/// this domain actually produces (see spec.md §7).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Failure talking to the remote append-only file system. Always caught
    /// at the sink boundary; never raised to the driver.
    RemoteIo,

    /// `append` called while the sink is broken. A programmer error; raised,
    /// never caught.
    InvalidState,

    /// A local filesystem error from the reference `LocalDir` adapter, or
    /// any other plain I/O failure.
    Io,

    /// A configuration file failed to parse or was missing a required field.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::RemoteIo => "remote i/o error",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Io => "i/o error",
            ErrorKind::Config => "configuration error",
        };
        f.write_str(s)
    }
}

/// Like `anyhow::bail!`, but the first argument names an [`ErrorKind`].
///
/// ```
/// use divolte_base::{bail, ErrorKind};
/// let e = || -> Result<(), divolte_base::Error> {
///     bail!(InvalidState, "append() called while broken");
/// }().unwrap_err();
/// assert_eq!(e.kind(), ErrorKind::InvalidState);
/// ```
#[macro_export]
macro_rules! bail {
    ($kind:ident, $msg:expr) => {
        return Err($crate::Error::new($crate::ErrorKind::$kind, $msg));
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        return Err($crate::Error::new($crate::ErrorKind::$kind, format!($fmt, $($arg)+)));
    };
}

/// Like [`bail!`] but constructs the error rather than returning it.
#[macro_export]
macro_rules! err {
    ($kind:ident, $msg:expr) => {
        $crate::Error::new($crate::ErrorKind::$kind, $msg)
    };
    ($kind:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::Error::new($crate::ErrorKind::$kind, format!($fmt, $($arg)+))
    };
}
