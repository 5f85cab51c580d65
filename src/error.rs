#![allow(missing_docs)]

use std::{error, fmt, io};

use crate::validate::Violation;

#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	cause: Option<Box<dyn error::Error + Send + Sync>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
	/// The requested allocation alignment is not a power of two multiple of
	/// the pointer width, or a zero cache-line size was configured.
	InvalidAlignment,

	/// The platform allocator could not satisfy the request.
	OutOfMemory,

	/// A field of the shared state does not start on a cache-line boundary.
	///
	/// The region must not be used for telemetry once this is returned. The
	/// offending field is available through [`Error::violation`].
	///
	/// [`Error::violation`]: struct.Error.html#method.violation
	LayoutViolation,

	/// A field path string could not be parsed, or a layout has no offset for
	/// one of its own paths.
	InvalidFieldPath,
}

impl ErrorKind {
	fn description(&self) -> &'static str {
		match self {
			ErrorKind::InvalidAlignment => "invalid alignment",
			ErrorKind::OutOfMemory => "out of memory",
			ErrorKind::LayoutViolation => "layout violation",
			ErrorKind::InvalidFieldPath => "invalid field path",
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self.cause {
			None => None,
			Some(ref b) => Some(&**b),
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self.cause {
			None => write!(f, "{}", self.kind.description()),
			Some(ref c) => write!(f, "{}: {}", self.kind.description(), c),
		}
	}
}

#[doc(hidden)]
impl PartialEq for Error {
	fn eq(&self, other: &Error) -> bool {
		self.kind == other.kind
	}
}

impl Error {
	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	/// The first misaligned field, if this is a
	/// [`LayoutViolation`](enum.ErrorKind.html#variant.LayoutViolation).
	pub fn violation(&self) -> Option<&Violation> {
		self.cause.as_ref().and_then(|c| c.downcast_ref::<Violation>())
	}
}

pub(crate) fn new_os_error(kind: ErrorKind, code: i32) -> Error {
	Error {
		kind,
		cause: Some(Box::new(io::Error::from_raw_os_error(code))),
	}
}

pub(crate) fn new_error(kind: ErrorKind) -> Error {
	Error { kind, cause: None }
}

pub(crate) fn new_error_with<E>(kind: ErrorKind, cause: E) -> Error
where
	E: error::Error + Send + Sync + 'static,
{
	Error {
		kind,
		cause: Some(Box::new(cause)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_without_cause() {
		let err = new_error(ErrorKind::InvalidAlignment);
		assert_eq!(err.to_string(), "invalid alignment");
		assert!(error::Error::source(&err).is_none());
	}

	#[test]
	fn test_display_with_os_cause() {
		let err = new_os_error(ErrorKind::OutOfMemory, libc::ENOMEM);
		let msg = err.to_string();
		assert!(msg.starts_with("out of memory: "), "got {}", msg);
		assert!(error::Error::source(&err).is_some());
		assert!(err.violation().is_none());
	}

	#[test]
	fn test_eq_compares_kind_only() {
		assert_eq!(
			new_os_error(ErrorKind::OutOfMemory, libc::ENOMEM),
			new_error(ErrorKind::OutOfMemory)
		);
		assert_ne!(
			new_error(ErrorKind::OutOfMemory),
			new_error(ErrorKind::InvalidAlignment)
		);
	}
}
