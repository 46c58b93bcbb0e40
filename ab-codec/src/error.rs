use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Not enough buffered bytes for a full frame; read more and retry.
    Incomplete,

    /// The length prefix exceeds the maximum frame size.
    FrameTooLarge(u32),

    /// The length prefix is smaller than the fixed header.
    TruncatedFrame,

    /// Integrity digest mismatch on an unencrypted frame.
    BadDigest,

    /// Authenticated decryption failed.
    BadSeal,

    InvalidMessageType(u8),

    InvalidLength,

    InvalidString,

    InvalidKeyLength(usize),
}

impl Error {
    /// Fatal errors poison the stream: the length prefix can no longer be
    /// trusted, so the connection must be dropped. Everything else is scoped
    /// to a single frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FrameTooLarge(_) | Error::TruncatedFrame)
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Incomplete => "incomplete frame".fmt(fmt),
            Error::FrameTooLarge(len) => write!(fmt, "frame of {} bytes exceeds maximum", len),
            Error::TruncatedFrame => "frame shorter than header".fmt(fmt),
            Error::BadDigest => "integrity digest mismatch".fmt(fmt),
            Error::BadSeal => "authenticated decryption failed".fmt(fmt),
            Error::InvalidMessageType(t) => write!(fmt, "invalid message type {}", t),
            Error::InvalidLength => "invalid length".fmt(fmt),
            Error::InvalidString => "invalid utf-8 string".fmt(fmt),
            Error::InvalidKeyLength(len) => write!(fmt, "invalid key length {}, expected 32", len),
        }
    }
}
