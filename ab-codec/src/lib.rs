pub mod codec;
pub mod error;
pub mod ident;
pub mod leader;
pub mod message;

pub use codec::{Codec, KEY_SIZE, MAX_MESSAGE_SIZE, MSG_HEADER_SIZE};
pub use error::Error;
pub use ident::Ident;
pub use leader::{LeaderActive, LeaderActiveAck};
pub use message::{Message, MessageType};

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub trait FromToU8<R> {
    fn to_u8(&self) -> u8;
    fn from_u8(byte: u8) -> Result<R, Error>;
}

pub trait FromToBuf<R> {
    fn to_buf(&self, buf: &mut impl BufMut) -> Result<usize, Error>;
    fn from_buf(buf: &mut BytesMut) -> Result<R, Error>;
}

/// Writes a byte string with a 16-bit little-endian length prefix.
///
/// # Examples
/// ```
/// use bytes::BytesMut;
/// use ab_codec::write_bytes;
///
/// let mut buf = BytesMut::new();
/// let len = write_bytes(b"peer", &mut buf).unwrap();
/// assert_eq!(len, 6);
/// assert_eq!(buf.to_vec(), [4, 0, b'p', b'e', b'e', b'r']);
/// ```
pub fn write_bytes(bytes: &[u8], buf: &mut impl BufMut) -> Result<usize, Error> {
    if bytes.len() > u16::MAX as usize {
        return Err(Error::InvalidLength);
    }
    buf.put_u16_le(bytes.len() as u16);
    buf.put_slice(bytes);
    Ok(bytes.len() + 2)
}

pub fn read_bytes(buf: &mut BytesMut) -> Result<Bytes, Error> {
    if buf.remaining() < 2 {
        return Err(Error::InvalidLength);
    }
    let len = buf.get_u16_le() as usize;
    if len > buf.remaining() {
        return Err(Error::InvalidLength);
    }
    Ok(buf.split_to(len).freeze())
}

pub fn read_string(buf: &mut BytesMut) -> Result<String, Error> {
    String::from_utf8(read_bytes(buf)?.to_vec()).map_err(|_| Error::InvalidString)
}

/// Writes a payload with a 32-bit little-endian length prefix.
pub fn write_content(bytes: &[u8], buf: &mut impl BufMut) -> Result<usize, Error> {
    if bytes.len() > u32::MAX as usize {
        return Err(Error::InvalidLength);
    }
    buf.put_u32_le(bytes.len() as u32);
    buf.put_slice(bytes);
    Ok(bytes.len() + 4)
}

pub fn read_content(buf: &mut BytesMut) -> Result<Bytes, Error> {
    if buf.remaining() < 4 {
        return Err(Error::InvalidLength);
    }
    let len = buf.get_u32_le() as usize;
    if len > buf.remaining() {
        return Err(Error::InvalidLength);
    }
    Ok(buf.split_to(len).freeze())
}
