use crate::{Error, FromToU8, Message, MessageType};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, BytesMut};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use core::fmt;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha512};

/// A frame has the following layout:
/// - length (4 bytes, little-endian)
/// - nonce or digest (24 bytes)
/// - type (1 byte)
/// - flags (1 byte)
/// - message id (8 bytes, little-endian)
/// - body
///
/// With a key set, everything after the nonce is sealed and the cipher
/// appends a 16-byte tag, accounted for in the length prefix.
pub const MSG_HEADER_SIZE: usize = 38;

const NONCE_OFFSET: usize = 4;
const NONCE_SIZE: usize = 24;
const TYPE_OFFSET: usize = NONCE_OFFSET + NONCE_SIZE;
const PRELUDE_SIZE: usize = 10;

pub const KEY_SIZE: usize = 32;
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Packs and unpacks messages. Without a key, frames carry a truncated
/// SHA-512 integrity digest; with a 32-byte key, frames are sealed with
/// XChaCha20-Poly1305 under a fresh random nonce.
#[derive(Clone)]
pub struct Codec {
    cipher: Option<XChaCha20Poly1305>,
    rng: StdRng,
}

impl Codec {
    pub fn new() -> Codec {
        Codec {
            cipher: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_key(key: &[u8]) -> Result<Codec, Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::InvalidKeyLength(key.len()));
        }
        let cipher = XChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?;
        Ok(Codec {
            cipher: Some(cipher),
            rng: StdRng::from_entropy(),
        })
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Reads only the 4-byte length prefix, so a read loop can tell whether a
    /// full frame has been buffered without touching the rest.
    pub fn decode_message_length(src: &[u8]) -> Result<usize, Error> {
        if src.len() < 4 {
            return Err(Error::Incomplete);
        }
        let len = LittleEndian::read_u32(&src[..4]);
        if len as usize > MAX_MESSAGE_SIZE {
            return Err(Error::FrameTooLarge(len));
        }
        Ok(len as usize)
    }

    pub fn encode(&mut self, message: &Message) -> Result<bytes::Bytes, Error> {
        let mut region = BytesMut::with_capacity(64);
        region.put_u8(message.message_type().to_u8());
        region.put_u8(0); // flags, reserved
        region.put_u64_le(self.rng.next_u64());
        message.body_to_buf(&mut region)?;

        let mut nonce = [0u8; NONCE_SIZE];
        if self.cipher.is_some() {
            self.rng.fill_bytes(&mut nonce);
        }

        let mut frame = BytesMut::with_capacity(TYPE_OFFSET + region.len() + 16);
        match &self.cipher {
            None => {
                let digest = Sha512::digest(&region[..]);
                let total = TYPE_OFFSET + region.len();
                if total > MAX_MESSAGE_SIZE {
                    return Err(Error::FrameTooLarge(total as u32));
                }
                frame.put_u32_le(total as u32);
                frame.put_slice(&digest[..NONCE_SIZE]);
                frame.put_slice(&region);
            }
            Some(cipher) => {
                let sealed = cipher
                    .encrypt(XNonce::from_slice(&nonce), &region[..])
                    .map_err(|_| Error::BadSeal)?;
                let total = TYPE_OFFSET + sealed.len();
                if total > MAX_MESSAGE_SIZE {
                    return Err(Error::FrameTooLarge(total as u32));
                }
                frame.put_u32_le(total as u32);
                frame.put_slice(&nonce);
                frame.put_slice(&sealed);
            }
        }
        Ok(frame.freeze())
    }

    /// Decodes one frame from the front of `buf`. The frame is consumed only
    /// on success; on any error the buffer is left untouched, so the caller
    /// decides whether to skip the frame or drop the connection.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Message, Error> {
        if buf.len() < 4 {
            return Err(Error::Incomplete);
        }
        let total = Self::decode_message_length(&buf[..])?;
        if total < MSG_HEADER_SIZE {
            return Err(Error::TruncatedFrame);
        }
        if buf.len() < total {
            return Err(Error::Incomplete);
        }
        let message = self.decode_frame(&buf[..total])?;
        buf.advance(total);
        Ok(message)
    }

    fn decode_frame(&self, frame: &[u8]) -> Result<Message, Error> {
        let nonce = &frame[NONCE_OFFSET..TYPE_OFFSET];
        let region = &frame[TYPE_OFFSET..];
        let mut plain = match &self.cipher {
            None => {
                let digest = Sha512::digest(region);
                if digest[..NONCE_SIZE] != *nonce {
                    return Err(Error::BadDigest);
                }
                BytesMut::from(region)
            }
            Some(cipher) => {
                let opened = cipher
                    .decrypt(XNonce::from_slice(nonce), region)
                    .map_err(|_| Error::BadSeal)?;
                BytesMut::from(&opened[..])
            }
        };
        if plain.remaining() < PRELUDE_SIZE {
            return Err(Error::InvalidLength);
        }
        let message_type = MessageType::from_u8(plain.get_u8())?;
        let _flags = plain.get_u8();
        let _message_id = plain.get_u64_le();
        Message::body_from_buf(message_type, &mut plain)
    }
}

impl Default for Codec {
    fn default() -> Codec {
        Codec::new()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Codec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
