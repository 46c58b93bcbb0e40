use crate::{read_string, write_bytes, Error, FromToBuf};
use bytes::{Buf, BufMut, BytesMut};

/// Identity exchanged when a connection is established: the remote's node id
/// and the address it can be reached back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub id: u64,
    pub address: String,
}

impl Ident {
    pub fn new(id: u64, address: impl Into<String>) -> Ident {
        Ident {
            id,
            address: address.into(),
        }
    }
}

impl FromToBuf<Ident> for Ident {
    fn to_buf(&self, buf: &mut impl BufMut) -> Result<usize, Error> {
        buf.put_u64_le(self.id);
        let len = write_bytes(self.address.as_bytes(), buf)?;
        Ok(8 + len)
    }

    fn from_buf(buf: &mut BytesMut) -> Result<Ident, Error> {
        if buf.remaining() < 10 {
            return Err(Error::InvalidLength);
        }
        let id = buf.get_u64_le();
        let address = read_string(buf)?;
        Ok(Ident { id, address })
    }
}
