use crate::{read_content, write_content, Error, FromToBuf};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Broadcast by a leader or potential leader. `next == 0` is a plain
/// heartbeat; a nonzero `next` proposes `next_content` for that round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderActive {
    pub id: u64,
    pub seq: u64,
    pub round: u64,
    pub next: u64,
    pub next_content: Bytes,
}

impl LeaderActive {
    pub fn heartbeat(id: u64, seq: u64, round: u64) -> LeaderActive {
        LeaderActive {
            id,
            seq,
            round,
            next: 0,
            next_content: Bytes::new(),
        }
    }

    pub fn proposal(id: u64, seq: u64, round: u64, next: u64, next_content: Bytes) -> LeaderActive {
        LeaderActive {
            id,
            seq,
            round,
            next,
            next_content,
        }
    }
}

impl FromToBuf<LeaderActive> for LeaderActive {
    fn to_buf(&self, buf: &mut impl BufMut) -> Result<usize, Error> {
        buf.put_u64_le(self.id);
        buf.put_u64_le(self.seq);
        buf.put_u64_le(self.round);
        buf.put_u64_le(self.next);
        let len = write_content(&self.next_content, buf)?;
        Ok(32 + len)
    }

    fn from_buf(buf: &mut BytesMut) -> Result<LeaderActive, Error> {
        if buf.remaining() < 36 {
            return Err(Error::InvalidLength);
        }
        let id = buf.get_u64_le();
        let seq = buf.get_u64_le();
        let round = buf.get_u64_le();
        let next = buf.get_u64_le();
        let next_content = read_content(buf)?;
        Ok(LeaderActive {
            id,
            seq,
            round,
            next,
            next_content,
        })
    }
}

/// A node's response to a `LeaderActive` broadcast: the round it currently
/// holds as committed, tagged with the broadcast's sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderActiveAck {
    pub id: u64,
    pub seq: u64,
    pub round: u64,
}

impl FromToBuf<LeaderActiveAck> for LeaderActiveAck {
    fn to_buf(&self, buf: &mut impl BufMut) -> Result<usize, Error> {
        buf.put_u64_le(self.id);
        buf.put_u64_le(self.seq);
        buf.put_u64_le(self.round);
        Ok(24)
    }

    fn from_buf(buf: &mut BytesMut) -> Result<LeaderActiveAck, Error> {
        if buf.remaining() < 24 {
            return Err(Error::InvalidLength);
        }
        Ok(LeaderActiveAck {
            id: buf.get_u64_le(),
            seq: buf.get_u64_le(),
            round: buf.get_u64_le(),
        })
    }
}
