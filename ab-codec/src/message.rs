use crate::ident::Ident;
use crate::leader::{LeaderActive, LeaderActiveAck};
use crate::{Error, FromToBuf, FromToU8};
use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    IdentRequest,
    Ident,
    LeaderActive,
    LeaderActiveAck,
}

impl FromToU8<MessageType> for MessageType {
    fn to_u8(&self) -> u8 {
        match *self {
            MessageType::IdentRequest => 1,
            MessageType::Ident => 2,
            MessageType::LeaderActive => 3,
            MessageType::LeaderActiveAck => 4,
        }
    }

    fn from_u8(byte: u8) -> Result<MessageType, Error> {
        match byte {
            1 => Ok(MessageType::IdentRequest),
            2 => Ok(MessageType::Ident),
            3 => Ok(MessageType::LeaderActive),
            4 => Ok(MessageType::LeaderActiveAck),
            _ => Err(Error::InvalidMessageType(byte)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    IdentRequest(Ident),
    Ident(Ident),
    LeaderActive(LeaderActive),
    LeaderActiveAck(LeaderActiveAck),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::IdentRequest(_) => MessageType::IdentRequest,
            Message::Ident(_) => MessageType::Ident,
            Message::LeaderActive(_) => MessageType::LeaderActive,
            Message::LeaderActiveAck(_) => MessageType::LeaderActiveAck,
        }
    }

    pub(crate) fn body_to_buf(&self, buf: &mut impl BufMut) -> Result<usize, Error> {
        match self {
            Message::IdentRequest(ident) | Message::Ident(ident) => ident.to_buf(buf),
            Message::LeaderActive(active) => active.to_buf(buf),
            Message::LeaderActiveAck(ack) => ack.to_buf(buf),
        }
    }

    pub(crate) fn body_from_buf(
        message_type: MessageType,
        buf: &mut BytesMut,
    ) -> Result<Message, Error> {
        match message_type {
            MessageType::IdentRequest => Ok(Message::IdentRequest(Ident::from_buf(buf)?)),
            MessageType::Ident => Ok(Message::Ident(Ident::from_buf(buf)?)),
            MessageType::LeaderActive => Ok(Message::LeaderActive(LeaderActive::from_buf(buf)?)),
            MessageType::LeaderActiveAck => {
                Ok(Message::LeaderActiveAck(LeaderActiveAck::from_buf(buf)?))
            }
        }
    }
}
