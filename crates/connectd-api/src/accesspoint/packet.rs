// Accesspoint packet types
//
// Every decrypted frame starts with a one-byte command identifying the
// packet type. Bytes the client doesn't know are kept as `Unknown(byte)`
// so they can still be routed (or dropped) by exact type.

use bytes::Bytes;

/// Command byte of an accesspoint packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    SecretBlock,
    Ping,
    StreamChunk,
    StreamChunkRes,
    ChannelError,
    ChannelAbort,
    RequestKey,
    AesKey,
    AesKeyError,
    Image,
    CountryCode,
    Pong,
    PongAck,
    Pause,
    ProductInfo,
    LegacyWelcome,
    LicenseVersion,
    Login,
    ApWelcome,
    AuthFailure,
    MercuryReq,
    MercurySub,
    MercuryUnsub,
    MercuryEvent,
    TrackEndedTime,
    UnknownDataAllZeros,
    PreferredLocale,
    Unknown0x0f,
    Unknown0x10,
    Unknown0x4f,
    Unknown(u8),
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x02 => Self::SecretBlock,
            0x04 => Self::Ping,
            0x08 => Self::StreamChunk,
            0x09 => Self::StreamChunkRes,
            0x0a => Self::ChannelError,
            0x0b => Self::ChannelAbort,
            0x0c => Self::RequestKey,
            0x0d => Self::AesKey,
            0x0e => Self::AesKeyError,
            0x0f => Self::Unknown0x0f,
            0x10 => Self::Unknown0x10,
            0x19 => Self::Image,
            0x1b => Self::CountryCode,
            0x1f => Self::UnknownDataAllZeros,
            0x49 => Self::Pong,
            0x4a => Self::PongAck,
            0x4b => Self::Pause,
            0x4f => Self::Unknown0x4f,
            0x50 => Self::ProductInfo,
            0x69 => Self::LegacyWelcome,
            0x74 => Self::PreferredLocale,
            0x76 => Self::LicenseVersion,
            0x82 => Self::TrackEndedTime,
            0xab => Self::Login,
            0xac => Self::ApWelcome,
            0xad => Self::AuthFailure,
            0xb2 => Self::MercuryReq,
            0xb3 => Self::MercurySub,
            0xb4 => Self::MercuryUnsub,
            0xb5 => Self::MercuryEvent,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::SecretBlock => 0x02,
            Self::Ping => 0x04,
            Self::StreamChunk => 0x08,
            Self::StreamChunkRes => 0x09,
            Self::ChannelError => 0x0a,
            Self::ChannelAbort => 0x0b,
            Self::RequestKey => 0x0c,
            Self::AesKey => 0x0d,
            Self::AesKeyError => 0x0e,
            Self::Unknown0x0f => 0x0f,
            Self::Unknown0x10 => 0x10,
            Self::Image => 0x19,
            Self::CountryCode => 0x1b,
            Self::UnknownDataAllZeros => 0x1f,
            Self::Pong => 0x49,
            Self::PongAck => 0x4a,
            Self::Pause => 0x4b,
            Self::Unknown0x4f => 0x4f,
            Self::ProductInfo => 0x50,
            Self::LegacyWelcome => 0x69,
            Self::PreferredLocale => 0x74,
            Self::LicenseVersion => 0x76,
            Self::TrackEndedTime => 0x82,
            Self::Login => 0xab,
            Self::ApWelcome => 0xac,
            Self::AuthFailure => 0xad,
            Self::MercuryReq => 0xb2,
            Self::MercurySub => 0xb3,
            Self::MercuryUnsub => 0xb4,
            Self::MercuryEvent => 0xb5,
            Self::Unknown(byte) => byte,
        }
    }
}

impl From<u8> for PacketType {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

/// A single decrypted accesspoint packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(packet_type: PacketType, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_command_bytes_map_to_named_types() {
        assert_eq!(PacketType::from_byte(0x50), PacketType::ProductInfo);
        assert_eq!(PacketType::from_byte(0xac), PacketType::ApWelcome);
        assert_eq!(PacketType::from_byte(0x04), PacketType::Ping);
        assert_eq!(PacketType::Pong.as_byte(), 0x49);
    }

    #[test]
    fn unknown_bytes_are_preserved() {
        let ty = PacketType::from_byte(0xee);
        assert_eq!(ty, PacketType::Unknown(0xee));
        assert_eq!(ty.as_byte(), 0xee);
    }

    #[test]
    fn every_byte_survives_the_mapping() {
        for byte in 0..=u8::MAX {
            assert_eq!(PacketType::from_byte(byte).as_byte(), byte);
        }
    }
}
