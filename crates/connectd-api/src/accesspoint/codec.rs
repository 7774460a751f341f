//! Encrypted framing for the accesspoint connection.
//!
//! The connection opens with a plaintext X25519 key exchange:
//!
//! ```text
//! client -> server   0x00 0x04 | client public key (32 bytes)
//! server -> client   server public key (32 bytes)
//! ```
//!
//! Both sides feed the shared secret through HKDF-SHA256 (salt = client key
//! followed by server key) to derive one ChaCha20-Poly1305 key per
//! direction. Every later frame is a big-endian `u32` length followed by the
//! sealed `[command | payload]`; the nonce is a per-direction counter, so
//! frames cannot be replayed or reordered without failing authentication.

use bytes::{Bytes, BytesMut};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use x25519_dalek::{EphemeralSecret, PublicKey};

use super::packet::{Packet, PacketType};
use crate::error::Error;

/// Protocol version bytes sent ahead of the client key.
pub const PROTOCOL_VERSION: [u8; 2] = [0x00, 0x04];

const KEY_LEN: usize = 32;
const MAX_FRAME_LENGTH: usize = 1 << 20;
const CLIENT_KEY_INFO: &[u8] = b"connectd ap client";
const SERVER_KEY_INFO: &[u8] = b"connectd ap server";

/// Which end of the connection a codec is sealing frames for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct DirectionalCipher {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl DirectionalCipher {
    fn new(key: &[u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 0,
        }
    }

    fn next_nonce(&mut self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter = self.counter.wrapping_add(1);
        nonce
    }
}

/// Length-delimited, AEAD-sealed packet codec for a `Framed` transport.
pub struct CipherCodec {
    framing: LengthDelimitedCodec,
    send: DirectionalCipher,
    recv: DirectionalCipher,
}

impl std::fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherCodec")
            .field("sent", &self.send.counter)
            .field("received", &self.recv.counter)
            .finish_non_exhaustive()
    }
}

impl CipherCodec {
    fn derive(
        role: Role,
        shared: &[u8; KEY_LEN],
        client_public: &[u8; KEY_LEN],
        server_public: &[u8; KEY_LEN],
    ) -> Result<Self, Error> {
        let mut salt = [0u8; KEY_LEN * 2];
        salt[..KEY_LEN].copy_from_slice(client_public);
        salt[KEY_LEN..].copy_from_slice(server_public);

        let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
        let mut client_key = [0u8; KEY_LEN];
        let mut server_key = [0u8; KEY_LEN];
        hk.expand(CLIENT_KEY_INFO, &mut client_key)
            .map_err(|e| Error::Handshake(format!("key derivation failed: {e}")))?;
        hk.expand(SERVER_KEY_INFO, &mut server_key)
            .map_err(|e| Error::Handshake(format!("key derivation failed: {e}")))?;

        let (send, recv) = match role {
            Role::Client => (client_key, server_key),
            Role::Server => (server_key, client_key),
        };

        Ok(Self {
            framing: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
            send: DirectionalCipher::new(&send),
            recv: DirectionalCipher::new(&recv),
        })
    }
}

impl Decoder for CipherCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Error> {
        let Some(frame) = self.framing.decode(src)? else {
            return Ok(None);
        };

        let nonce = self.recv.next_nonce();
        let plain = self
            .recv
            .cipher
            .decrypt(Nonce::from_slice(&nonce), frame.as_ref())
            .map_err(|_| Error::Cipher("frame failed authentication".into()))?;

        let (&command, payload) = plain
            .split_first()
            .ok_or_else(|| Error::Cipher("empty frame".into()))?;

        Ok(Some(Packet::new(
            PacketType::from_byte(command),
            Bytes::copy_from_slice(payload),
        )))
    }
}

impl Encoder<Packet> for CipherCodec {
    type Error = Error;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Error> {
        let mut plain = Vec::with_capacity(1 + packet.payload.len());
        plain.push(packet.packet_type.as_byte());
        plain.extend_from_slice(&packet.payload);

        let nonce = self.send.next_nonce();
        let sealed = self
            .send
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_slice())
            .map_err(|_| Error::Cipher("failed to seal frame".into()))?;

        self.framing.encode(Bytes::from(sealed), dst)?;
        Ok(())
    }
}

// ── Key exchange ─────────────────────────────────────────────────────

fn handshake_io(e: std::io::Error) -> Error {
    Error::Handshake(format!("key exchange interrupted: {e}"))
}

/// Run the client half of the key exchange over a fresh stream.
pub async fn client_handshake<S>(stream: &mut S) -> Result<CipherCodec, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    let mut hello = Vec::with_capacity(PROTOCOL_VERSION.len() + KEY_LEN);
    hello.extend_from_slice(&PROTOCOL_VERSION);
    hello.extend_from_slice(public.as_bytes());
    stream.write_all(&hello).await.map_err(handshake_io)?;
    stream.flush().await.map_err(handshake_io)?;

    let mut peer = [0u8; KEY_LEN];
    stream.read_exact(&mut peer).await.map_err(handshake_io)?;
    let peer = PublicKey::from(peer);

    let shared = secret.diffie_hellman(&peer);
    CipherCodec::derive(
        Role::Client,
        shared.as_bytes(),
        public.as_bytes(),
        peer.as_bytes(),
    )
}

/// Run the server half of the key exchange.
///
/// The client never calls this; it exists so loopback peers can speak the
/// same framing as a real accesspoint.
pub async fn server_handshake<S>(stream: &mut S) -> Result<CipherCodec, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut hello = [0u8; 2 + KEY_LEN];
    stream.read_exact(&mut hello).await.map_err(handshake_io)?;

    let (version, client_bytes) = hello.split_at(PROTOCOL_VERSION.len());
    if version != PROTOCOL_VERSION {
        return Err(Error::Handshake(format!(
            "unsupported protocol version {version:02x?}"
        )));
    }
    let client_bytes: [u8; KEY_LEN] = client_bytes
        .try_into()
        .map_err(|_| Error::Handshake("truncated client key".into()))?;
    let client_public = PublicKey::from(client_bytes);

    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    stream
        .write_all(public.as_bytes())
        .await
        .map_err(handshake_io)?;
    stream.flush().await.map_err(handshake_io)?;

    let shared = secret.diffie_hellman(&client_public);
    CipherCodec::derive(
        Role::Server,
        shared.as_bytes(),
        client_public.as_bytes(),
        public.as_bytes(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn paired_codecs() -> (CipherCodec, CipherCodec) {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        let (client, server) = tokio::join!(
            client_handshake(&mut client_io),
            server_handshake(&mut server_io)
        );
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn frames_sealed_by_client_open_on_server() {
        let (mut client, mut server) = paired_codecs().await;

        let mut wire = BytesMut::new();
        client
            .encode(Packet::new(PacketType::Login, &b"hello"[..]), &mut wire)
            .unwrap();
        client
            .encode(Packet::new(PacketType::Ping, &b"\x00\x01"[..]), &mut wire)
            .unwrap();

        let first = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(first.packet_type, PacketType::Login);
        assert_eq!(first.payload.as_ref(), b"hello");

        let second = server.decode(&mut wire).unwrap().unwrap();
        assert_eq!(second.packet_type, PacketType::Ping);
        assert!(server.decode(&mut wire).unwrap().is_none());
    }

    #[tokio::test]
    async fn directions_use_distinct_keys() {
        let (mut client, _server) = paired_codecs().await;

        // A client-sealed frame must not open with the client's own receive key.
        let mut wire = BytesMut::new();
        client
            .encode(Packet::new(PacketType::Login, &b"x"[..]), &mut wire)
            .unwrap();
        assert!(matches!(client.decode(&mut wire), Err(Error::Cipher(_))));
    }

    #[tokio::test]
    async fn tampered_frame_is_rejected() {
        let (mut client, mut server) = paired_codecs().await;

        let mut wire = BytesMut::new();
        client
            .encode(Packet::new(PacketType::Login, &b"payload"[..]), &mut wire)
            .unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;

        assert!(matches!(server.decode(&mut wire), Err(Error::Cipher(_))));
    }

    #[tokio::test]
    async fn partial_frame_waits_for_more_bytes() {
        let (mut client, mut server) = paired_codecs().await;

        let mut wire = BytesMut::new();
        client
            .encode(Packet::new(PacketType::ProductInfo, &b"<products/>"[..]), &mut wire)
            .unwrap();
        let mut partial = wire.split_to(wire.len() - 3);

        assert!(server.decode(&mut partial).unwrap().is_none());
        partial.unsplit(wire);
        let packet = server.decode(&mut partial).unwrap().unwrap();
        assert_eq!(packet.packet_type, PacketType::ProductInfo);
    }

    #[tokio::test]
    async fn server_rejects_unknown_protocol_version() {
        let (mut client_io, mut server_io) = tokio::io::duplex(1024);
        client_io.write_all(&[0x00, 0x03]).await.unwrap();
        client_io.write_all(&[7u8; KEY_LEN]).await.unwrap();

        let result = server_handshake(&mut server_io).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }
}
