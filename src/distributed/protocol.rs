//! Rendezvous protocol
//!
//! Messages exchanged between remote participants and the rendezvous
//! coordinator. Bodies are MessagePack (rmp-serde).
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Participant                    Coordinator
//!     |                              |
//!     |-------- JOIN --------------->|
//!     |<------- WELCOME(rank,size) --|   (once all `size` joins arrived)
//!     |                              |
//!     |-------- ARRIVE ------------->|
//!     |<------- RELEASE -------------|   (once every rank arrived)
//!     |                              |
//!     |-------- CONTRIBUTE(v) ------>|
//!     |<------- GATHERED([v..]) -----|   (once every rank contributed)
//!     |                              |
//!     |-------- LEAVE -------------->|
//! ```
//!
//! Either side may send `ABORT` at any point; the coordinator fans it out to
//! every participant. `ERROR` rejects a join.
//!
//! # Message Framing
//!
//! ```text
//! [4 bytes: body length (little-endian u32)][N bytes: MessagePack body]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and participants must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Request to join the group (Participant → Coordinator)
    Join(JoinMessage),

    /// Rank assignment, sent once the group is complete (Coordinator → Participant)
    Welcome(WelcomeMessage),

    /// Arrived at the barrier (Participant → Coordinator)
    Arrive,

    /// Every rank arrived; leave the barrier (Coordinator → Participant)
    Release,

    /// All-gather contribution (Participant → Coordinator)
    Contribute(ContributeMessage),

    /// Rank-ordered all-gather result (Coordinator → Participant)
    Gathered(GatheredMessage),

    /// Abort the whole group (either direction)
    Abort(AbortMessage),

    /// Join rejected (Coordinator → Participant)
    Error(ErrorMessage),

    /// Orderly departure (Participant → Coordinator)
    Leave,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMessage {
    pub protocol_version: u32,

    /// Specific rank wanted, or `None` for the lowest free rank
    pub requested_rank: Option<u32>,

    /// Participant identifier (hostname plus pid)
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub rank: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributeMessage {
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheredMessage {
    /// One value per rank, indexed by rank
    pub values: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMessage {
    /// Rank that requested the abort
    pub rank: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Node the error is about
    pub node_id: String,
    pub error: String,
}

/// Serialize a message with its length prefix
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;
    if msg_bytes.len() > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_bytes.len(), MAX_FRAME_BYTES);
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);
    Ok(framed)
}

/// Deserialize one framed message
///
/// Returns the message and the number of bytes consumed, length prefix included.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    if buf.len() < 4 {
        anyhow::bail!("Buffer too small for message length (need 4 bytes, got {})", buf.len());
    }

    let msg_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if msg_len > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_FRAME_BYTES);
    }
    if buf.len() < 4 + msg_len {
        anyhow::bail!("Incomplete message (need {} bytes, got {})", 4 + msg_len, buf.len());
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + msg_len]).context("Failed to deserialize message")?;
    Ok((msg, 4 + msg_len))
}

/// Read one message, or `None` if the peer closed cleanly between frames
pub async fn read_message_or_eof<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader
            .read(&mut len_buf[filled..])
            .await
            .context("Failed to read message length")?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            anyhow::bail!("Connection closed inside a message length prefix");
        }
        filled += n;
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_FRAME_BYTES);
    }

    let mut msg_buf = vec![0u8; msg_len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf).context("Failed to deserialize message")?;
    Ok(Some(msg))
}

/// Read one message; end of stream is an error
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    match read_message_or_eof(reader).await? {
        Some(msg) => Ok(msg),
        None => anyhow::bail!("Connection closed by peer"),
    }
}

/// Write one framed message and flush
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;
    writer.write_all(&framed).await.context("Failed to write message")?;
    writer.flush().await.context("Failed to flush stream")?;
    Ok(())
}
