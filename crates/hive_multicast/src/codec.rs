//! Wire codec: fixed-layout binary encoding of [`Message`] values.
//!
//! Every datagram starts with a 5-byte header followed by a kind-specific
//! payload. All fields are big-endian.
//!
//! ```text
//! ┌───────────────────┬──────────┬──────────────────────────────┐
//! │ partition key i32 │ tag u8   │ payload (depends on tag)     │
//! └───────────────────┴──────────┴──────────────────────────────┘
//! ```
//!
//! | tag | kind      | payload                                               |
//! |-----|-----------|-------------------------------------------------------|
//! | 0   | heartbeat | none                                                  |
//! | 1   | ball      | uuid hi u64, uuid lo u64, x, y, size, r, g, b (f64)   |
//! | 2   | rectangle | uuid hi u64, uuid lo u64, x, y, w, h, r, g, b (f64)   |
//! | 10  | text      | unit count i32, then that many UTF-16 code units      |
//!
//! A full-length text (123 units) encodes to 255 bytes, so datagrams may
//! exceed the legacy 128-byte receive buffer; see [`MAX_DATAGRAM_SIZE`].

use crate::identity::{EntityId, PartitionKey};
use crate::message::{BallUpdate, Message, MessageKind, RectangleUpdate, Rgb};

/// Partition key plus type tag.
pub const HEADER_LEN: usize = 5;

/// Longest text carried, in UTF-16 code units.
pub const MAX_TEXT_UNITS: usize = 123;

/// Size of an encoded heartbeat.
pub const HEARTBEAT_LEN: usize = HEADER_LEN;

/// Size of an encoded ball update.
pub const BALL_LEN: usize = HEADER_LEN + 16 + 6 * 8;

/// Size of an encoded rectangle update.
pub const RECTANGLE_LEN: usize = HEADER_LEN + 16 + 7 * 8;

/// Largest datagram the codec produces (a text message at the cap).
pub const MAX_DATAGRAM_SIZE: usize = HEADER_LEN + 4 + MAX_TEXT_UNITS * 2;

/// Result of interpreting a received buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// A fully decoded message for our partition.
    Message(Message),
    /// Well-formed header carrying another partition's key.
    NotForUs { key: PartitionKey },
    /// The buffer could not be interpreted.
    Malformed(Malformed),
}

/// Why a buffer was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Malformed {
    #[error("datagram of {len} bytes is shorter than the header")]
    TooShort { len: usize },

    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    #[error("{kind:?} payload truncated at {len} bytes")]
    Truncated { kind: MessageKind, len: usize },
}

/// Encode `message` for partition `key`.
///
/// Text longer than [`MAX_TEXT_UNITS`] is truncated rather than rejected.
pub fn encode(message: &Message, key: PartitionKey) -> Vec<u8> {
    let mut out = Writer::with_capacity(encoded_len(message));
    out.i32(key.0);
    out.u8(message.kind().tag());

    match message {
        Message::Heartbeat => {}
        Message::Text(text) => {
            let units = text_units(text);
            out.i32(units.len() as i32);
            for unit in units {
                out.u16(unit);
            }
        }
        Message::Ball(ball) => {
            out.entity(ball.id);
            out.f64(ball.x);
            out.f64(ball.y);
            out.f64(ball.size);
            out.rgb(ball.color);
        }
        Message::Rectangle(rect) => {
            out.entity(rect.id);
            out.f64(rect.x);
            out.f64(rect.y);
            out.f64(rect.width);
            out.f64(rect.height);
            out.rgb(rect.color);
        }
    }

    out.into_inner()
}

/// Exact number of bytes [`encode`] produces for `message`.
pub fn encoded_len(message: &Message) -> usize {
    match message {
        Message::Heartbeat => HEARTBEAT_LEN,
        Message::Ball(_) => BALL_LEN,
        Message::Rectangle(_) => RECTANGLE_LEN,
        Message::Text(text) => HEADER_LEN + 4 + text_units(text).len() * 2,
    }
}

/// Decode a datagram, keeping it only if it carries `expected`.
///
/// The key is checked before the tag, so foreign traffic from a newer
/// protocol version reports [`DecodeOutcome::NotForUs`].
pub fn decode(bytes: &[u8], expected: PartitionKey) -> DecodeOutcome {
    let mut input = Reader::new(bytes);
    let (Some(key), Some(tag)) = (input.i32(), input.u8()) else {
        return DecodeOutcome::Malformed(Malformed::TooShort { len: bytes.len() });
    };

    let key = PartitionKey(key);
    if key != expected {
        return DecodeOutcome::NotForUs { key };
    }

    let Some(kind) = MessageKind::from_tag(tag) else {
        return DecodeOutcome::Malformed(Malformed::UnknownTag(tag));
    };

    match decode_payload(kind, &mut input) {
        Some(message) => DecodeOutcome::Message(message),
        None => DecodeOutcome::Malformed(Malformed::Truncated {
            kind,
            len: bytes.len(),
        }),
    }
}

fn decode_payload(kind: MessageKind, input: &mut Reader<'_>) -> Option<Message> {
    let message = match kind {
        MessageKind::Heartbeat => Message::Heartbeat,
        MessageKind::BallUpdate => Message::Ball(BallUpdate {
            id: input.entity()?,
            x: input.f64()?,
            y: input.f64()?,
            size: input.f64()?,
            color: input.rgb()?,
        }),
        MessageKind::RectangleUpdate => Message::Rectangle(RectangleUpdate {
            id: input.entity()?,
            x: input.f64()?,
            y: input.f64()?,
            width: input.f64()?,
            height: input.f64()?,
            color: input.rgb()?,
        }),
        MessageKind::TextMessage => {
            // Older peers encode the empty string with a count of -1.
            let count = usize::try_from(input.i32()?).unwrap_or(0);
            if input.remaining() < count.saturating_mul(2) {
                return None;
            }
            let units: Option<Vec<u16>> = (0..count).map(|_| input.u16()).collect();
            Message::Text(String::from_utf16_lossy(&units?))
        }
    };
    Some(message)
}

/// UTF-16 code units of `text`, capped at [`MAX_TEXT_UNITS`].
///
/// A cut between a surrogate pair drops the dangling high surrogate too.
fn text_units(text: &str) -> Vec<u16> {
    let mut units: Vec<u16> = text.encode_utf16().take(MAX_TEXT_UNITS).collect();
    if matches!(units.last(), Some(0xD800..=0xDBFF)) {
        units.pop();
    }
    units
}

// ---------------------------------------------------------------------------
// Byte cursors
// ---------------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.u64(v.to_bits());
    }

    fn entity(&mut self, id: EntityId) {
        let (high, low) = id.halves();
        self.u64(high);
        self.u64(low);
    }

    fn rgb(&mut self, color: Rgb) {
        self.f64(color.red);
        self.f64(color.green);
        self.f64(color.blue);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let (head, rest) = self.buf.split_first_chunk::<N>()?;
        self.buf = rest;
        Some(*head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_be_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_be_bytes)
    }

    fn f64(&mut self) -> Option<f64> {
        self.u64().map(f64::from_bits)
    }

    fn entity(&mut self) -> Option<EntityId> {
        Some(EntityId::from_halves(self.u64()?, self.u64()?))
    }

    fn rgb(&mut self) -> Option<Rgb> {
        Some(Rgb::new(self.f64()?, self.f64()?, self.f64()?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
