//! Message model: the typed values carried in multicast datagrams.

use serde::{Deserialize, Serialize};

use crate::identity::EntityId;

/// An RGB color with `f64` channels. Alpha is not transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Rgb {
    pub const fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }
}

/// State of a ball entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallUpdate {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub color: Rgb,
}

/// State of a rectangle entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectangleUpdate {
    pub id: EntityId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Rgb,
}

/// The one-byte type tag following the partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Liveness no-op.
    Heartbeat = 0,
    /// Ball position/size/color.
    BallUpdate = 1,
    /// Rectangle position/size/color.
    RectangleUpdate = 2,
    /// Short UTF-16 text.
    TextMessage = 10,
}

impl MessageKind {
    /// Wire value of this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag. Unknown tags yield `None`.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Heartbeat),
            1 => Some(Self::BallUpdate),
            2 => Some(Self::RectangleUpdate),
            10 => Some(Self::TextMessage),
            _ => None,
        }
    }
}

/// A decoded or to-be-encoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Heartbeat,
    Text(String),
    Ball(BallUpdate),
    Rectangle(RectangleUpdate),
}

impl Message {
    /// The wire kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::Text(_) => MessageKind::TextMessage,
            Self::Ball(_) => MessageKind::BallUpdate,
            Self::Rectangle(_) => MessageKind::RectangleUpdate,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
