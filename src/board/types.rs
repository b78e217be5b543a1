use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::serde_helpers::deserialize_with_warnings;

/// Numeric identifier of a member record.
pub type ItemId = u64;

/// Identifier of a named section.
pub type SectionId = String;

/// A member record shown as a card on the board.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Item {
    /// Unique identifier of the member
    pub id: ItemId,
    /// Display name
    #[builder(into)]
    pub name: String,
}

impl Item {
    #[must_use]
    pub fn new<S: Into<String>>(id: ItemId, name: S) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Pointer coordinates of an in-progress drag.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A named section holding an ordered list of members.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Section {
    /// Unique identifier of the section
    #[builder(into)]
    pub id: SectionId,
    /// Heading shown above the section
    #[builder(into)]
    pub title: String,
    /// Members in display order
    #[builder(default)]
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Section {
    /// Create an empty section.
    #[must_use]
    pub fn new<I: Into<SectionId>, T: Into<String>>(id: I, title: T) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            items: Vec::new(),
        }
    }
}

/// Full snapshot of the shared board.
///
/// `items` holds the members not assigned to any section.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Builder)]
pub struct BoardState {
    #[builder(default)]
    #[serde(default)]
    pub sections: Vec<Section>,
    #[builder(default)]
    #[serde(default)]
    pub items: Vec<Item>,
    /// Unix timestamp in milliseconds of the last change
    #[builder(default)]
    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Timestamp,
}

/// Application events exchanged over the board WebSocket.
///
/// Encoded as JSON objects tagged by a `type` field, e.g.
/// `{"type":"DRAG_END"}`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardMessage {
    /// A drag is in progress
    DragUpdate { item: Item, position: Position },
    /// Authoritative full-state replace after a drop or roster edit
    DropUpdate {
        sections: Vec<Section>,
        items: Vec<Item>,
    },
    /// The active drag ended without a drop
    DragEnd,
    /// Initial snapshot sent by the server on connect
    InitState { state: BoardState },
}

impl BoardMessage {
    #[must_use]
    pub const fn drag_update(item: Item, position: Position) -> Self {
        Self::DragUpdate { item, position }
    }

    #[must_use]
    pub const fn drop_update(sections: Vec<Section>, items: Vec<Item>) -> Self {
        Self::DropUpdate { sections, items }
    }

    /// Wire tag of this message.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::DragUpdate { .. } => "DRAG_UPDATE",
            Self::DropUpdate { .. } => "DROP_UPDATE",
            Self::DragEnd => "DRAG_END",
            Self::InitState { .. } => "INIT_STATE",
        }
    }
}

/// Parse a board WebSocket frame.
///
/// Whitespace-only frames are treated as keepalives and yield no messages.
pub fn parse_message(bytes: &[u8]) -> crate::Result<Vec<BoardMessage>> {
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_slice(trimmed)?;
    let message: BoardMessage = deserialize_with_warnings(value)?;
    Ok(vec![message])
}
