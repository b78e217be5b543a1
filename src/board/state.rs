use chrono::Utc;

use super::types::{BoardMessage, BoardState, Item, ItemId, Position, Section, SectionId};
use crate::error::Error;
use crate::{Result, Timestamp};

/// Where a member sits on the board.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The pool of members not assigned to any section
    Unassigned,
    /// A named section
    Section(SectionId),
}

impl Location {
    #[must_use]
    pub fn section<S: Into<SectionId>>(id: S) -> Self {
        Self::Section(id.into())
    }
}

/// A drag currently in progress on some viewer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDrag {
    pub item: Item,
    pub position: Position,
}

/// Local mirror of the shared board.
///
/// Inbound messages are folded in with [`apply`](Self::apply). Admin edits
/// mutate the mirror and return the `DROP_UPDATE` to broadcast; the server
/// echoes it to every viewer, so the last write wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    sections: Vec<Section>,
    unassigned: Vec<Item>,
    last_updated: Timestamp,
    active_drag: Option<ActiveDrag>,
}

impl Board {
    #[must_use]
    pub fn new(sections: Vec<Section>, unassigned: Vec<Item>) -> Self {
        Self {
            sections,
            unassigned,
            last_updated: now(),
            active_drag: None,
        }
    }

    #[must_use]
    pub fn from_state(state: BoardState) -> Self {
        Self {
            sections: state.sections,
            unassigned: state.items,
            last_updated: state.last_updated,
            active_drag: None,
        }
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Members not assigned to any section.
    #[must_use]
    pub fn unassigned(&self) -> &[Item] {
        &self.unassigned
    }

    #[must_use]
    pub const fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    #[must_use]
    pub const fn active_drag(&self) -> Option<&ActiveDrag> {
        self.active_drag.as_ref()
    }

    #[must_use]
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Find a member and where it sits.
    #[must_use]
    pub fn find_item(&self, id: ItemId) -> Option<(Location, &Item)> {
        if let Some(item) = self.unassigned.iter().find(|item| item.id == id) {
            return Some((Location::Unassigned, item));
        }

        self.sections.iter().find_map(|section| {
            section
                .items
                .iter()
                .find(|item| item.id == id)
                .map(|item| (Location::Section(section.id.clone()), item))
        })
    }

    /// Snapshot of the board as sent in `INIT_STATE`.
    #[must_use]
    pub fn snapshot(&self) -> BoardState {
        BoardState {
            sections: self.sections.clone(),
            items: self.unassigned.clone(),
            last_updated: self.last_updated,
        }
    }

    /// The `DROP_UPDATE` describing the current board.
    #[must_use]
    pub fn drop_update(&self) -> BoardMessage {
        BoardMessage::drop_update(self.sections.clone(), self.unassigned.clone())
    }

    /// Fold an inbound message into the mirror.
    pub fn apply(&mut self, message: &BoardMessage) {
        match message {
            BoardMessage::InitState { state } => {
                *self = Self::from_state(state.clone());
            }
            BoardMessage::DropUpdate { sections, items } => {
                self.sections.clone_from(sections);
                self.unassigned.clone_from(items);
                self.last_updated = now();
                self.active_drag = None;
            }
            BoardMessage::DragUpdate { item, position } => {
                self.active_drag = Some(ActiveDrag {
                    item: item.clone(),
                    position: *position,
                });
            }
            BoardMessage::DragEnd => self.active_drag = None,
        }
    }

    /// Move a member to `to`, inserting it at `index` (clamped to the end).
    pub fn move_item(&mut self, id: ItemId, to: &Location, index: usize) -> Result<BoardMessage> {
        self.ensure_exists(to)?;
        let item = self.take_item(id)?;

        let target = self.items_mut(to)?;
        let index = index.min(target.len());
        target.insert(index, item);

        Ok(self.touch())
    }

    /// Add a new member at the end of `to`.
    pub fn add_item(&mut self, item: Item, to: &Location) -> Result<BoardMessage> {
        if self.find_item(item.id).is_some() {
            return Err(Error::validation(format!(
                "member {} is already on the board",
                item.id
            )));
        }

        self.items_mut(to)?.push(item);

        Ok(self.touch())
    }

    /// Remove a member from the board.
    pub fn remove_item(&mut self, id: ItemId) -> Result<BoardMessage> {
        self.take_item(id)?;

        Ok(self.touch())
    }

    fn ensure_exists(&self, location: &Location) -> Result<()> {
        match location {
            Location::Section(id) if self.section(id).is_none() => {
                Err(Error::validation(format!("unknown section `{id}`")))
            }
            _ => Ok(()),
        }
    }

    fn items_mut(&mut self, location: &Location) -> Result<&mut Vec<Item>> {
        match location {
            Location::Unassigned => Ok(&mut self.unassigned),
            Location::Section(id) => self
                .sections
                .iter_mut()
                .find(|section| &section.id == id)
                .map(|section| &mut section.items)
                .ok_or_else(|| Error::validation(format!("unknown section `{id}`"))),
        }
    }

    fn take_item(&mut self, id: ItemId) -> Result<Item> {
        let (location, _) = self
            .find_item(id)
            .ok_or_else(|| Error::validation(format!("unknown member {id}")))?;

        let items = self.items_mut(&location)?;
        let index = items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| Error::validation(format!("unknown member {id}")))?;

        Ok(items.remove(index))
    }

    fn touch(&mut self) -> BoardMessage {
        self.last_updated = now();
        self.drop_update()
    }
}

fn now() -> Timestamp {
    Utc::now().timestamp_millis()
}
