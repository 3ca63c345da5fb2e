//! Score data kept per audio channel when a node has
//! [`NodeFlags::HAS_SCORE_TRACK`](crate::NodeFlags::HAS_SCORE_TRACK).

/// A note on the score grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Note {
    /// Start position in ticks.
    pub x0: u32,
    /// End position in ticks (exclusive).
    pub x1: u32,
    /// Pad the note plays on.
    pub y: u32,
}

impl Note {
    /// Creates a note spanning `x0..x1` on pad `y`.
    pub fn new(x0: u32, x1: u32, y: u32) -> Self {
        Self { x0, x1, y }
    }
}

/// Notes of one audio channel, kept sorted by `(x0, y)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Notation {
    /// Audio channel this notation belongs to.
    pub audio_channel: usize,
    notes: Vec<Note>,
}

impl Notation {
    pub(crate) fn new(audio_channel: usize) -> Self {
        Self {
            audio_channel,
            notes: Vec::new(),
        }
    }

    /// Notes sorted by position.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub(crate) fn add(&mut self, note: Note) {
        let at = self
            .notes
            .partition_point(|n| (n.x0, n.y) <= (note.x0, note.y));
        self.notes.insert(at, note);
    }

    /// Removes one note equal to `note`. Returns `false` if none matched.
    pub(crate) fn remove(&mut self, note: Note) -> bool {
        match self.notes.iter().position(|n| *n == note) {
            Some(at) => {
                self.notes.remove(at);
                true
            }
            None => false,
        }
    }

    /// Drops every note whose pad is `pads` or above.
    pub(crate) fn truncate_pads(&mut self, pads: usize) {
        self.notes.retain(|n| (n.y as usize) < pads);
    }
}
