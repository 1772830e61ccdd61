//! Out-of-band, timestamped text annotations.
//!
//! Users inject free-text comments alongside the document stream. Each
//! serializer owns a `CommentBank` with one bucket per document kind; the
//! bank is drained into the output when a run is written and anything added
//! afterwards waits for the next run. The target serializer is always passed
//! explicitly; there is no ambient "current serializer".

use chrono::{DateTime, Local};

/// Which lifecycle slot a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentSlot {
    Start,
    Descriptor,
    Event,
    Resource,
    Datum,
    Stop,
}

impl CommentSlot {
    pub const ALL: [CommentSlot; 6] = [
        CommentSlot::Start,
        CommentSlot::Descriptor,
        CommentSlot::Event,
        CommentSlot::Resource,
        CommentSlot::Datum,
        CommentSlot::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSlot::Start => "start",
            CommentSlot::Descriptor => "descriptor",
            CommentSlot::Event => "event",
            CommentSlot::Resource => "resource",
            CommentSlot::Datum => "datum",
            CommentSlot::Stop => "stop",
        }
    }
}

/// One single-line annotation with its submission time.
#[derive(Debug, Clone)]
pub struct Comment {
    pub time: DateTime<Local>,
    pub text: String,
}

/// Per-document-kind comment buckets.
#[derive(Debug, Clone, Default)]
pub struct CommentBank {
    start: Vec<Comment>,
    descriptor: Vec<Comment>,
    event: Vec<Comment>,
    resource: Vec<Comment>,
    datum: Vec<Comment>,
    stop: Vec<Comment>,
}

impl CommentBank {
    fn bucket_mut(&mut self, slot: CommentSlot) -> &mut Vec<Comment> {
        match slot {
            CommentSlot::Start => &mut self.start,
            CommentSlot::Descriptor => &mut self.descriptor,
            CommentSlot::Event => &mut self.event,
            CommentSlot::Resource => &mut self.resource,
            CommentSlot::Datum => &mut self.datum,
            CommentSlot::Stop => &mut self.stop,
        }
    }

    pub fn bucket(&self, slot: CommentSlot) -> &[Comment] {
        match slot {
            CommentSlot::Start => &self.start,
            CommentSlot::Descriptor => &self.descriptor,
            CommentSlot::Event => &self.event,
            CommentSlot::Resource => &self.resource,
            CommentSlot::Datum => &self.datum,
            CommentSlot::Stop => &self.stop,
        }
    }

    /// Add a comment, stamped now. Multi-line input is split so the
    /// one-line-per-comment invariant of the downstream formats holds.
    pub fn push(&mut self, slot: CommentSlot, text: &str) {
        let now = Local::now();
        let bucket = self.bucket_mut(slot);
        for line in text.lines() {
            bucket.push(Comment {
                time: now,
                text: line.to_string(),
            });
        }
    }

    /// Remove and return the comments in one slot, oldest first.
    pub fn drain(&mut self, slot: CommentSlot) -> Vec<Comment> {
        std::mem::take(self.bucket_mut(slot))
    }

    pub fn clear(&mut self) {
        for slot in CommentSlot::ALL {
            self.bucket_mut(slot).clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        CommentSlot::ALL.iter().all(|s| self.bucket(*s).is_empty())
    }
}

/// Default slot for a comment with no explicit slot: `Event` while a run is
/// scanning, `Start` otherwise (it will open the next run's block).
pub fn default_slot(scanning: bool) -> CommentSlot {
    if scanning {
        CommentSlot::Event
    } else {
        CommentSlot::Start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_split() {
        let mut bank = CommentBank::default();
        bank.push(CommentSlot::Event, "first line\nsecond line");
        let drained = bank.drain(CommentSlot::Event);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].text, "first line");
        assert_eq!(drained[1].text, "second line");
        assert!(bank.is_empty());
    }

    #[test]
    fn test_default_slot_follows_scanning_state() {
        assert_eq!(default_slot(true), CommentSlot::Event);
        assert_eq!(default_slot(false), CommentSlot::Start);
    }

    #[test]
    fn test_drain_leaves_other_slots() {
        let mut bank = CommentBank::default();
        bank.push(CommentSlot::Start, "hello");
        bank.push(CommentSlot::Stop, "goodbye");
        assert_eq!(bank.drain(CommentSlot::Start).len(), 1);
        assert_eq!(bank.bucket(CommentSlot::Stop).len(), 1);
    }
}
