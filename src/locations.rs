//! Location index: a coarse, fixed-granularity split of the publication's
//! text into numbered, navigable positions.

use crate::models::Position;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationIndex {
    starts: Vec<Position>,
}

impl LocationIndex {
    /// One location every `chars_per_location` characters of each chapter.
    /// Every chapter gets at least one location, even when it has no text.
    pub fn generate(chapter_lengths: &[usize], chars_per_location: usize) -> Self {
        let step = chars_per_location.max(1);
        let mut starts = Vec::new();
        for (spine_index, &len) in chapter_lengths.iter().enumerate() {
            let mut offset = 0;
            loop {
                starts.push(Position::new(spine_index, offset));
                offset += step;
                if offset >= len {
                    break;
                }
            }
        }
        Self { starts }
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// 1-based location containing `position`.
    pub fn location_from_position(&self, position: &Position) -> Option<usize> {
        let count = self.starts.partition_point(|start| start <= position);
        (count > 0).then_some(count)
    }

    pub fn position_from_location(&self, location: usize) -> Option<Position> {
        location
            .checked_sub(1)
            .and_then(|index| self.starts.get(index))
            .copied()
    }
}
