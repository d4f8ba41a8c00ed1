//! Smooth weighted round-robin selection.

#[derive(Debug, Clone)]
struct Slot<T> {
    item: T,
    weight: i64,
    current: i64,
}

/// Cycles through items proportionally to their integer weights, spreading
/// each item's turns evenly instead of clustering them.
///
/// Over any `total_weight()` consecutive calls every item is returned exactly
/// `weight` times. Items with weight 0 are never returned.
#[derive(Debug, Clone)]
pub struct SmoothWeighted<T> {
    slots: Vec<Slot<T>>,
    total: i64,
}

impl<T> Default for SmoothWeighted<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            total: 0,
        }
    }
}

impl<T> SmoothWeighted<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: T, weight: u32) {
        if weight == 0 {
            return;
        }
        let weight = i64::from(weight);
        self.total += weight;
        self.slots.push(Slot {
            item,
            weight,
            current: 0,
        });
    }

    pub fn total_weight(&self) -> i64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Next item, `None` when nothing has a positive weight.
    pub fn next(&mut self) -> Option<&T> {
        for slot in &mut self.slots {
            slot.current += slot.weight;
        }
        let (idx, _) = self
            .slots
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, i64)>, (idx, slot)| match best {
                Some((_, current)) if slot.current <= current => best,
                _ => Some((idx, slot.current)),
            })?;
        let slot = &mut self.slots[idx];
        slot.current -= self.total;
        Some(&slot.item)
    }

    /// Reset every slot's running weight.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.current = 0;
        }
    }
}
