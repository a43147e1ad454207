//! Persistence state flags and the band-to-dataset capability.

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Persistence state of a dataset's auxiliary metadata.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PamFlags: u32 {
        /// In-memory metadata differs from the sidecar; write on flush.
        const DIRTY = 0x01;
        /// A load was attempted and failed; do not retry unless forced.
        const TRIED_READ_FAILED = 0x02;
        /// PAM is off for this dataset: no load, no save, no dirtying.
        const DISABLED = 0x04;
        /// Never write the sidecar.
        const NO_SAVE = 0x10;
        /// The last save attempt failed; cleared by the next mutation.
        const SAVE_ATTEMPT_FAILED = 0x100;
    }
}

/// What a band may see of its owning dataset.
///
/// Bands hold this as a `Weak` reference so the dataset owns its bands
/// without a reference cycle.
pub trait PamParent: Send + Sync {
    /// Record that metadata diverged from disk.
    fn mark_dirty(&self);

    /// Current persistence flags.
    fn flags(&self) -> PamFlags;
}

/// Atomically updated flag set shared between a dataset and its bands.
#[derive(Debug, Default)]
pub struct PamFlagCell {
    bits: AtomicU32,
}

impl PamFlagCell {
    /// Create a cell holding `flags`.
    pub fn new(flags: PamFlags) -> Self {
        Self {
            bits: AtomicU32::new(flags.bits()),
        }
    }

    /// Current flags.
    #[inline]
    pub fn get(&self) -> PamFlags {
        PamFlags::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    /// Replace all flags.
    #[inline]
    pub fn set(&self, flags: PamFlags) {
        self.bits.store(flags.bits(), Ordering::Release);
    }

    /// Set the given flags.
    #[inline]
    pub fn insert(&self, flags: PamFlags) {
        self.bits.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    /// Clear the given flags.
    #[inline]
    pub fn remove(&self, flags: PamFlags) {
        self.bits.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Check whether all given flags are set.
    #[inline]
    pub fn contains(&self, flags: PamFlags) -> bool {
        self.get().contains(flags)
    }
}

impl PamParent for PamFlagCell {
    fn mark_dirty(&self) {
        if self.contains(PamFlags::DISABLED) {
            return;
        }
        self.insert(PamFlags::DIRTY);
        // a fresh mutation re-arms saving after a failed write
        self.remove(PamFlags::SAVE_ATTEMPT_FAILED);
    }

    fn flags(&self) -> PamFlags {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Weak};

    #[test]
    fn test_mark_dirty_rearms_save() {
        let cell = PamFlagCell::default();
        cell.insert(PamFlags::SAVE_ATTEMPT_FAILED);
        cell.mark_dirty();
        assert!(cell.contains(PamFlags::DIRTY));
        assert!(!cell.contains(PamFlags::SAVE_ATTEMPT_FAILED));

        cell.mark_dirty();
        assert_eq!(cell.get(), PamFlags::DIRTY);
    }

    #[test]
    fn test_disabled_never_dirty() {
        let cell = PamFlagCell::new(PamFlags::DISABLED);
        cell.mark_dirty();
        assert!(!cell.contains(PamFlags::DIRTY));
    }

    #[test]
    fn test_weak_capability() {
        let cell = Arc::new(PamFlagCell::default());
        let parent: Weak<dyn PamParent> = Arc::downgrade(&cell) as Weak<dyn PamParent>;
        parent.upgrade().unwrap().mark_dirty();
        assert!(cell.contains(PamFlags::DIRTY));

        drop(cell);
        assert!(parent.upgrade().is_none());
    }
}
