use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::NodeBridgeError;

bitflags! {
    /// Per-request fetch behaviour: prefetch strategy plus reporting options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct FetchFlags: u32 {
        /// Walk parent links upward from the result.
        const PREFETCH_ANCESTORS = 1 << 0;
        /// Fetch the parent and the result's siblings.
        const PREFETCH_SIBLINGS = 1 << 1;
        /// Direct children, descending only through provider-backed children.
        const PREFETCH_DESCENDANTS_HYBRID = 1 << 2;
        /// Full descendant traversal, depth-first.
        const PREFETCH_DESCENDANTS_DEPTH_FIRST = 1 << 3;
        /// Full descendant traversal, breadth-first.
        const PREFETCH_DESCENDANTS_BREADTH_FIRST = 1 << 4;
        /// Prefetch may not be cut short by queued work.
        const PREFETCH_UNINTERRUPTIBLE = 1 << 5;
        /// Include nodes not considered important.
        const INCLUDE_NOT_IMPORTANT = 1 << 7;
        /// Report resource-style view tags on snapshots.
        const REPORT_VIEW_IDS = 1 << 8;
        /// Caller is a trusted tool and may see data-sensitive nodes.
        const ACCESSIBILITY_TOOL = 1 << 9;

        const PREFETCH_DESCENDANTS_MASK = Self::PREFETCH_DESCENDANTS_HYBRID.bits()
            | Self::PREFETCH_DESCENDANTS_DEPTH_FIRST.bits()
            | Self::PREFETCH_DESCENDANTS_BREADTH_FIRST.bits();
        const PREFETCH_MASK = Self::PREFETCH_ANCESTORS.bits()
            | Self::PREFETCH_SIBLINGS.bits()
            | Self::PREFETCH_DESCENDANTS_MASK.bits();
        /// Bits that change what a snapshot contains.
        const REPORT_MASK = Self::INCLUDE_NOT_IMPORTANT.bits()
            | Self::REPORT_VIEW_IDS.bits()
            | Self::ACCESSIBILITY_TOOL.bits();
    }
}

impl FetchFlags {
    /// Only the prefetch strategy bits.
    pub fn strategy(self) -> FetchFlags {
        self & FetchFlags::PREFETCH_MASK
    }

    /// Only the bits that affect reported data.
    pub fn report_bits(self) -> FetchFlags {
        self & FetchFlags::REPORT_MASK
    }

    pub fn is_interruptible(self) -> bool {
        !self.contains(FetchFlags::PREFETCH_UNINTERRUPTIBLE)
    }

    /// Two requests can share a snapshot only if their report bits agree.
    pub fn reports_like(self, other: FetchFlags) -> bool {
        self.report_bits() == other.report_bits()
    }

    /// Reject combinations that cannot be honoured.
    pub fn validate(self) -> Result<(), NodeBridgeError> {
        let both = FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST
            | FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST;
        if self.contains(both) {
            return Err(NodeBridgeError::ConflictingStrategies(self.strategy()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_and_breadth_first_conflict() {
        let flags = FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST
            | FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST;
        assert!(flags.validate().is_err());
        assert!(FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST
            .union(FetchFlags::PREFETCH_ANCESTORS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_report_compatibility_ignores_strategy() {
        let a = FetchFlags::PREFETCH_SIBLINGS | FetchFlags::REPORT_VIEW_IDS;
        let b = FetchFlags::PREFETCH_ANCESTORS | FetchFlags::REPORT_VIEW_IDS;
        let c = FetchFlags::PREFETCH_ANCESTORS | FetchFlags::INCLUDE_NOT_IMPORTANT;
        assert!(a.reports_like(b));
        assert!(!a.reports_like(c));
    }

    #[test]
    fn test_interruptible_by_default() {
        assert!(FetchFlags::empty().is_interruptible());
        assert!(!FetchFlags::PREFETCH_UNINTERRUPTIBLE.is_interruptible());
    }
}
