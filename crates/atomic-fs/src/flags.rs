//! Milestone flags and pipeline stages persisted in the journal header.

use std::fmt;

bitflags::bitflags! {
    /// Bitmask of completed merge milestones, as stored on disk.
    ///
    /// Bits this revision does not know about are carried through every
    /// update untouched.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct MergeFlags: u32 {
        /// All new files are staged beside the destination.
        const COPIED_NEW = 0x1;
        /// Colliding destination entries were moved to their backup paths.
        const BACKED_OLD_UP = 0x2;
        /// Staged entries were renamed into place.
        const REPLACED = 0x4;
        /// The transaction is being undone.
        const ROLLBACK_STARTED = 0x8;

        // Future revisions may define more bits.
        const _ = !0;
    }
}

impl MergeFlags {
    const KNOWN: u32 = Self::COPIED_NEW.bits()
        | Self::BACKED_OLD_UP.bits()
        | Self::REPLACED.bits()
        | Self::ROLLBACK_STARTED.bits();

    /// Bits set that this revision does not interpret.
    pub const fn unknown_bits(self) -> u32 {
        self.bits() & !Self::KNOWN
    }
}

impl fmt::Display for MergeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .iter_names()
            .map(|(name, _)| name.to_string())
            .collect();
        if self.unknown_bits() != 0 {
            parts.push(format!("{:#x}", self.unknown_bits()));
        }
        if parts.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

/// Coarse pipeline phase that last made progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    #[default]
    CopyNew = 0,
    BackupOld = 1,
    Replace = 2,
    Cleanup = 3,
}

impl Stage {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CopyNew),
            1 => Some(Self::BackupOld),
            2 => Some(Self::Replace),
            3 => Some(Self::Cleanup),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CopyNew => "copy-new",
            Self::BackupOld => "backup-old",
            Self::Replace => "replace",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merge transaction state, derived from the persisted flags alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeState {
    /// Nothing done yet (or only a partial copy-new).
    Fresh,
    /// Staging complete; old entries not yet moved aside.
    CopiedNew,
    /// Old entries moved aside; ready to replace.
    BackedOldUp,
    /// New tree in place; only cleanup remains.
    Replaced,
    /// A rollback is in progress and must be finished.
    RollingBack,
}

impl MergeState {
    pub fn from_flags(flags: MergeFlags) -> Self {
        if flags.contains(MergeFlags::ROLLBACK_STARTED) {
            Self::RollingBack
        } else if flags.contains(MergeFlags::REPLACED) {
            Self::Replaced
        } else if flags.contains(MergeFlags::COPIED_NEW | MergeFlags::BACKED_OLD_UP) {
            Self::BackedOldUp
        } else if flags.contains(MergeFlags::COPIED_NEW) {
            Self::CopiedNew
        } else {
            Self::Fresh
        }
    }
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fresh => "fresh",
            Self::CopiedNew => "new files copied",
            Self::BackedOldUp => "old files backed up",
            Self::Replaced => "files replaced",
            Self::RollingBack => "rolling back",
        };
        write!(f, "{name}")
    }
}
