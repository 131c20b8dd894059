//! The host shell's tri-state call convention.
//!
//! Success means "participate", failure means "decline", and anything
//! indeterminate (panic, bad arguments, uninitialized runtime) is treated by
//! the shell as a decline. No richer error ever crosses this boundary.

use emblem_core::Membership;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ShellVerdict {
    /// Participate: paint the badge.
    Participate = 0,
    /// Decline: no badge from this provider.
    Decline = 1,
    /// Could not answer; the shell treats this as a decline.
    Indeterminate = -1,
}

impl ShellVerdict {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<Membership> for ShellVerdict {
    fn from(membership: Membership) -> Self {
        match membership {
            Membership::Member => ShellVerdict::Participate,
            Membership::NotMember => ShellVerdict::Decline,
        }
    }
}
