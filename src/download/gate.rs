//! Local availability check run before a download.
//!
//! Only decides what to tell the user; the server's answer always wins.

use std::fmt;

use crate::api::FileDescriptor;

/// Whether a file can be downloaded, and why not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Expired,
    LimitReached,
}

impl Availability {
    /// Evaluate the descriptor fields the server reports
    pub fn evaluate(is_expired: bool, max_downloads: i64, download_count: i64) -> Self {
        if is_expired {
            Availability::Expired
        } else if max_downloads > 0 && download_count >= max_downloads {
            Availability::LimitReached
        } else {
            Availability::Available
        }
    }

    pub fn of(descriptor: &FileDescriptor) -> Self {
        Self::evaluate(
            descriptor.is_expired,
            descriptor.meta_data.max_downloads,
            descriptor.meta_data.download_count,
        )
    }

    pub fn is_allowed(self) -> bool {
        self == Availability::Available
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => f.write_str("Available"),
            Availability::Expired => f.write_str("File has expired"),
            Availability::LimitReached => f.write_str("Download limit reached"),
        }
    }
}

/// `!expired && (max <= 0 || count < max)`
pub fn allowed(descriptor: &FileDescriptor) -> bool {
    Availability::of(descriptor).is_allowed()
}
