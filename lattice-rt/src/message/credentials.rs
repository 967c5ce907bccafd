// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Userid placeholder meaning "not authenticated yet".
///
/// Messages arriving from a module with this userid have their credentials
/// repaired from the connection defaults before the broker sees them.
pub const USERID_UNKNOWN: u32 = u32::MAX;

bitflags! {
    /// Role bits carried in message credentials.
    ///
    /// `OWNER` marks the instance owner; intra-broker endpoint connections
    /// always carry it, which is what entitles a module to stamp credentials
    /// on messages it sends on behalf of other users.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RoleMask: u32 {
        /// Instance owner.
        const OWNER = 1;
        /// Authenticated guest user.
        const USER = 2;
        /// Local (same-node) connection.
        const LOCAL = 4;
    }
}

/// The (userid, role-mask) pair carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Numeric user id of the message originator.
    pub userid: u32,
    /// Role bits granted to the originator.
    pub rolemask: RoleMask,
}

impl Credentials {
    /// Credentials of a message whose origin has not been authenticated.
    pub fn unknown() -> Self {
        Self {
            userid: USERID_UNKNOWN,
            rolemask: RoleMask::empty(),
        }
    }

    /// Default credentials for an intra-broker endpoint connection.
    ///
    /// The connection is point to point between broker threads, so the
    /// credentials are always those of the instance owner.
    pub fn instance_owner() -> Self {
        Self {
            userid: instance_uid(),
            rolemask: RoleMask::OWNER | RoleMask::LOCAL,
        }
    }

    /// True if the userid is the unauthenticated placeholder.
    pub fn userid_is_unknown(&self) -> bool {
        self.userid == USERID_UNKNOWN
    }

    /// True if the role mask contains `role`.
    pub fn has_role(&self, role: RoleMask) -> bool {
        self.rolemask.contains(role)
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(unix)]
fn instance_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}

#[cfg(not(unix))]
fn instance_uid() -> u32 {
    0
}
