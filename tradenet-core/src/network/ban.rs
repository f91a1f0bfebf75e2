// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Ban list seam. Policy (who gets banned, for how long) is owned by the
//! peer-group layer; nodes only ask.

use std::collections::HashSet;

use parking_lot::RwLock;

use super::address::Address;

pub trait BanList: Send + Sync {
    fn is_banned(&self, address: &Address) -> bool;
}

/// Ban list that bans nobody.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBans;

impl BanList for NoBans {
    fn is_banned(&self, _address: &Address) -> bool {
        false
    }
}

/// Set of banned addresses.
#[derive(Debug, Default)]
pub struct BannedAddresses {
    banned: RwLock<HashSet<Address>>,
}

impl BannedAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&self, address: Address) {
        self.banned.write().insert(address);
    }

    pub fn unban(&self, address: &Address) -> bool {
        self.banned.write().remove(address)
    }
}

impl BanList for BannedAddresses {
    fn is_banned(&self, address: &Address) -> bool {
        self.banned.read().contains(address)
    }
}
