// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 The cheki-engine authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine policy knobs.

use chrono::Duration;

/// Tunable policies for the engine.
///
/// The defaults match venue practice: a five-minute window to undo a
/// mis-scanned ticket, a two-second bound on order-lock acquisition before
/// the caller is told to back off and retry, and a thirty-minute horizon
/// after which an unsettled checkout is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// How long after `used_at` a ticket-use may still be undone.
    pub undo_window: Duration,
    /// Bound on waiting for a single order's lock; breaching it is reported
    /// as `StorageContention`, never as a stock or lifecycle outcome.
    pub lock_timeout: std::time::Duration,
    /// Age past which an order still in PENDING is swept to VOID.
    pub pending_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            undo_window: Duration::minutes(5),
            lock_timeout: std::time::Duration::from_secs(2),
            pending_ttl: Duration::minutes(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policies() {
        let config = EngineConfig::default();
        assert_eq!(config.undo_window, Duration::minutes(5));
        assert_eq!(config.lock_timeout, std::time::Duration::from_secs(2));
        assert_eq!(config.pending_ttl, Duration::minutes(30));
    }
}
