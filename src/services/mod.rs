// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod auction;
pub mod availability;
pub mod booking;
pub mod vaults;
