//! Pure operations over a product's reservation ledger.
//!
//! Every mutation here produces a complete replacement array for the ledger:
//! the catalog store persists it in one guarded write. The ledger is only
//! ever appended to, replaced per holder, or filtered, never reordered.

use chrono::{DateTime, Utc};
use common::HolderId;
use store::Reservation;

/// Returns the entries that have not lapsed at `now`.
pub fn live_entries(entries: &[Reservation], now: DateTime<Utc>) -> Vec<Reservation> {
    entries.iter().filter(|r| r.is_live(now)).cloned().collect()
}

/// Returns the holder's live entry, if any.
pub fn entry_for<'a>(
    entries: &'a [Reservation],
    holder: &HolderId,
    now: DateTime<Utc>,
) -> Option<&'a Reservation> {
    entries
        .iter()
        .find(|r| &r.holder_id == holder && r.is_live(now))
}

/// Replaces (or appends) the holder's entry, dropping lapsed entries.
///
/// Upholds the one-live-entry-per-holder invariant: duplicate live entries
/// for the holder collapse into the new one. Expired entries of other holders
/// are dropped too, since this write touches the document anyway.
pub fn upsert(
    entries: &[Reservation],
    holder: &HolderId,
    quantity: u32,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<Reservation> {
    let mut result = Vec::with_capacity(entries.len() + 1);
    let mut replaced = false;
    for entry in entries {
        if !entry.is_live(now) {
            continue;
        }
        if &entry.holder_id == holder {
            if !replaced {
                result.push(Reservation::new(holder.clone(), quantity, expires_at));
                replaced = true;
            }
        } else {
            result.push(entry.clone());
        }
    }
    if !replaced {
        result.push(Reservation::new(holder.clone(), quantity, expires_at));
    }
    result
}

/// Drops every entry belonging to the holder, lapsed or not.
pub fn without_holder(entries: &[Reservation], holder: &HolderId) -> Vec<Reservation> {
    entries
        .iter()
        .filter(|r| &r.holder_id != holder)
        .cloned()
        .collect()
}

/// Drops every lapsed entry.
pub fn without_expired(entries: &[Reservation], now: DateTime<Utc>) -> Vec<Reservation> {
    entries.iter().filter(|r| r.is_live(now)).cloned().collect()
}
