//! Classifies freshly fetched listings against persisted state.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::entity::Listing;
use crate::entity::ListingUpsert;
use crate::entity::RawListing;

/// How listings unknown to the store are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Unknown listings are new and eligible for notification.
    Incremental,
    /// Unknown listings are recorded silently. Used by full-catalogue cycles so a
    /// broadened crawl does not flood users with old listings.
    Baseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Recorded without notification.
    Baseline,
    New,
    PriceChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOp {
    pub kind: ChangeKind,
    pub listing: ListingUpsert,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Incremental diff of one subscription's fetch against its stored listings.
    pub fn diff(
        &self,
        subscription_id: &str,
        existing: &[Listing],
        fetched: &[RawListing],
    ) -> Vec<UpsertOp> {
        self.diff_with(subscription_id, existing, fetched, DiffMode::Incremental)
    }

    /// Produces the upserts needed to bring the store in line with `fetched`.
    ///
    /// A subscription without stored listings is on its first sync: everything is recorded
    /// with `needs_send = false`. Unchanged listings produce no operation, so applying the
    /// result and diffing again yields nothing. A listing id repeated within `fetched` is
    /// only considered at its first occurrence.
    pub fn diff_with(
        &self,
        subscription_id: &str,
        existing: &[Listing],
        fetched: &[RawListing],
        mode: DiffMode,
    ) -> Vec<UpsertOp> {
        let first_sync = existing.is_empty();
        let known: HashMap<&str, &Listing> = existing
            .iter()
            .map(|l| (l.listing_id.as_str(), l))
            .collect();
        let mut seen = HashSet::new();
        let mut ops = Vec::new();

        for raw in fetched {
            if !seen.insert(raw.id.as_str()) {
                continue;
            }

            let mut upsert = ListingUpsert::from_raw(subscription_id, raw);
            let kind = match known.get(raw.id.as_str()) {
                None if first_sync || mode == DiffMode::Baseline => ChangeKind::Baseline,
                None => {
                    upsert.needs_send = true;
                    ChangeKind::New
                }
                Some(prev) if prev.last_known_price() == raw.price => continue,
                Some(prev) => {
                    upsert.price = prev.price.clone();
                    upsert.new_price = Some(raw.price.clone());
                    upsert.needs_send = true;
                    ChangeKind::PriceChanged
                }
            };
            ops.push(UpsertOp {
                kind,
                listing: upsert,
            });
        }

        ops
    }
}
