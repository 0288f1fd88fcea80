// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp::Ordering;

use crate::db::Database;
use crate::error::Fallible;
use crate::types::card::Card;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::timestamp::Timestamp;

/// Find the cards owned by `owner` that are due at `now`, most overdue first,
/// at most `limit` of them.
///
/// Never-reviewed cards come before everything else. Ties are broken by
/// creation time, then id, so repeated calls page identically.
pub fn select_due(
    db: &Database,
    owner: UserId,
    deck_ids: Option<&[DeckId]>,
    limit: usize,
    now: Timestamp,
) -> Fallible<Vec<Card>> {
    let mut due: Vec<Card> = db
        .owned_cards(owner, deck_ids)?
        .into_iter()
        .filter(|card| card.is_due(now))
        .collect();
    due.sort_by(due_order);
    due.truncate(limit);
    log::debug!("{} card(s) due for {}", due.len(), owner.short());
    Ok(due)
}

fn due_order(a: &Card, b: &Card) -> Ordering {
    // `None` sorts before `Some`, which puts never-reviewed cards first.
    a.next_review_at()
        .cmp(&b.next_review_at())
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
