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

//! The in-memory card order for one study session.
//!
//! Every answered card goes back into the queue, closer to the front the
//! worse it was rated. This is independent of the persisted SM-2 interval:
//! a card rated Again shows up again a couple of cards later, even though
//! its stored schedule says "tomorrow".

use std::collections::HashMap;
use std::ops::RangeInclusive;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::types::card::Card;
use crate::types::ids::CardId;
use crate::types::rating::Rating;

/// How far behind the new head a rated card is reinserted.
pub fn requeue_window(rating: Rating) -> RangeInclusive<usize> {
    match rating {
        Rating::Again => 1..=2,
        Rating::Hard => 2..=4,
        Rating::Good => 5..=8,
        Rating::Easy => 10..=15,
    }
}

/// Tally of the answers given in a session.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize)]
pub struct SessionStats {
    pub again: usize,
    pub hard: usize,
    pub good: usize,
    pub easy: usize,
}

impl SessionStats {
    pub fn record(&mut self, rating: Rating) {
        match rating {
            Rating::Again => self.again += 1,
            Rating::Hard => self.hard += 1,
            Rating::Good => self.good += 1,
            Rating::Easy => self.easy += 1,
        }
    }

    pub fn answered(&self) -> usize {
        self.again + self.hard + self.good + self.easy
    }
}

pub struct SessionQueue<R: Rng = StdRng> {
    cards: Vec<Card>,
    rng: R,
    stats: SessionStats,
    /// The most recent rating given to each card this session.
    latest: HashMap<CardId, Rating>,
    /// The number of distinct cards the session started with.
    total: usize,
}

impl SessionQueue<StdRng> {
    /// A queue whose shuffle and reinsertion offsets are fully determined
    /// by `seed`.
    pub fn seeded(cards: Vec<Card>, seed: u64) -> Self {
        Self::new(cards, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> SessionQueue<R> {
    /// Start a session over `cards`, uniformly shuffled.
    pub fn new(mut cards: Vec<Card>, mut rng: R) -> Self {
        cards.shuffle(&mut rng);
        let total = cards.len();
        Self {
            cards,
            rng,
            stats: SessionStats::default(),
            latest: HashMap::new(),
            total,
        }
    }

    /// The card to present now, or `None` once the session is complete.
    pub fn current(&self) -> Option<&Card> {
        self.cards.first()
    }

    /// Record `rating` for the current card, and move it back into the
    /// queue at a random offset from `requeue_window`, clamped to the end.
    ///
    /// Returns the card's new index, or `None` if the queue is empty.
    pub fn advance(&mut self, rating: Rating) -> Option<usize> {
        if self.cards.is_empty() {
            return None;
        }
        let card = self.cards.remove(0);
        let offset = self.rng.gen_range(requeue_window(rating));
        let index = offset.min(self.cards.len());
        self.stats.record(rating);
        self.latest.insert(card.id, rating);
        self.cards.insert(index, card);
        Some(index)
    }

    /// True once every card in the session has been answered, and its most
    /// recent answer was Good or Easy.
    pub fn is_settled(&self) -> bool {
        self.latest.len() == self.total && self.latest.values().all(|r| r.is_passing())
    }

    /// End the session: the queue is emptied and the tally returned.
    pub fn finish(&mut self) -> SessionStats {
        self.cards.clear();
        self.stats
    }

    #[cfg(test)]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Distinct cards answered at least once.
    pub fn seen(&self) -> usize {
        self.latest.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::types::ids::DeckId;
    use crate::types::timestamp::Timestamp;

    fn cards(n: usize) -> Vec<Card> {
        let deck = DeckId::new();
        let now = Timestamp::now();
        (0..n)
            .map(|i| Card::new(deck, format!("Q{i}"), format!("A{i}"), now))
            .collect()
    }

    fn ids(queue: &SessionQueue) -> Vec<CardId> {
        queue.cards.iter().map(|c| c.id).collect()
    }

    #[test]
    fn test_empty_session_is_complete() {
        let mut queue = SessionQueue::seeded(Vec::new(), 1);
        assert!(queue.current().is_none());
        assert_eq!(queue.advance(Rating::Good), None);
        assert_eq!(queue.stats().answered(), 0);
    }

    #[test]
    fn test_shuffle_is_a_permutation() {
        let input = cards(20);
        let queue = SessionQueue::seeded(input.clone(), 7);
        let before: HashSet<CardId> = input.iter().map(|c| c.id).collect();
        let after: HashSet<CardId> = ids(&queue).into_iter().collect();
        assert_eq!(queue.len(), 20);
        assert_eq!(before, after);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let input = cards(20);
        let mut a = SessionQueue::seeded(input.clone(), 42);
        let mut b = SessionQueue::seeded(input, 42);
        assert_eq!(ids(&a), ids(&b));
        for rating in [Rating::Again, Rating::Easy, Rating::Hard, Rating::Good] {
            assert_eq!(a.advance(rating), b.advance(rating));
        }
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_shuffle_changes_order() {
        // With 20 cards, some seed in a handful must move something.
        let input = cards(20);
        let original: Vec<CardId> = input.iter().map(|c| c.id).collect();
        let moved = (0..5).any(|seed| ids(&SessionQueue::seeded(input.clone(), seed)) != original);
        assert!(moved);
    }

    #[test]
    fn test_reinsertion_bounds() {
        for rating in Rating::ALL {
            for seed in 0..200 {
                let mut queue = SessionQueue::seeded(cards(10), seed);
                let head = queue.current().unwrap().id;
                let index = queue.advance(rating).unwrap();
                let window = requeue_window(rating);
                let lo = (*window.start()).min(9);
                let hi = (*window.end()).min(9);
                assert!(lo <= index && index <= hi, "{rating:?} {index}");
                assert_eq!(queue.cards[index].id, head);
                assert_eq!(queue.len(), 10);
            }
        }
    }

    #[test]
    fn test_again_comes_back_soon() {
        for seed in 0..50 {
            let mut queue = SessionQueue::seeded(cards(10), seed);
            let index = queue.advance(Rating::Again).unwrap();
            assert!(index == 1 || index == 2);
        }
    }

    #[test]
    fn test_easy_is_clamped_to_end() {
        for seed in 0..50 {
            let mut queue = SessionQueue::seeded(cards(10), seed);
            let head = queue.current().unwrap().id;
            assert_eq!(queue.advance(Rating::Easy), Some(9));
            assert_eq!(queue.cards.last().unwrap().id, head);
        }
    }

    #[test]
    fn test_every_offset_is_reachable() {
        let mut seen = HashSet::new();
        for seed in 0..500 {
            let mut queue = SessionQueue::seeded(cards(30), seed);
            seen.insert(queue.advance(Rating::Good).unwrap());
        }
        assert_eq!(seen, (5..=8).collect());
    }

    #[test]
    fn test_single_card_session() {
        let mut queue = SessionQueue::seeded(cards(1), 3);
        let head = queue.current().unwrap().id;
        assert_eq!(queue.advance(Rating::Easy), Some(0));
        assert_eq!(queue.current().unwrap().id, head);
    }

    #[test]
    fn test_other_cards_keep_relative_order() {
        let mut queue = SessionQueue::seeded(cards(12), 9);
        let before = ids(&queue);
        let index = queue.advance(Rating::Hard).unwrap();
        let mut after = ids(&queue);
        after.remove(index);
        assert_eq!(after, before[1..].to_vec());
    }

    #[test]
    fn test_settled() {
        let mut queue = SessionQueue::seeded(cards(2), 5);
        assert!(!queue.is_settled());
        queue.advance(Rating::Good);
        assert!(!queue.is_settled());
        queue.advance(Rating::Again);
        assert!(!queue.is_settled());
        // Answer whatever comes up until both are good.
        for _ in 0..4 {
            queue.advance(Rating::Good);
        }
        assert!(queue.is_settled());
        assert_eq!(queue.seen(), 2);
    }

    #[test]
    fn test_stats_and_finish() {
        let mut queue = SessionQueue::seeded(cards(5), 11);
        for rating in [Rating::Again, Rating::Again, Rating::Hard, Rating::Easy] {
            queue.advance(rating);
        }
        let stats = queue.finish();
        assert_eq!(
            stats,
            SessionStats {
                again: 2,
                hard: 1,
                good: 0,
                easy: 1,
            }
        );
        assert_eq!(stats.answered(), 4);
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert_eq!(queue.total(), 5);
    }
}
