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

//! Applying a batch of ratings to stored cards.
//!
//! A batch is one unit of work: either every entry is applied, or nothing
//! is. Unknown card ids are skipped. A card whose deck or course is missing,
//! or whose course belongs to someone else, aborts the whole batch.

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail_with;
use crate::sm2;
use crate::types::card::Card;
use crate::types::card::Course;
use crate::types::card::Deck;
use crate::types::card::ReviewEntry;
use crate::types::ids::CardId;
use crate::types::ids::CourseId;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::rating::Rating;
use crate::types::timestamp::Timestamp;

/// A transactional handle onto the card store. Everything written through
/// it becomes visible on `commit`, and is discarded on `rollback`.
pub trait UnitOfWork {
    fn load_card(&mut self, card_id: CardId) -> Fallible<Option<Card>>;

    fn load_deck(&mut self, deck_id: DeckId) -> Fallible<Option<Deck>>;

    fn load_course(&mut self, course_id: CourseId) -> Fallible<Option<Course>>;

    /// Persist the card's scheduling fields and append `entry` to its
    /// review log.
    fn save_review(&mut self, card: &Card, entry: &ReviewEntry) -> Fallible<()>;

    fn commit(self) -> Fallible<()>;

    fn rollback(self) -> Fallible<()>;
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub card_id: CardId,
    pub rating: Rating,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardResult {
    pub card_id: CardId,
    pub repetition: u32,
    pub interval: u32,
    pub ease_factor: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewSummary {
    /// The number of cards actually updated.
    pub updated: usize,
    pub results: Vec<CardResult>,
}

/// What happened to a single entry of a batch.
enum Outcome {
    Applied(CardResult),
    SkippedNotFound(CardId),
    Fatal(ErrorReport),
}

/// Apply `batch` on behalf of `owner`, committing `uow` only if no entry
/// fails. On failure the unit of work is rolled back and the first fatal
/// error is returned.
pub fn apply_reviews<U: UnitOfWork>(
    mut uow: U,
    owner: UserId,
    batch: &[ReviewRequest],
    now: Timestamp,
) -> Fallible<ReviewSummary> {
    if batch.is_empty() {
        uow.rollback()?;
        return fail_with(ErrorKind::Validation, "reviews array required");
    }

    let folded: Fallible<Vec<CardResult>> =
        batch.iter().try_fold(Vec::new(), |mut results, request| {
            match apply_entry(&mut uow, owner, request, now) {
                Outcome::Applied(result) => {
                    results.push(result);
                    Ok(results)
                }
                Outcome::SkippedNotFound(card_id) => {
                    log::debug!("Skipping unknown card {card_id}");
                    Ok(results)
                }
                Outcome::Fatal(err) => Err(err),
            }
        });

    match folded {
        Ok(results) => {
            uow.commit()?;
            log::info!("Committed {} review(s) for {}", results.len(), owner.short());
            Ok(ReviewSummary {
                updated: results.len(),
                results,
            })
        }
        Err(err) => {
            log::warn!("Rolling back review batch: {}", err.message());
            uow.rollback()?;
            Err(err)
        }
    }
}

fn apply_entry<U: UnitOfWork>(
    uow: &mut U,
    owner: UserId,
    request: &ReviewRequest,
    now: Timestamp,
) -> Outcome {
    match try_apply_entry(uow, owner, request, now) {
        Ok(Some(result)) => Outcome::Applied(result),
        Ok(None) => Outcome::SkippedNotFound(request.card_id),
        Err(err) => Outcome::Fatal(err),
    }
}

/// `Ok(None)` means the card does not exist.
fn try_apply_entry<U: UnitOfWork>(
    uow: &mut U,
    owner: UserId,
    request: &ReviewRequest,
    now: Timestamp,
) -> Fallible<Option<CardResult>> {
    let Some(mut card) = uow.load_card(request.card_id)? else {
        return Ok(None);
    };
    let Some(deck) = uow.load_deck(card.deck_id)? else {
        return fail_with(ErrorKind::ReferentialIntegrity, "Deck not found");
    };
    let Some(course) = uow.load_course(deck.course_id)? else {
        return fail_with(ErrorKind::ReferentialIntegrity, "Course not found");
    };
    if course.user_id != owner {
        return fail_with(ErrorKind::Forbidden, "Forbidden");
    }

    let state = sm2::update(card.state, request.rating);
    log::debug!(
        "{} {} rep={} ivl={}d ef={:.2}",
        card.id.short(),
        request.rating.as_str(),
        state.repetition,
        state.interval,
        state.ease_factor
    );
    let entry = ReviewEntry {
        reviewed_at: now,
        rating: request.rating,
        interval: state.interval,
        ease_factor: state.ease_factor,
    };
    card.state = state;
    card.last_reviewed_at = Some(now);
    card.review_history.push(entry.clone());
    uow.save_review(&card, &entry)?;

    Ok(Some(CardResult {
        card_id: card.id,
        repetition: state.repetition,
        interval: state.interval,
        ease_factor: state.ease_factor,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;

    use tempfile::tempdir;

    use super::*;
    use crate::db::Database;
    use crate::types::card::SchedulingState;

    struct Fixture {
        owner: UserId,
        stranger: UserId,
        own_cards: Vec<Card>,
        foreign_cards: Vec<Card>,
        orphan: Card,
    }

    /// Two users with one course, one deck, and three cards each, plus a
    /// card whose deck points at a course that does not exist.
    fn populate(db: &Database, now: Timestamp) -> Fallible<Fixture> {
        let owner = UserId::new();
        let stranger = UserId::new();
        let mut courses = Vec::new();
        let mut decks = Vec::new();
        let mut all_cards = Vec::new();
        for user in [owner, stranger] {
            let course = Course {
                id: CourseId::new(),
                user_id: user,
                name: "Course".to_string(),
                created_at: now,
            };
            let deck = Deck {
                id: DeckId::new(),
                course_id: course.id,
                title: "Deck".to_string(),
                created_at: now,
            };
            let cards: Vec<Card> = (0..3)
                .map(|i| Card::new(deck.id, format!("Q{i}"), format!("A{i}"), now))
                .collect();
            courses.push(course);
            decks.push(deck);
            all_cards.push(cards);
        }
        let dangling = Deck {
            id: DeckId::new(),
            course_id: CourseId::new(),
            title: "Dangling".to_string(),
            created_at: now,
        };
        let orphan = Card::new(dangling.id, "Q".to_string(), "A".to_string(), now);
        decks.push(dangling);

        let foreign_cards = all_cards.pop().unwrap();
        let own_cards = all_cards.pop().unwrap();
        let mut cards = own_cards.clone();
        cards.extend(foreign_cards.clone());
        cards.push(orphan.clone());
        db.insert_collection(&courses, &decks, &cards)?;
        Ok(Fixture {
            owner,
            stranger,
            own_cards,
            foreign_cards,
            orphan,
        })
    }

    fn review(db: &Database, owner: UserId, batch: &[ReviewRequest]) -> Fallible<ReviewSummary> {
        db.review_transaction(|uow| apply_reviews(uow, owner, batch, Timestamp::now()))
    }

    fn request(card: &Card, rating: Rating) -> ReviewRequest {
        ReviewRequest {
            card_id: card.id,
            rating,
        }
    }

    fn snapshot(db: &Database, cards: &[Card]) -> Fallible<Vec<(SchedulingState, usize)>> {
        cards
            .iter()
            .map(|card| {
                let card = db.get_card(card.id)?.unwrap();
                Ok((card.state, card.review_history.len()))
            })
            .collect()
    }

    #[test]
    fn test_empty_batch_is_rejected() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let err = review(&db, f.owner, &[]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
        Ok(())
    }

    #[test]
    fn test_applies_batch() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let now = Timestamp::now();
        let f = populate(&db, now)?;
        let batch = [
            request(&f.own_cards[0], Rating::Good),
            request(&f.own_cards[1], Rating::Again),
        ];
        let summary = db.review_transaction(|uow| apply_reviews(uow, f.owner, &batch, now))?;
        assert_eq!(summary.updated, 2);
        let first = &summary.results[0];
        assert_eq!(first.card_id, f.own_cards[0].id);
        assert_eq!(first.repetition, 1);
        assert_eq!(first.interval, 1);
        assert!((first.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(summary.results[1].repetition, 0);

        let card = db.get_card(f.own_cards[0].id)?.unwrap();
        assert_eq!(card.state.repetition, 1);
        assert_eq!(card.last_reviewed_at, Some(now));
        assert_eq!(card.review_history.len(), 1);
        assert_eq!(card.review_history[0].rating, Rating::Good);
        assert_eq!(card.review_history[0].interval, 1);

        // Untouched card stays untouched.
        let card = db.get_card(f.own_cards[2].id)?.unwrap();
        assert!(card.last_reviewed_at.is_none());
        Ok(())
    }

    #[test]
    fn test_unknown_id_is_skipped() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let batch = [
            request(&f.own_cards[0], Rating::Good),
            ReviewRequest {
                card_id: CardId::new(),
                rating: Rating::Easy,
            },
            request(&f.own_cards[1], Rating::Hard),
        ];
        let summary = review(&db, f.owner, &batch)?;
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.results.len(), 2);
        Ok(())
    }

    #[test]
    fn test_foreign_card_rolls_back_whole_batch() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let touched = [
            f.own_cards[0].clone(),
            f.own_cards[1].clone(),
            f.foreign_cards[0].clone(),
        ];
        let before = snapshot(&db, &touched)?;
        let batch = [
            request(&touched[0], Rating::Good),
            request(&touched[1], Rating::Easy),
            request(&touched[2], Rating::Good),
        ];
        let err = review(&db, f.owner, &batch).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(snapshot(&db, &touched)?, before);
        Ok(())
    }

    #[test]
    fn test_missing_course_rolls_back_whole_batch() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let touched = [f.own_cards[0].clone(), f.orphan.clone()];
        let before = snapshot(&db, &touched)?;
        let batch = [
            request(&touched[0], Rating::Good),
            request(&touched[1], Rating::Good),
        ];
        let err = review(&db, f.owner, &batch).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
        assert_eq!(err.message(), "Course not found");
        assert_eq!(snapshot(&db, &touched)?, before);
        Ok(())
    }

    #[test]
    fn test_stranger_cannot_review_my_cards() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let err = review(&db, f.stranger, &[request(&f.own_cards[0], Rating::Easy)])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        Ok(())
    }

    #[test]
    fn test_same_card_twice_in_one_batch() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let card = &f.own_cards[0];
        let batch = [
            request(card, Rating::Good),
            request(card, Rating::Good),
            request(card, Rating::Good),
        ];
        let summary = review(&db, f.owner, &batch)?;
        let intervals: Vec<u32> = summary.results.iter().map(|r| r.interval).collect();
        assert_eq!(intervals, vec![1, 6, 15]);
        let card = db.get_card(card.id)?.unwrap();
        assert_eq!(card.review_history.len(), 3);
        Ok(())
    }

    #[test]
    fn test_history_grows_by_one_per_review() -> Fallible<()> {
        let db = Database::new(":memory:")?;
        let f = populate(&db, Timestamp::now())?;
        let card = &f.own_cards[0];
        let ratings = [Rating::Good, Rating::Again, Rating::Easy, Rating::Hard];
        let mut previous: Vec<ReviewEntry> = Vec::new();
        for rating in ratings {
            review(&db, f.owner, &[request(card, rating)])?;
            let history = db.get_card(card.id)?.unwrap().review_history;
            assert_eq!(history.len(), previous.len() + 1);
            assert_eq!(&history[..previous.len()], &previous[..]);
            assert_eq!(history.last().unwrap().rating, rating);
            previous = history;
        }
        Ok(())
    }

    #[test]
    fn test_concurrent_batches_are_serialised() -> Fallible<()> {
        let dir = tempdir()?;
        let path = dir.path().join("studeck.db");
        let path = path.to_str().unwrap().to_string();
        let db = Database::new(&path)?;
        let f = populate(&db, Timestamp::now())?;
        let card_id = f.own_cards[0].id;
        let owner = f.owner;

        // Each thread opens its own connection, so only SQLite's locking
        // stands between them.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || -> Fallible<()> {
                    let db = Database::new(&path)?;
                    let batch = [ReviewRequest {
                        card_id,
                        rating: Rating::Good,
                    }];
                    for _ in 0..5 {
                        review(&db, owner, &batch)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap()?;
        }

        let card = db.get_card(card_id)?.unwrap();
        assert_eq!(card.review_history.len(), 20);
        assert_eq!(card.state.repetition, 20);
        Ok(())
    }

    /// An in-memory store that records how the processor finished.
    #[derive(Default)]
    struct MemoryUnitOfWork {
        cards: HashMap<CardId, Card>,
        decks: HashMap<DeckId, Deck>,
        courses: HashMap<CourseId, Course>,
        saved: Vec<CardId>,
        finished: Option<&'static str>,
    }

    impl UnitOfWork for &mut MemoryUnitOfWork {
        fn load_card(&mut self, card_id: CardId) -> Fallible<Option<Card>> {
            Ok(self.cards.get(&card_id).cloned())
        }

        fn load_deck(&mut self, deck_id: DeckId) -> Fallible<Option<Deck>> {
            Ok(self.decks.get(&deck_id).cloned())
        }

        fn load_course(&mut self, course_id: CourseId) -> Fallible<Option<Course>> {
            Ok(self.courses.get(&course_id).cloned())
        }

        fn save_review(&mut self, card: &Card, _entry: &ReviewEntry) -> Fallible<()> {
            self.saved.push(card.id);
            Ok(())
        }

        fn commit(self) -> Fallible<()> {
            self.finished = Some("commit");
            Ok(())
        }

        fn rollback(self) -> Fallible<()> {
            self.finished = Some("rollback");
            Ok(())
        }
    }

    #[test]
    fn test_processor_is_store_agnostic() -> Fallible<()> {
        let now = Timestamp::now();
        let owner = UserId::new();
        let course = Course {
            id: CourseId::new(),
            user_id: owner,
            name: "Course".to_string(),
            created_at: now,
        };
        let deck = Deck {
            id: DeckId::new(),
            course_id: course.id,
            title: "Deck".to_string(),
            created_at: now,
        };
        let card = Card::new(deck.id, "Q".to_string(), "A".to_string(), now);
        let mut store = MemoryUnitOfWork::default();
        store.cards.insert(card.id, card.clone());
        store.decks.insert(deck.id, deck);
        store.courses.insert(course.id, course);

        let summary = apply_reviews(&mut store, owner, &[request(&card, Rating::Easy)], now)?;
        assert_eq!(summary.updated, 1);
        assert_eq!(store.saved, vec![card.id]);
        assert_eq!(store.finished, Some("commit"));

        let mut store2 = MemoryUnitOfWork::default();
        store2.cards.insert(card.id, card.clone());
        let err = apply_reviews(&mut store2, owner, &[request(&card, Rating::Easy)], now)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
        assert_eq!(err.message(), "Deck not found");
        assert!(store2.saved.is_empty());
        assert_eq!(store2.finished, Some("rollback"));
        Ok(())
    }
}
