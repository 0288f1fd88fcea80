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

use serde::Serialize;

use crate::sm2::INITIAL_EASE_FACTOR;
use crate::sm2::MIN_EASE_FACTOR;
use crate::types::ids::CardId;
use crate::types::ids::CourseId;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::rating::Rating;
use crate::types::timestamp::Timestamp;

/// The three numbers SM-2 carries from one review to the next.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    /// Consecutive passing reviews since the last reset.
    pub repetition: u32,
    /// Days from the most recent review to the next one. At least 1.
    pub interval: u32,
    /// Interval growth multiplier. At least 1.3.
    pub ease_factor: f64,
}

impl SchedulingState {
    /// The state of a card that has never been reviewed.
    pub const INITIAL: SchedulingState = SchedulingState {
        repetition: 0,
        interval: 1,
        ease_factor: INITIAL_EASE_FACTOR,
    };

    /// Force the interval and ease factor back into their valid ranges.
    pub fn clamped(self) -> Self {
        let ease_factor = if self.ease_factor.is_nan() {
            INITIAL_EASE_FACTOR
        } else {
            self.ease_factor.max(MIN_EASE_FACTOR)
        };
        Self {
            repetition: self.repetition,
            interval: self.interval.max(1),
            ease_factor,
        }
    }
}

impl Default for SchedulingState {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// One entry in a card's append-only review log.
#[derive(Clone, PartialEq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    pub reviewed_at: Timestamp,
    pub rating: Rating,
    /// The interval that resulted from this review.
    pub interval: u32,
    /// The ease factor that resulted from this review.
    pub ease_factor: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    pub created_at: Timestamp,
    #[serde(flatten)]
    pub state: SchedulingState,
    /// When absent, the card has never been reviewed.
    pub last_reviewed_at: Option<Timestamp>,
    pub review_history: Vec<ReviewEntry>,
}

impl Card {
    pub fn new(deck_id: DeckId, front: String, back: String, created_at: Timestamp) -> Self {
        Self {
            id: CardId::new(),
            deck_id,
            front,
            back,
            created_at,
            state: SchedulingState::INITIAL,
            last_reviewed_at: None,
            review_history: Vec::new(),
        }
    }

    /// The instant the card becomes due, or `None` if it has never been
    /// reviewed (in which case it is due immediately).
    pub fn next_review_at(&self) -> Option<Timestamp> {
        self.last_reviewed_at
            .map(|ts| ts.plus_days(self.state.interval))
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.next_review_at() {
            None => true,
            Some(next) => now >= next,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Deck {
    pub id: DeckId,
    pub course_id: CourseId,
    pub title: String,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug)]
pub struct Course {
    pub id: CourseId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
}
