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

//! The SM-2 review-state recurrence.
//!
//! A passing review (Good, Easy) grows the interval 1 → 6 → interval × ease
//! and nudges the ease factor by the usual SM-2 formula. A failing review
//! (Again, Hard) resets the repetition count and interval and leaves the ease
//! factor alone.

use crate::types::card::SchedulingState;
use crate::types::rating::Rating;

/// The ease factor of a card that has never been reviewed.
pub const INITIAL_EASE_FACTOR: f64 = 2.5;

/// The ease factor never drops below this.
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Interval after the first passing review, in days.
const FIRST_INTERVAL: u32 = 1;

/// Interval after the second passing review, in days.
const SECOND_INTERVAL: u32 = 6;

/// Compute the scheduling state that follows `state` after a review rated
/// `rating`. Out-of-range input (interval 0, ease below the floor) is clamped
/// before use.
pub fn update(state: SchedulingState, rating: Rating) -> SchedulingState {
    let state = state.clamped();
    let next = if rating.is_passing() {
        let interval = match state.repetition {
            0 => FIRST_INTERVAL,
            1 => SECOND_INTERVAL,
            _ => grow(state.interval, state.ease_factor),
        };
        SchedulingState {
            repetition: state.repetition.saturating_add(1),
            interval,
            ease_factor: next_ease_factor(state.ease_factor, rating.quality()),
        }
    } else {
        SchedulingState {
            repetition: 0,
            interval: 1,
            ease_factor: state.ease_factor,
        }
    };
    next.clamped()
}

/// The interval each rating would produce, in `Rating::ALL` order.
pub fn preview(state: SchedulingState) -> [(Rating, u32); 4] {
    Rating::ALL.map(|rating| (rating, update(state, rating).interval))
}

fn grow(interval: u32, ease_factor: f64) -> u32 {
    // Float-to-int casts saturate, so a runaway interval pins at u32::MAX.
    (f64::from(interval) * ease_factor).round() as u32
}

fn next_ease_factor(ease_factor: f64, quality: u8) -> f64 {
    let d = 5.0 - f64::from(quality);
    let ease_factor = ease_factor + (0.1 - d * (0.08 + d * 0.02));
    ease_factor.max(MIN_EASE_FACTOR)
}
