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

//! Studying in the terminal.

use std::io::BufRead;
use std::io::Write;

use rand::Rng;

use crate::db::Database;
use crate::due::select_due;
use crate::error::Fallible;
use crate::queue::SessionQueue;
use crate::queue::SessionStats;
use crate::review::ReviewRequest;
use crate::review::apply_reviews;
use crate::sm2;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::rating::Rating;
use crate::types::timestamp::Timestamp;

/// What the user typed at a prompt.
enum Input {
    Line(String),
    Quit,
}

pub struct Session<'a> {
    pub db: &'a Database,
    pub owner: UserId,
    pub deck_ids: Option<&'a [DeckId]>,
    pub limit: usize,
}

impl Session<'_> {
    /// Run an interactive session until every card has been answered Good
    /// or Easy, or the user quits. Each answer is committed as it is given.
    pub fn run<G: Rng>(
        &self,
        rng: G,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Fallible<SessionStats> {
        let cards = select_due(self.db, self.owner, self.deck_ids, self.limit, Timestamp::now())?;
        if cards.is_empty() {
            writeln!(output, "No cards due.")?;
            return Ok(SessionStats::default());
        }
        let mut queue = SessionQueue::new(cards, rng);
        writeln!(output, "{} card(s) due.", queue.total())?;

        while let Some(card) = queue.current() {
            let card = card.clone();
            writeln!(output)?;
            writeln!(output, "[{}/{}] Q: {}", queue.seen(), queue.total(), card.front)?;
            writeln!(output, "[press enter to reveal, q to quit]")?;
            if let Input::Quit = read_input(input)? {
                break;
            }
            writeln!(output, "A: {}", card.back)?;

            // The queued copy is stale once the card has been answered.
            let state = match self.db.get_card(card.id)? {
                Some(stored) => stored.state,
                None => card.state,
            };
            let rating = match read_rating(input, output, &sm2::preview(state))? {
                Some(rating) => rating,
                None => break,
            };

            let request = ReviewRequest {
                card_id: card.id,
                rating,
            };
            let now = Timestamp::now();
            let summary = self
                .db
                .review_transaction(|uow| apply_reviews(uow, self.owner, &[request], now))?;
            if summary.updated == 0 {
                log::warn!("Card {} disappeared during the session.", card.id);
            }
            queue.advance(rating);
            if queue.is_settled() {
                break;
            }
        }

        let stats = queue.finish();
        writeln!(output)?;
        writeln!(
            output,
            "Session complete: {} answer(s). Again {}, Hard {}, Good {}, Easy {}.",
            stats.answered(),
            stats.again,
            stats.hard,
            stats.good,
            stats.easy
        )?;
        Ok(stats)
    }
}

fn read_input(input: &mut impl BufRead) -> Fallible<Input> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Input::Quit);
    }
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        Ok(Input::Quit)
    } else {
        Ok(Input::Line(line.to_string()))
    }
}

/// Prompt until the user types a valid rating. `None` means quit.
fn read_rating(
    input: &mut impl BufRead,
    output: &mut impl Write,
    preview: &[(Rating, u32)],
) -> Fallible<Option<Rating>> {
    let labels: Vec<String> = preview
        .iter()
        .map(|(rating, days)| format!("{} = {} ({days}d)", rating.ui(), rating.as_str()))
        .collect();
    loop {
        writeln!(output, "Rating: {}", labels.join(", "))?;
        let line = match read_input(input)? {
            Input::Line(line) => line,
            Input::Quit => return Ok(None),
        };
        match line.parse::<u8>().map(Rating::from_ui) {
            Ok(Ok(rating)) => return Ok(Some(rating)),
            _ => writeln!(output, "Invalid input. Please enter a number between 1 and 4.")?,
        }
    }
}
