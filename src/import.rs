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

//! Loading courses, decks, and cards from a JSON document.
//!
//! ```json
//! {
//!   "courses": [
//!     {
//!       "userId": "…",
//!       "name": "Spanish",
//!       "decks": [
//!         { "title": "Verbs", "cards": [{ "front": "comer", "back": "to eat" }] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Ids are optional; missing ones are generated. New cards start with the
//! initial scheduling state.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::db::Database;
use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::error::fail_with;
use crate::types::card::Card;
use crate::types::card::Course;
use crate::types::card::Deck;
use crate::types::ids::CardId;
use crate::types::ids::CourseId;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::timestamp::Timestamp;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ImportDocument {
    courses: Vec<CourseImport>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CourseImport {
    id: Option<CourseId>,
    user_id: UserId,
    name: String,
    #[serde(default)]
    decks: Vec<DeckImport>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeckImport {
    id: Option<DeckId>,
    title: String,
    #[serde(default)]
    cards: Vec<CardImport>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CardImport {
    id: Option<CardId>,
    front: String,
    back: String,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize)]
pub struct ImportCounts {
    pub courses: usize,
    pub decks: usize,
    pub cards: usize,
}

pub fn import_file(db: &Database, path: &Path, now: Timestamp) -> Fallible<ImportCounts> {
    if !path.exists() {
        return fail(format!("file {} does not exist.", path.display()));
    }
    let content = std::fs::read_to_string(path)?;
    import_document(db, &content, now)
}

/// Insert everything in `json` in one transaction. Nothing is written if
/// any part of the document is invalid.
pub fn import_document(db: &Database, json: &str, now: Timestamp) -> Fallible<ImportCounts> {
    let document: ImportDocument = serde_json::from_str(json)
        .map_err(|e| ErrorReport::with_kind(ErrorKind::Validation, &e.to_string()))?;

    let mut courses = Vec::new();
    let mut decks = Vec::new();
    let mut cards = Vec::new();
    for course in document.courses {
        if course.name.trim().is_empty() {
            return fail_with(ErrorKind::Validation, "course name must not be empty");
        }
        let course_id = course.id.unwrap_or_default();
        for deck in course.decks {
            if deck.title.trim().is_empty() {
                return fail_with(ErrorKind::Validation, "deck title must not be empty");
            }
            let deck_id = deck.id.unwrap_or_default();
            for card in deck.cards {
                let mut new = Card::new(deck_id, card.front, card.back, now);
                if let Some(id) = card.id {
                    new.id = id;
                }
                cards.push(new);
            }
            decks.push(Deck {
                id: deck_id,
                course_id,
                title: deck.title,
                created_at: now,
            });
        }
        courses.push(Course {
            id: course_id,
            user_id: course.user_id,
            name: course.name,
            created_at: now,
        });
    }

    db.insert_collection(&courses, &decks, &cards)?;
    let counts = ImportCounts {
        courses: courses.len(),
        decks: decks.len(),
        cards: cards.len(),
    };
    log::info!(
        "Imported {} course(s), {} deck(s), {} card(s).",
        counts.courses,
        counts.decks,
        counts.cards
    );
    Ok(counts)
}
