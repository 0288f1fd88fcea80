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

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::config::DbConfig;
use rusqlite::params_from_iter;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::review::UnitOfWork;
use crate::types::card::Card;
use crate::types::card::Course;
use crate::types::card::Deck;
use crate::types::card::ReviewEntry;
use crate::types::card::SchedulingState;
use crate::types::ids::CardId;
use crate::types::ids::CourseId;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CARD_COLUMNS: &str = "c.card_id, c.deck_id, c.front, c.back, c.created_at, c.repetition, c.interval_days, c.ease_factor, c.last_reviewed_at";

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(database_path: &str) -> Fallible<Self> {
        let mut conn = Connection::open(database_path)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, false)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !probe_schema_exists(&tx)? {
                log::debug!("Creating schema in {database_path}");
                tx.execute_batch(include_str!("schema.sql"))?;
            }
            tx.commit()?;
        }
        let conn = Arc::new(Mutex::new(conn));
        Ok(Self { conn })
    }

    /// Insert courses, decks, and cards (with any review history they carry)
    /// in a single transaction.
    pub fn insert_collection(
        &self,
        courses: &[Course],
        decks: &[Deck],
        cards: &[Card],
    ) -> Fallible<()> {
        let mut conn = self.acquire()?;
        let tx = conn.transaction()?;
        for course in courses {
            insert_course(&tx, course)?;
        }
        for deck in decks {
            insert_deck(&tx, deck)?;
        }
        for card in cards {
            insert_card(&tx, card)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Look up a card by id, with its full review history.
    pub fn get_card(&self, card_id: CardId) -> Fallible<Option<Card>> {
        let conn = self.acquire()?;
        select_card(&conn, card_id)
    }

    /// Return every card whose deck belongs to a course owned by `owner`.
    ///
    /// If `deck_ids` is given, only cards in those decks are returned. An
    /// empty filter matches nothing.
    pub fn owned_cards(&self, owner: UserId, deck_ids: Option<&[DeckId]>) -> Fallible<Vec<Card>> {
        let mut sql = format!(
            "select {CARD_COLUMNS} from cards c join decks d on d.deck_id = c.deck_id join courses co on co.course_id = d.course_id where co.user_id = ?"
        );
        let mut params: Vec<String> = vec![owner.to_string()];
        if let Some(deck_ids) = deck_ids {
            if deck_ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; deck_ids.len()].join(", ");
            sql.push_str(&format!(" and c.deck_id in ({placeholders})"));
            params.extend(deck_ids.iter().map(|id| id.to_string()));
        }
        sql.push(';');

        let conn = self.acquire()?;
        let mut cards = Vec::new();
        {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            while let Some(row) = rows.next()? {
                cards.push(card_from_row(row)?);
            }
        }
        for card in cards.iter_mut() {
            card.review_history = select_history(&conn, card.id)?;
        }
        Ok(cards)
    }

    /// Run `f` inside an immediate (write-locking) transaction.
    ///
    /// The lock is taken at `begin`, so two overlapping review batches, even
    /// from separate processes, are serialised. If `f` neither commits nor
    /// rolls back, the transaction is rolled back when it is dropped.
    pub fn review_transaction<T>(
        &self,
        f: impl FnOnce(SqliteUnitOfWork<'_>) -> Fallible<T>,
    ) -> Fallible<T> {
        let mut conn = self.acquire()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        f(SqliteUnitOfWork { tx })
    }

    fn acquire(&self) -> Fallible<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ErrorReport::new("database lock poisoned"))
    }
}

/// A review batch in flight against SQLite.
pub struct SqliteUnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl UnitOfWork for SqliteUnitOfWork<'_> {
    fn load_card(&mut self, card_id: CardId) -> Fallible<Option<Card>> {
        select_card(&self.tx, card_id)
    }

    fn load_deck(&mut self, deck_id: DeckId) -> Fallible<Option<Deck>> {
        let sql = "select deck_id, course_id, title, created_at from decks where deck_id = ?;";
        let deck = self
            .tx
            .query_row(sql, [deck_id], |row| {
                Ok(Deck {
                    id: row.get(0)?,
                    course_id: row.get(1)?,
                    title: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .optional()?;
        Ok(deck)
    }

    fn load_course(&mut self, course_id: CourseId) -> Fallible<Option<Course>> {
        let sql = "select course_id, user_id, name, created_at from courses where course_id = ?;";
        let course = self
            .tx
            .query_row(sql, [course_id], |row| {
                Ok(Course {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .optional()?;
        Ok(course)
    }

    fn save_review(&mut self, card: &Card, entry: &ReviewEntry) -> Fallible<()> {
        let sql = "update cards set repetition = ?, interval_days = ?, ease_factor = ?, last_reviewed_at = ? where card_id = ?;";
        let changed = self.tx.execute(
            sql,
            (
                card.state.repetition,
                card.state.interval,
                card.state.ease_factor,
                &card.last_reviewed_at,
                card.id,
            ),
        )?;
        if changed != 1 {
            return fail(format!("card {} vanished mid-transaction", card.id));
        }
        insert_review(&self.tx, card.id, entry)?;
        Ok(())
    }

    fn commit(self) -> Fallible<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Fallible<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        created_at: row.get(4)?,
        state: SchedulingState {
            repetition: row.get(5)?,
            interval: row.get(6)?,
            ease_factor: row.get(7)?,
        },
        last_reviewed_at: row.get(8)?,
        review_history: Vec::new(),
    })
}

fn select_card(conn: &Connection, card_id: CardId) -> Fallible<Option<Card>> {
    let sql = format!("select {CARD_COLUMNS} from cards c where c.card_id = ?;");
    let card = conn
        .query_row(&sql, [card_id], card_from_row)
        .optional()?;
    match card {
        Some(mut card) => {
            card.review_history = select_history(conn, card.id)?;
            Ok(Some(card))
        }
        None => Ok(None),
    }
}

fn select_history(conn: &Connection, card_id: CardId) -> Fallible<Vec<ReviewEntry>> {
    let sql = "select reviewed_at, rating, interval_days, ease_factor from reviews where card_id = ? order by seq;";
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([card_id])?;
    let mut history = Vec::new();
    while let Some(row) = rows.next()? {
        history.push(ReviewEntry {
            reviewed_at: row.get(0)?,
            rating: row.get(1)?,
            interval: row.get(2)?,
            ease_factor: row.get(3)?,
        });
    }
    Ok(history)
}

fn insert_course(tx: &Transaction, course: &Course) -> Fallible<()> {
    let sql = "insert into courses (course_id, user_id, name, created_at) values (?, ?, ?, ?);";
    tx.execute(
        sql,
        (course.id, course.user_id, &course.name, course.created_at),
    )?;
    Ok(())
}

fn insert_deck(tx: &Transaction, deck: &Deck) -> Fallible<()> {
    let sql = "insert into decks (deck_id, course_id, title, created_at) values (?, ?, ?, ?);";
    tx.execute(sql, (deck.id, deck.course_id, &deck.title, deck.created_at))?;
    Ok(())
}

fn insert_card(tx: &Transaction, card: &Card) -> Fallible<()> {
    let sql = "insert into cards (card_id, deck_id, front, back, created_at, repetition, interval_days, ease_factor, last_reviewed_at) values (?, ?, ?, ?, ?, ?, ?, ?, ?);";
    tx.execute(
        sql,
        (
            card.id,
            card.deck_id,
            &card.front,
            &card.back,
            card.created_at,
            card.state.repetition,
            card.state.interval,
            card.state.ease_factor,
            &card.last_reviewed_at,
        ),
    )?;
    for entry in &card.review_history {
        insert_review(tx, card.id, entry)?;
    }
    Ok(())
}

/// Append a review to the end of a card's log.
fn insert_review(conn: &Connection, card_id: CardId, entry: &ReviewEntry) -> Fallible<()> {
    let sql = "insert into reviews (card_id, seq, reviewed_at, rating, interval_days, ease_factor) select ?1, count(*), ?2, ?3, ?4, ?5 from reviews where card_id = ?1;";
    conn.execute(
        sql,
        (
            card_id,
            entry.reviewed_at,
            entry.rating,
            entry.interval,
            entry.ease_factor,
        ),
    )?;
    Ok(())
}

fn probe_schema_exists(tx: &Transaction) -> Fallible<bool> {
    let sql = "select count(*) from sqlite_master where type='table' AND name=?;";
    let count: i64 = tx.query_row(sql, ["cards"], |row| row.get(0))?;
    Ok(count > 0)
}
