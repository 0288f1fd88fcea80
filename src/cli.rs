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

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use crate::config::Config;
use crate::db::Database;
use crate::due::select_due;
use crate::error::ErrorKind;
use crate::error::Fallible;
use crate::error::fail_with;
use crate::import::import_file;
use crate::review::ReviewRequest;
use crate::review::apply_reviews;
use crate::server::start_server;
use crate::study::Session;
use crate::types::ids::CardId;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::rating::Rating;
use crate::types::timestamp::Timestamp;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file. Defaults to `studeck.toml`, if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to the SQLite database. Overrides the configuration file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the study API over HTTP.
    Serve {
        /// Address to listen on, e.g. `127.0.0.1:8000`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the cards due for a user, as JSON.
    Due {
        #[arg(long)]
        user: String,
        /// Comma-separated deck ids to restrict to.
        #[arg(long)]
        decks: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Apply a batch of reviews, printing the result as JSON.
    Review {
        #[arg(long)]
        user: String,
        /// Reviews as `CARD_ID:RATING`, with ratings 0 (Again) to 3 (Easy).
        #[arg(required = true)]
        reviews: Vec<String>,
    },
    /// Study due cards in the terminal.
    Study {
        #[arg(long)]
        user: String,
        /// Comma-separated deck ids to restrict to.
        #[arg(long)]
        decks: Option<String>,
        /// Seed for the session shuffle.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Load courses, decks, and cards from a JSON file.
    Import {
        /// Path to the JSON document.
        file: PathBuf,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            start_server(config).await
        }
        Command::Due { user, decks, limit } => {
            let db = Database::new(config.database_path()?)?;
            let owner = UserId::parse(&user)?;
            let deck_ids = parse_deck_list(decks.as_deref())?;
            let limit = limit.unwrap_or(config.due_limit);
            let cards = select_due(&db, owner, deck_ids.as_deref(), limit, Timestamp::now())?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
            Ok(())
        }
        Command::Review { user, reviews } => {
            let db = Database::new(config.database_path()?)?;
            let owner = UserId::parse(&user)?;
            let batch = reviews
                .iter()
                .map(|s| parse_review_arg(s))
                .collect::<Fallible<Vec<ReviewRequest>>>()?;
            let now = Timestamp::now();
            let summary = db.review_transaction(|uow| apply_reviews(uow, owner, &batch, now))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Study { user, decks, seed } => {
            if seed.is_some() {
                config.seed = seed;
            }
            let db = Database::new(config.database_path()?)?;
            let owner = UserId::parse(&user)?;
            let deck_ids = parse_deck_list(decks.as_deref())?;
            let session = Session {
                db: &db,
                owner,
                deck_ids: deck_ids.as_deref(),
                limit: config.due_limit,
            };
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut output = std::io::stdout();
            session.run(config.session_rng(), &mut input, &mut output)?;
            Ok(())
        }
        Command::Import { file } => {
            let db = Database::new(config.database_path()?)?;
            let counts = import_file(&db, &file, Timestamp::now())?;
            println!(
                "Imported {} course(s), {} deck(s), {} card(s).",
                counts.courses, counts.decks, counts.cards
            );
            Ok(())
        }
    }
}

fn parse_deck_list(value: Option<&str>) -> Fallible<Option<Vec<DeckId>>> {
    match value {
        None => Ok(None),
        Some(value) => {
            let ids = value
                .split(',')
                .map(DeckId::parse)
                .collect::<Fallible<Vec<DeckId>>>()?;
            Ok(Some(ids))
        }
    }
}

/// Parse `CARD_ID:RATING`.
fn parse_review_arg(s: &str) -> Fallible<ReviewRequest> {
    let Some((card_id, rating)) = s.rsplit_once(':') else {
        return fail_with(
            ErrorKind::Validation,
            format!("invalid review {s:?}: expected CARD_ID:RATING"),
        );
    };
    let card_id = CardId::parse(card_id)?;
    let Ok(code) = rating.trim().parse::<u8>() else {
        return fail_with(ErrorKind::Validation, format!("invalid rating: {rating}"));
    };
    let rating = Rating::from_wire(code)?;
    Ok(ReviewRequest { card_id, rating })
}
