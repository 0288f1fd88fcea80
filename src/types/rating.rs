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

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorKind;
use crate::error::Fallible;
use crate::error::fail_with;

/// The learner's self-assessed recall for one review.
///
/// There are two integer encodings, and they are fixed:
///
/// | Rating | wire (HTTP, DB) | UI (terminal prompt) | SM-2 quality |
/// |--------|-----------------|----------------------|--------------|
/// | Again  | 0               | 1                    | 0            |
/// | Hard   | 1               | 2                    | 2            |
/// | Good   | 2               | 3                    | 4            |
/// | Easy   | 3               | 4                    | 5            |
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn from_wire(code: u8) -> Fallible<Self> {
        match code {
            0 => Ok(Rating::Again),
            1 => Ok(Rating::Hard),
            2 => Ok(Rating::Good),
            3 => Ok(Rating::Easy),
            _ => fail_with(
                ErrorKind::Validation,
                format!("invalid rating: {code} (expected 0-3)"),
            ),
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Rating::Again => 0,
            Rating::Hard => 1,
            Rating::Good => 2,
            Rating::Easy => 3,
        }
    }

    pub fn from_ui(code: u8) -> Fallible<Self> {
        match code.checked_sub(1) {
            Some(wire) if wire <= 3 => Rating::from_wire(wire),
            _ => fail_with(
                ErrorKind::Validation,
                format!("invalid rating: {code} (expected 1-4)"),
            ),
        }
    }

    pub fn ui(self) -> u8 {
        self.wire() + 1
    }

    /// The rating on the 0-5 SM-2 quality scale.
    pub fn quality(self) -> u8 {
        match self {
            Rating::Again => 0,
            Rating::Hard => 2,
            Rating::Good => 4,
            Rating::Easy => 5,
        }
    }

    /// Whether this counts as a successful recall.
    pub fn is_passing(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        }
    }
}

impl ToSql for Rating {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.wire())))
    }
}

impl FromSql for Rating {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code: u8 = FromSql::column_result(value)?;
        Rating::from_wire(code).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl Serialize for Rating {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.wire())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        Rating::from_wire(code).map_err(serde::de::Error::custom)
    }
}
