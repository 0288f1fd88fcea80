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

//! Opaque identifiers for the ownership chain card → deck → course → user.
//! Each is a UUID, stored as its hyphenated string form.

use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name {
            inner: Uuid,
        }

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self {
                    inner: Uuid::new_v4(),
                }
            }

            pub fn parse(s: &str) -> $crate::error::Fallible<Self> {
                let inner = Uuid::parse_str(s.trim())?;
                Ok(Self { inner })
            }

            /// The first eight hex digits, for log lines.
            pub fn short(&self) -> String {
                let mut s = self.inner.simple().to_string();
                s.truncate(8);
                s
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}", self.inner.hyphenated())
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.to_string()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let string: String = rusqlite::types::FromSql::column_result(value)?;
                $name::parse(&string)
                    .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let string = String::deserialize(deserializer)?;
                $name::parse(&string).map_err(serde::de::Error::custom)
            }
        }
    };
}

id_type!(
    /// The account that owns courses. Supplied by the authentication layer.
    UserId
);
id_type!(CourseId);
id_type!(DeckId);
id_type!(CardId);
