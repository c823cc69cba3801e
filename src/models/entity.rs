//! Entity identifiers

use serde::{Deserialize, Serialize};

/// One of the five target entities of the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Songs,
    Artists,
    Users,
    Time,
    SongPlays,
}

impl Entity {
    /// All entities in load order
    ///
    /// Song plays come last because they are enriched from the persisted songs.
    pub const ALL: [Entity; 5] = [
        Entity::Songs,
        Entity::Artists,
        Entity::Time,
        Entity::Users,
        Entity::SongPlays,
    ];

    /// Name of the persisted table
    pub fn table_name(&self) -> &'static str {
        match self {
            Entity::Songs => "songs",
            Entity::Artists => "artists",
            Entity::Users => "users",
            Entity::Time => "time",
            Entity::SongPlays => "songplays",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}
