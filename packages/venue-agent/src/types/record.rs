//! Extracted venue records.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Genres a model may assign to a record.
pub const GENRES: &[&str] = &[
    "Adventure",
    "Crime",
    "Egypt",
    "Fantasy",
    "Historical",
    "Horror",
    "Medieval",
    "Prison",
    "Science Fiction",
    "Steampunk",
    "Western",
];

/// One extracted entity.
///
/// All fields are passed through as the model produced them; nothing here
/// is validated. Doc comments double as the field descriptions in the tool
/// schema the backends send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    /// Name of the escape room
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    /// Description of the escape room. You find it on the detail page of the escape room.
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,

    /// Minimum number of players
    #[serde(default, deserialize_with = "null_as_default")]
    pub players_min: i64,

    /// Maximum number of players
    #[serde(default, deserialize_with = "null_as_default")]
    pub players_max: i64,

    /// Duration of the escape room in minutes
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: i64,

    /// The full URL/a link to book the escape room.
    #[serde(default, deserialize_with = "null_as_default")]
    pub booking_url: String,

    /// The full URL/a link to the detail page of the escape room
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail_page_url: String,

    /// The full URL/a link to a room related image. Most of the time on top of the detail page of an escape room.
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_url: String,

    /// Select the genre/enum value that most closely matches the escape room.
    #[serde(default, deserialize_with = "null_as_default")]
    pub genre: String,

    /// Difficulty of the escape room
    #[serde(default, deserialize_with = "null_as_default")]
    pub difficulty: String,
}

impl Record {
    /// Create a record with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the detail page URL.
    pub fn with_detail_page_url(mut self, url: impl Into<String>) -> Self {
        self.detail_page_url = url.into();
        self
    }
}

/// Models sometimes send `null` for fields they could not find.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tolerates_nulls_and_missing_fields() {
        let record: Record = serde_json::from_value(serde_json::json!({
            "name": "Pharaoh's Tomb",
            "players_min": null,
            "players_max": 6,
            "genre": "Egypt"
        }))
        .unwrap();

        assert_eq!(record.name, "Pharaoh's Tomb");
        assert_eq!(record.players_min, 0);
        assert_eq!(record.players_max, 6);
        assert_eq!(record.genre, "Egypt");
        assert!(record.description.is_empty());
    }
}
