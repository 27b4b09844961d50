use chrono::{DateTime, Datelike, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::validator::{unique, Validator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    /// Unsaved movie; id, created_at and version are assigned by the store on insert.
    pub fn draft(title: String, year: i32, runtime: Runtime, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            year,
            runtime,
            genres,
            version: 0,
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(movie.year <= Utc::now().year(), "year", "must not be in the future");

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(movie.genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

/// Running time in minutes. Rendered as `"<n> mins"` in JSON; accepts either
/// that form or a bare integer on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RuntimeVisitor)
    }
}

struct RuntimeVisitor;

impl<'de> Visitor<'de> for RuntimeVisitor {
    type Value = Runtime;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer or a string of the form \"<runtime> mins\"")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Runtime, E> {
        i32::try_from(value)
            .map(Runtime)
            .map_err(|_| E::custom("runtime is out of range"))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Runtime, E> {
        i32::try_from(value)
            .map(Runtime)
            .map_err(|_| E::custom("runtime is out of range"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Runtime, E> {
        let minutes = value
            .strip_suffix(" mins")
            .ok_or_else(|| E::custom("invalid runtime format"))?;
        minutes
            .parse::<i32>()
            .map(Runtime)
            .map_err(|_| E::custom("invalid runtime format"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn casablanca() -> Movie {
        Movie::draft(
            "Casablanca".to_string(),
            1942,
            Runtime(102),
            vec!["drama".into(), "romance".into(), "war".into()],
        )
    }

    #[test]
    fn valid_movie_passes() {
        let mut v = Validator::new();
        validate_movie(&mut v, &casablanca());
        assert!(v.valid(), "{:?}", v.errors());
    }

    #[test]
    fn rejects_bad_fields() {
        let mut movie = casablanca();
        movie.title = String::new();
        movie.year = 1800;
        movie.runtime = Runtime(-5);
        movie.genres = vec!["drama".into(), "drama".into()];

        let mut v = Validator::new();
        validate_movie(&mut v, &movie);

        let errors = v.errors();
        assert_eq!(errors["title"], "must be provided");
        assert_eq!(errors["year"], "must be greater than 1888");
        assert_eq!(errors["runtime"], "must be a positive integer");
        assert_eq!(errors["genres"], "must not contain duplicate values");
    }

    #[test]
    fn rejects_too_many_genres() {
        let mut movie = casablanca();
        movie.genres = (0..6).map(|i| format!("g{}", i)).collect();

        let mut v = Validator::new();
        validate_movie(&mut v, &movie);
        assert_eq!(v.errors()["genres"], "must not contain more than 5 genres");
    }

    #[test]
    fn runtime_json_forms() {
        assert_eq!(serde_json::to_value(Runtime(102)).unwrap(), json!("102 mins"));
        assert_eq!(serde_json::from_value::<Runtime>(json!(102)).unwrap(), Runtime(102));
        assert_eq!(
            serde_json::from_value::<Runtime>(json!("95 mins")).unwrap(),
            Runtime(95)
        );
        assert!(serde_json::from_value::<Runtime>(json!("95 minutes")).is_err());
        assert!(serde_json::from_value::<Runtime>(json!(true)).is_err());
    }

    #[test]
    fn movie_json_hides_created_at() {
        let value = serde_json::to_value(casablanca()).unwrap();
        assert!(value.get("created_at").is_none());
        assert_eq!(value["runtime"], "102 mins");
    }
}
