use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::filters::{Filters, Metadata, SortDirection};
use super::models::{token::hash_plaintext, Movie, Permissions, Scope, Token, User};
use super::models::{MOVIES_READ, MOVIES_WRITE};
use super::{with_deadline, DatabaseError, MovieStore, PermissionStore, TokenStore, UserStore};

/// Permission codes seeded into the catalogue, mirroring the migrations
const KNOWN_PERMISSIONS: &[&str] = &[MOVIES_READ, MOVIES_WRITE];

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store with the same contract as the Postgres one. The
/// version check and increment of `update` happen under a single write lock,
/// which makes them one compare-and-swap step.
#[derive(Default)]
pub struct MemoryStore {
    movies: RwLock<Table<Movie>>,
    users: RwLock<Table<User>>,
    tokens: RwLock<Vec<Token>>,
    permissions: RwLock<HashMap<i64, BTreeSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lower-cased alphanumeric words, the same tokenisation the title search uses
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn title_matches(title: &str, query: &str) -> bool {
    let wanted = words(query);
    if wanted.is_empty() {
        return true;
    }
    let have = words(title);
    wanted.iter().all(|w| have.contains(w))
}

fn compare_by(column: &str, a: &Movie, b: &Movie) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &Movie) -> Result<Movie, DatabaseError> {
        with_deadline(async {
            let mut table = self.movies.write().await;
            let stored = Movie {
                id: table.allocate_id(),
                created_at: Utc::now(),
                version: 1,
                ..movie.clone()
            };
            table.rows.insert(stored.id, stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Movie, DatabaseError> {
        with_deadline(async {
            let table = self.movies.read().await;
            table.rows.get(&id).cloned().ok_or(DatabaseError::NotFound)
        })
        .await
    }

    async fn update(&self, movie: &Movie) -> Result<Movie, DatabaseError> {
        with_deadline(async {
            let mut table = self.movies.write().await;
            match table.rows.get_mut(&movie.id) {
                Some(current) if current.version == movie.version => {
                    *current = Movie {
                        id: current.id,
                        created_at: current.created_at,
                        version: current.version + 1,
                        ..movie.clone()
                    };
                    Ok(current.clone())
                }
                _ => Err(DatabaseError::EditConflict),
            }
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        with_deadline(async {
            let mut table = self.movies.write().await;
            table
                .rows
                .remove(&id)
                .map(|_| ())
                .ok_or(DatabaseError::NotFound)
        })
        .await
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError> {
        with_deadline(async {
            let table = self.movies.read().await;
            let mut matched: Vec<Movie> = table
                .rows
                .values()
                .filter(|m| title_matches(&m.title, title))
                .filter(|m| genres.iter().all(|g| m.genres.contains(g)))
                .cloned()
                .collect();
            drop(table);

            let column = filters.sort_column();
            let direction = filters.sort_direction();
            matched.sort_by(|a, b| {
                let primary = match direction {
                    SortDirection::Asc => compare_by(column, a, b),
                    SortDirection::Desc => compare_by(column, b, a),
                };
                primary.then(a.id.cmp(&b.id))
            });

            let total_records = matched.len() as i64;
            let page: Vec<Movie> = matched
                .into_iter()
                .skip(filters.offset().max(0) as usize)
                .take(filters.limit().max(0) as usize)
                .collect();

            let metadata = if page.is_empty() {
                Metadata::default()
            } else {
                Metadata::calculate(total_records, filters.page, filters.page_size)
            };
            Ok((page, metadata))
        })
        .await
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &User) -> Result<User, DatabaseError> {
        with_deadline(async {
            let mut table = self.users.write().await;
            if table.rows.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
                return Err(DatabaseError::DuplicateEmail);
            }
            let stored = User {
                id: table.allocate_id(),
                created_at: Utc::now(),
                version: 1,
                ..user.clone()
            };
            table.rows.insert(stored.id, stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        with_deadline(async {
            let table = self.users.read().await;
            table
                .rows
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned()
                .ok_or(DatabaseError::NotFound)
        })
        .await
    }

    async fn update(&self, user: &User) -> Result<User, DatabaseError> {
        with_deadline(async {
            let mut table = self.users.write().await;
            if table
                .rows
                .values()
                .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(DatabaseError::DuplicateEmail);
            }
            match table.rows.get_mut(&user.id) {
                Some(current) if current.version == user.version => {
                    *current = User {
                        id: current.id,
                        created_at: current.created_at,
                        version: current.version + 1,
                        ..user.clone()
                    };
                    Ok(current.clone())
                }
                _ => Err(DatabaseError::EditConflict),
            }
        })
        .await
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, DatabaseError> {
        let hash = hash_plaintext(plaintext);
        with_deadline(async {
            let now = Utc::now();
            let owner = {
                let tokens = self.tokens.read().await;
                tokens
                    .iter()
                    .find(|t| t.hash == hash && t.scope == scope && t.expiry > now)
                    .map(|t| t.user_id)
            };
            let Some(user_id) = owner else {
                return Err(DatabaseError::NotFound);
            };

            let users = self.users.read().await;
            users
                .rows
                .get(&user_id)
                .cloned()
                .ok_or(DatabaseError::NotFound)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        with_deadline(async {
            self.tokens.write().await.push(token.clone());
            Ok(())
        })
        .await
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), DatabaseError> {
        with_deadline(async {
            self.tokens
                .write()
                .await
                .retain(|t| !(t.scope == scope && t.user_id == user_id));
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DatabaseError> {
        with_deadline(async {
            let permissions = self.permissions.read().await;
            Ok(permissions
                .get(&user_id)
                .map(|codes| codes.iter().cloned().collect())
                .unwrap_or_default())
        })
        .await
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DatabaseError> {
        with_deadline(async {
            let mut permissions = self.permissions.write().await;
            let granted = permissions.entry(user_id).or_default();
            for code in codes.iter().filter(|c| KNOWN_PERMISSIONS.contains(c)) {
                granted.insert(code.to_string());
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Runtime;
    use crate::database::Models;
    use chrono::Duration;
    use std::sync::Arc;

    fn casablanca() -> Movie {
        Movie::draft(
            "Casablanca".to_string(),
            1942,
            Runtime(102),
            vec!["drama".into(), "romance".into(), "war".into()],
        )
    }

    fn alice() -> User {
        User {
            id: 0,
            created_at: Utc::now(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            activated: false,
            version: 0,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let models = Models::memory();
        let draft = casablanca();
        let inserted = models.movies.insert(&draft).await.unwrap();
        let fetched = models.movies.get(inserted.id).await.unwrap();

        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.title, draft.title);
        assert_eq!(fetched.year, draft.year);
        assert_eq!(fetched.runtime, draft.runtime);
        assert_eq!(fetched.genres, draft.genres);
        assert_eq!(fetched, inserted);
    }

    #[tokio::test]
    async fn update_requires_current_version() {
        let models = Models::memory();
        let movie = models.movies.insert(&casablanca()).await.unwrap();

        let mut edit = movie.clone();
        edit.title = "Casablanca (Restored)".to_string();
        let updated = models.movies.update(&edit).await.unwrap();
        assert_eq!(updated.version, 2);

        // Same stale version again
        let err = models.movies.update(&edit).await.unwrap_err();
        assert!(matches!(err, DatabaseError::EditConflict));

        let stored = models.movies.get(movie.id).await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.title, "Casablanca (Restored)");
    }

    #[tokio::test]
    async fn update_of_missing_movie_conflicts() {
        let models = Models::memory();
        let mut ghost = casablanca();
        ghost.id = 99;
        ghost.version = 1;
        let err = models.movies.update(&ghost).await.unwrap_err();
        assert!(matches!(err, DatabaseError::EditConflict));
    }

    #[tokio::test]
    async fn concurrent_updates_with_same_version_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let models = Models::from_store(store);
        let movie = models.movies.insert(&casablanca()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let movies = models.movies.clone();
            let mut edit = movie.clone();
            edit.title = format!("Casablanca take {}", i);
            handles.push(tokio::spawn(async move { movies.update(&edit).await }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(updated) => {
                    wins += 1;
                    assert_eq!(updated.version, 2);
                }
                Err(DatabaseError::EditConflict) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(models.movies.get(movie.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn delete_twice_reports_not_found() {
        let models = Models::memory();
        let movie = models.movies.insert(&casablanca()).await.unwrap();

        models.movies.delete(movie.id).await.unwrap();
        for _ in 0..2 {
            let err = models.movies.delete(movie.id).await.unwrap_err();
            assert!(matches!(err, DatabaseError::NotFound));
        }
    }

    #[tokio::test]
    async fn get_all_filters_sorts_and_pages() {
        let models = Models::memory();
        for (title, year, genres) in [
            ("Casablanca", 1942, vec!["drama", "romance"]),
            ("The Breakfast Club", 1985, vec!["comedy", "drama"]),
            ("Black Panther", 2018, vec!["action", "adventure"]),
            ("The Club", 1980, vec!["drama"]),
        ] {
            let draft = Movie::draft(
                title.to_string(),
                year,
                Runtime(100),
                genres.into_iter().map(String::from).collect(),
            );
            models.movies.insert(&draft).await.unwrap();
        }

        let filters = Filters {
            sort: "-year".to_string(),
            ..Filters::default()
        };
        let (movies, metadata) = models
            .movies
            .get_all("", &["drama".to_string()], &filters)
            .await
            .unwrap();
        let titles: Vec<&str> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["The Breakfast Club", "The Club", "Casablanca"]);
        assert_eq!(metadata.total_records, 3);

        let (movies, _) = models
            .movies
            .get_all("CLUB", &[], &Filters::default())
            .await
            .unwrap();
        assert_eq!(movies.len(), 2);

        let paged = Filters {
            page: 2,
            page_size: 3,
            ..Filters::default()
        };
        let (movies, metadata) = models.movies.get_all("", &[], &paged).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(metadata.current_page, 2);
        assert_eq!(metadata.last_page, 2);

        let beyond = Filters {
            page: 9,
            ..Filters::default()
        };
        let (movies, metadata) = models.movies.get_all("", &[], &beyond).await.unwrap();
        assert!(movies.is_empty());
        assert_eq!(metadata, Metadata::default());
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let models = Models::memory();
        models.users.insert(&alice()).await.unwrap();
        let err = models.users.insert(&alice()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateEmail));
    }

    #[tokio::test]
    async fn tokens_resolve_by_scope_and_expiry() {
        let models = Models::memory();
        let user = models.users.insert(&alice()).await.unwrap();

        let auth = models
            .tokens
            .new_token(user.id, Duration::hours(1), Scope::Authentication)
            .await
            .unwrap();
        let found = models
            .users
            .get_for_token(Scope::Authentication, &auth.plaintext)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        // Wrong scope
        let err = models
            .users
            .get_for_token(Scope::Activation, &auth.plaintext)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));

        // Expired
        let stale = models
            .tokens
            .new_token(user.id, Duration::seconds(-1), Scope::Authentication)
            .await
            .unwrap();
        let err = models
            .users
            .get_for_token(Scope::Authentication, &stale.plaintext)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));

        models
            .tokens
            .delete_all_for_user(Scope::Authentication, user.id)
            .await
            .unwrap();
        let err = models
            .users
            .get_for_token(Scope::Authentication, &auth.plaintext)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound));
    }

    #[tokio::test]
    async fn permissions_ignore_unknown_codes() {
        let models = Models::memory();
        models
            .permissions
            .add_for_user(1, &[MOVIES_READ, "movies:delete"])
            .await
            .unwrap();
        let perms = models.permissions.get_all_for_user(1).await.unwrap();
        assert!(perms.include(MOVIES_READ));
        assert!(!perms.include("movies:delete"));
        assert!(models.permissions.get_all_for_user(2).await.unwrap().0.is_empty());
    }
}
