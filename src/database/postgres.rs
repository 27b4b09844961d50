use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};

use super::filters::{Filters, Metadata};
use super::models::{token::hash_plaintext, Movie, Permissions, Runtime, Scope, Token, User};
use super::{with_deadline, DatabaseError, MovieStore, PermissionStore, TokenStore, UserStore};

/// Unique constraint guarding `users.email`
const USERS_EMAIL_KEY: &str = "users_email_key";

/// sqlx-backed store. Optimistic concurrency is a single conditional UPDATE,
/// so the database provides the compare-and-swap atomicity.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn movie_from_row(row: &PgRow) -> Result<Movie, sqlx::Error> {
    Ok(Movie {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        title: row.try_get("title")?,
        year: row.try_get("year")?,
        runtime: Runtime(row.try_get("runtime")?),
        genres: row.try_get("genres")?,
        version: row.try_get("version")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        activated: row.try_get("activated")?,
        version: row.try_get("version")?,
    })
}

fn map_user_write_error(err: sqlx::Error) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.constraint() == Some(USERS_EMAIL_KEY) => {
            DatabaseError::DuplicateEmail
        }
        _ => DatabaseError::Sqlx(err),
    }
}

#[async_trait]
impl MovieStore for PgStore {
    async fn insert(&self, movie: &Movie) -> Result<Movie, DatabaseError> {
        let query = r#"
            INSERT INTO movies (title, year, runtime, genres)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .fetch_one(&self.pool)
                .await?;

            Ok::<_, DatabaseError>(Movie {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                version: row.try_get("version")?,
                ..movie.clone()
            })
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Movie, DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        let query = r#"
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE id = $1
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(DatabaseError::NotFound)?;
            Ok::<_, DatabaseError>(movie_from_row(&row)?)
        })
        .await
    }

    async fn update(&self, movie: &Movie) -> Result<Movie, DatabaseError> {
        let query = r#"
            UPDATE movies
            SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(DatabaseError::EditConflict)?;

            Ok::<_, DatabaseError>(Movie {
                version: row.try_get("version")?,
                ..movie.clone()
            })
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        if id < 1 {
            return Err(DatabaseError::NotFound);
        }

        with_deadline(async {
            let result = sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::NotFound);
            }
            Ok::<_, DatabaseError>(())
        })
        .await
    }

    async fn get_all(
        &self,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), DatabaseError> {
        // sort_column() only yields safelisted identifiers
        let query = format!(
            r#"
            SELECT count(*) OVER() AS total, id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
            AND (genres @> $2 OR $2 = '{{}}')
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            "#,
            filters.sort_column(),
            filters.sort_direction().to_sql()
        );

        with_deadline(async {
            let rows = sqlx::query(&query)
                .bind(title)
                .bind(genres)
                .bind(filters.limit())
                .bind(filters.offset())
                .fetch_all(&self.pool)
                .await?;

            let mut total_records = 0;
            let mut movies = Vec::with_capacity(rows.len());
            for row in &rows {
                total_records = row.try_get("total")?;
                movies.push(movie_from_row(row)?);
            }

            let metadata = Metadata::calculate(total_records, filters.page, filters.page_size);
            Ok::<_, DatabaseError>((movies, metadata))
        })
        .await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: &User) -> Result<User, DatabaseError> {
        let query = r#"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .fetch_one(&self.pool)
                .await
                .map_err(map_user_write_error)?;

            Ok::<_, DatabaseError>(User {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                version: row.try_get("version")?,
                ..user.clone()
            })
        })
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let query = r#"
            SELECT id, created_at, name, email::text AS email, password_hash, activated, version
            FROM users
            WHERE email = $1
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(DatabaseError::NotFound)?;
            Ok::<_, DatabaseError>(user_from_row(&row)?)
        })
        .await
    }

    async fn update(&self, user: &User) -> Result<User, DatabaseError> {
        let query = r#"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        "#;

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_user_write_error)?
                .ok_or(DatabaseError::EditConflict)?;

            Ok::<_, DatabaseError>(User {
                version: row.try_get("version")?,
                ..user.clone()
            })
        })
        .await
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> Result<User, DatabaseError> {
        let query = r#"
            SELECT users.id, users.created_at, users.name, users.email::text AS email,
                   users.password_hash, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
            AND tokens.scope = $2
            AND tokens.expiry > $3
        "#;

        let hash = hash_plaintext(plaintext);

        with_deadline(async {
            let row = sqlx::query(query)
                .bind(&hash)
                .bind(scope.as_str())
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await?
                .ok_or(DatabaseError::NotFound)?;
            Ok::<_, DatabaseError>(user_from_row(&row)?)
        })
        .await
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &Token) -> Result<(), DatabaseError> {
        let query = r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
        "#;

        with_deadline(async {
            sqlx::query(query)
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool)
                .await?;
            Ok::<_, DatabaseError>(())
        })
        .await
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), DatabaseError> {
        with_deadline(async {
            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok::<_, DatabaseError>(())
        })
        .await
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DatabaseError> {
        let query = r#"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
        "#;

        with_deadline(async {
            let codes: Vec<String> = sqlx::query_scalar(query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, DatabaseError>(Permissions(codes))
        })
        .await
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DatabaseError> {
        let query = r#"
            INSERT INTO users_permissions
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
            ON CONFLICT DO NOTHING
        "#;

        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();

        with_deadline(async {
            sqlx::query(query)
                .bind(user_id)
                .bind(&codes)
                .execute(&self.pool)
                .await?;
            Ok::<_, DatabaseError>(())
        })
        .await
    }
}
