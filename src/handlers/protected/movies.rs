use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap},
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::filters::{validate_filters, Filters, MOVIE_SORT_SAFELIST};
use crate::database::models::{validate_movie, Movie, Runtime};
use crate::error::ApiError;
use crate::middleware::extract::parse_id;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::state::AppState;
use crate::validator::Validator;

/// Optional precondition carried on PATCH requests
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub title: Option<String>,
    /// Comma separated; every listed genre must be present
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovieInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieInput {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
    pub version: Option<i32>,
}

fn read_int(v: &mut Validator, raw: Option<&str>, key: &str, default: i64) -> i64 {
    match raw {
        None | Some("") => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

fn read_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// GET /v1/movies - List movies with filtering, sorting and pagination
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Value> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut v = Validator::new();
    let title = query.title.unwrap_or_default();
    let genres = read_csv(query.genres.as_deref());

    let defaults = Filters::default();
    let filters = Filters {
        page: read_int(&mut v, query.page.as_deref(), "page", defaults.page),
        page_size: read_int(&mut v, query.page_size.as_deref(), "page_size", defaults.page_size),
        sort: query.sort.filter(|s| !s.is_empty()).unwrap_or(defaults.sort),
        sort_safelist: MOVIE_SORT_SAFELIST,
    };

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let (movies, metadata) = state.models.movies.get_all(&title, &genres, &filters).await?;

    Ok(ApiResponse::success(json!({
        "movies": movies,
        "metadata": metadata
    })))
}

/// POST /v1/movies - Create a movie
pub async fn create(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateMovieInput>,
) -> ApiResult<Value> {
    let draft = Movie::draft(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &draft);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    let movie = state.models.movies.insert(&draft).await?;
    tracing::info!(movie_id = movie.id, "movie created");

    let location = format!("/v1/movies/{}", movie.id);
    Ok(ApiResponse::created(json!({ "movie": movie })).header(header::LOCATION, &location))
}

/// GET /v1/movies/:id - Get a single movie
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let movie = state.models.movies.get(id).await?;
    Ok(ApiResponse::success(json!({ "movie": movie })))
}

/// PATCH /v1/movies/:id - Apply a partial update guarded by the movie version
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<UpdateMovieInput>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    let mut movie = state.models.movies.get(id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(ApiError::edit_conflict());
        }
    }
    if let Some(version) = input.version {
        if version != movie.version {
            return Err(ApiError::edit_conflict());
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    // The store re-checks the version atomically; a concurrent writer between
    // the read above and this call still yields a conflict.
    let movie = state.models.movies.update(&movie).await?;
    Ok(ApiResponse::success(json!({ "movie": movie })))
}

/// DELETE /v1/movies/:id - Delete a movie
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    state.models.movies.delete(id).await?;
    Ok(ApiResponse::success(
        json!({ "message": "movie successfully deleted" }),
    ))
}
