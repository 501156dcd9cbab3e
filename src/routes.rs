use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, State},
    http::StatusCode,
    routing::get,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{ListQuery, MovieCreate, MovieRead, MovieUpdate, PaginatedMovies},
};

/// `Json` whose rejections render through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections render through [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// `Path` whose rejections render through [`AppError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

pub fn router(state: Arc<AppState>) -> Router {
    let movies = Router::new()
        .route("/movies/", get(list_movies).post(create_movie))
        .route("/movies/{id}/", get(get_movie).patch(update_movie).delete(delete_movie));

    let prefix = state.config.api_prefix.clone();
    let app = if prefix.is_empty() { movies } else { Router::new().nest(&prefix, movies) };
    app.with_state(state)
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> AppResult<Json<PaginatedMovies>> {
    q.validate()?;
    Ok(Json(state.movies.list(q.page, q.per_page).await?))
}

pub async fn get_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<Json<MovieRead>> {
    Ok(Json(state.movies.get(id).await?))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<MovieCreate>,
) -> AppResult<(StatusCode, Json<MovieRead>)> {
    let movie = state.movies.create(payload).await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn update_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<MovieUpdate>,
) -> AppResult<Json<MovieRead>> {
    Ok(Json(state.movies.update(id, payload).await?))
}

pub async fn delete_movie(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i32>,
) -> AppResult<StatusCode> {
    state.movies.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
