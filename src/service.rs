use jiff::civil::Date;
use sea_orm::{DatabaseConnection, DbErr, SqlErr, TransactionTrait};
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    models::{
        CountryOut, MovieCreate, MovieRead, MovieShort, MovieUpdate, NamedOut, PaginatedMovies,
    },
    repository::{MovieAggregate, MovieRepository, MovieSummaryRow, NewMovie, Relations},
    resolver::{self, ReferenceKind},
};

#[derive(Clone)]
pub struct MovieService {
    db: DatabaseConnection,
    /// Prefix used when building pagination links, e.g. `/theater`.
    link_prefix: String,
}

impl MovieService {
    pub fn new(db: DatabaseConnection, link_prefix: impl Into<String>) -> Self {
        Self { db, link_prefix: link_prefix.into() }
    }

    pub async fn list(&self, page: u64, per_page: u64) -> AppResult<PaginatedMovies> {
        if page == 0 || per_page == 0 {
            return Err(AppError::Validation("page and per_page must be positive".to_string()));
        }

        let total = MovieRepository::count(&self.db).await?;
        if total == 0 || (page - 1).saturating_mul(per_page) >= total {
            return Err(AppError::NotFound("No movies found.".to_string()));
        }

        let rows = MovieRepository::page_summaries(&self.db, page, per_page).await?;
        let movies = rows.into_iter().map(MovieShort::try_from).collect::<AppResult<Vec<_>>>()?;

        debug!(page, per_page, total, returned = movies.len(), "listed movies");

        Ok(PaginatedMovies {
            movies,
            prev_page: (page > 1).then(|| self.page_link(page - 1, per_page)),
            next_page: (page.saturating_mul(per_page) < total)
                .then(|| self.page_link(page + 1, per_page)),
            total_pages: total.div_ceil(per_page),
            total_items: total,
        })
    }

    pub async fn get(&self, id: i32) -> AppResult<MovieRead> {
        let aggregate = MovieRepository::find_with_relations(&self.db, id, Relations::ALL)
            .await?
            .ok_or_else(AppError::movie_not_found)?;
        MovieRead::try_from(aggregate)
    }

    pub async fn create(&self, input: MovieCreate) -> AppResult<MovieRead> {
        input.validate(today())?;
        let date = input.date.to_string();

        if MovieRepository::find_by_name_and_date(&self.db, &input.name, &date).await?.is_some() {
            return Err(duplicate(&input.name, &date));
        }

        let txn = self.db.begin().await?;

        let country =
            resolver::resolve_or_create(&txn, &input.country, ReferenceKind::Country).await?;
        let genres =
            resolver::resolve_or_create_many(&txn, &input.genres, ReferenceKind::Genre).await?;
        let actors =
            resolver::resolve_or_create_many(&txn, &input.actors, ReferenceKind::Actor).await?;
        let languages =
            resolver::resolve_or_create_many(&txn, &input.languages, ReferenceKind::Language)
                .await?;

        let new = NewMovie {
            name: input.name.clone(),
            date: date.clone(),
            score: input.score,
            overview: input.overview,
            status: input.status,
            budget: input.budget,
            revenue: input.revenue,
            country_id: country.id,
            genre_ids: genres.iter().map(|r| r.id).collect(),
            actor_ids: actors.iter().map(|r| r.id).collect(),
            language_ids: languages.iter().map(|r| r.id).collect(),
        };

        let id = match MovieRepository::insert(&txn, new).await {
            Ok(id) => id,
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                return Err(duplicate(&input.name, &date));
            },
            Err(err) => return Err(err.into()),
        };
        txn.commit().await?;

        info!(
            movie_id = id,
            name = %input.name,
            country = %country.key,
            genres = genres.len(),
            actors = actors.len(),
            languages = languages.len(),
            "created movie"
        );

        self.get(id).await
    }

    pub async fn update(&self, id: i32, changes: MovieUpdate) -> AppResult<MovieRead> {
        changes.validate(today())?;

        let current = MovieRepository::find_with_relations(&self.db, id, Relations::NONE)
            .await?
            .ok_or_else(AppError::movie_not_found)?
            .movie;

        if changes.is_empty() {
            debug!(movie_id = id, "empty update, nothing to write");
            return self.get(id).await;
        }

        if changes.touches_identity() {
            let name = changes.name.as_deref().unwrap_or(&current.name);
            let date =
                changes.date.map(|d| d.to_string()).unwrap_or_else(|| current.date.clone());
            let existing = MovieRepository::find_by_name_and_date(&self.db, name, &date).await?;
            if existing.is_some_and(|other| other.id != id) {
                return Err(duplicate(name, &date));
            }
        }

        let txn = self.db.begin().await?;
        if let Err(err) = MovieRepository::update_fields(&txn, current, &changes).await {
            warn!(movie_id = id, error = %err, "movie update failed, rolling back");
            txn.rollback().await?;
            return Err(invalid_input());
        }
        if let Err(err) = txn.commit().await {
            warn!(movie_id = id, error = %err, "movie update commit failed");
            return Err(invalid_input());
        }

        debug!(movie_id = id, "updated movie");
        self.get(id).await
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        MovieRepository::find_with_relations(&self.db, id, Relations::NONE)
            .await?
            .ok_or_else(AppError::movie_not_found)?;

        let txn = self.db.begin().await?;
        let removed = MovieRepository::delete(&txn, id).await?;
        txn.commit().await?;

        if removed == 0 {
            return Err(AppError::movie_not_found());
        }
        info!(movie_id = id, "deleted movie");
        Ok(())
    }

    fn page_link(&self, page: u64, per_page: u64) -> String {
        format!("{}/movies/?page={page}&per_page={per_page}", self.link_prefix)
    }
}

fn today() -> Date {
    jiff::Zoned::now().date()
}

fn duplicate(name: &str, date: &str) -> AppError {
    AppError::Conflict(format!(
        "A movie with the name '{name}' and release date '{date}' already exists."
    ))
}

fn invalid_input() -> AppError {
    AppError::InvalidInput("Invalid input data.".to_string())
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl TryFrom<MovieSummaryRow> for MovieShort {
    type Error = AppError;

    fn try_from(row: MovieSummaryRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            date: row.date.parse()?,
            score: row.score,
            overview: row.overview,
        })
    }
}

impl TryFrom<MovieAggregate> for MovieRead {
    type Error = AppError;

    fn try_from(aggregate: MovieAggregate) -> AppResult<Self> {
        let MovieAggregate { movie, country, genres, actors, languages } = aggregate;
        let (Some(country), Some(genres), Some(actors), Some(languages)) =
            (country, genres, actors, languages)
        else {
            return Err(anyhow::anyhow!("movie {} loaded without all relations", movie.id).into());
        };

        Ok(Self {
            id: movie.id,
            name: movie.name,
            date: movie.date.parse()?,
            score: movie.score,
            overview: movie.overview,
            status: movie.status,
            budget: movie.budget,
            revenue: movie.revenue,
            country: CountryOut::from(country),
            genres: genres.into_iter().map(NamedOut::from).collect(),
            actors: actors.into_iter().map(NamedOut::from).collect(),
            languages: languages.into_iter().map(NamedOut::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use jiff::{ToSpan, civil::date};
    use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};

    use super::*;
    use crate::{
        db,
        entities::{country, genre, movie},
    };

    async fn service() -> MovieService {
        MovieService::new(db::connect_in_memory().await.unwrap(), "/theater")
    }

    fn payload(name: &str) -> MovieCreate {
        MovieCreate {
            name: name.to_string(),
            date: date(2016, 11, 11),
            score: 79.0,
            overview: "Linguist meets heptapods.".to_string(),
            status: "Released".to_string(),
            budget: 47_000_000.0,
            revenue: 203_400_000.0,
            country: "USA".to_string(),
            genres: vec!["Drama".to_string(), "Sci-Fi".to_string()],
            actors: vec!["Amy Adams".to_string(), "Jeremy Renner".to_string()],
            languages: vec!["English".to_string()],
        }
    }

    fn names(items: &[NamedOut]) -> Vec<&str> {
        let mut names: Vec<_> = items.iter().map(|n| n.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[tokio::test]
    async fn created_movie_reads_back_identically() {
        let svc = service().await;

        let created = svc.create(payload("Arrival")).await.unwrap();
        let fetched = svc.get(created.id).await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.name, "Arrival");
        assert_eq!(fetched.date, date(2016, 11, 11));
        assert_eq!(fetched.country.code, "USA");
        assert_eq!(names(&fetched.genres), ["Drama", "Sci-Fi"]);
        assert_eq!(names(&fetched.actors), ["Amy Adams", "Jeremy Renner"]);
        assert_eq!(names(&fetched.languages), ["English"]);
    }

    #[tokio::test]
    async fn empty_relation_lists_are_allowed() {
        let svc = service().await;
        let input = MovieCreate {
            genres: Vec::new(),
            actors: Vec::new(),
            languages: Vec::new(),
            ..payload("Koyaanisqatsi")
        };

        let created = svc.create(input).await.unwrap();

        assert!(created.genres.is_empty() && created.actors.is_empty());
        assert!(created.languages.is_empty());
        assert_eq!(created.country.code, "USA");
    }

    #[tokio::test]
    async fn duplicate_name_and_date_conflicts() {
        let svc = service().await;
        svc.create(payload("Arrival")).await.unwrap();

        let err = svc.create(payload("Arrival")).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(movie::Entity::find().count(&svc.db).await.unwrap(), 1);

        let other_date = MovieCreate { date: date(2017, 1, 1), ..payload("Arrival") };
        assert!(svc.create(other_date).await.is_ok());
    }

    #[tokio::test]
    async fn reference_rows_are_shared_between_movies() {
        let svc = service().await;

        let first = svc.create(payload("Arrival")).await.unwrap();
        let second = svc.create(payload("Sicario")).await.unwrap();

        assert_eq!(first.country, second.country);
        assert_eq!(first.genres, second.genres);
        assert_eq!(country::Entity::find().count(&svc.db).await.unwrap(), 1);
        assert_eq!(genre::Entity::find().count(&svc.db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn create_rejects_far_future_dates() {
        let svc = service().await;
        let too_late = today().checked_add(366.days()).unwrap();

        let err =
            svc.create(MovieCreate { date: too_late, ..payload("Dune") }).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(movie::Entity::find().count(&svc.db).await.unwrap(), 0);
        assert_eq!(country::Entity::find().count(&svc.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pagination_over_twenty_five_movies() {
        let svc = service().await;
        for i in 0..25 {
            svc.create(payload(&format!("Movie {i:02}"))).await.unwrap();
        }

        let first = svc.list(1, 10).await.unwrap();
        assert_eq!(first.movies.len(), 10);
        assert_eq!(first.movies[0].name, "Movie 24");
        assert_eq!(first.prev_page, None);
        assert_eq!(first.next_page.as_deref(), Some("/theater/movies/?page=2&per_page=10"));
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_items, 25);

        let last = svc.list(3, 10).await.unwrap();
        assert_eq!(last.movies.len(), 5);
        assert_eq!(last.movies[4].name, "Movie 00");
        assert_eq!(last.prev_page.as_deref(), Some("/theater/movies/?page=2&per_page=10"));
        assert_eq!(last.next_page, None);

        assert!(matches!(svc.list(4, 10).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn listing_an_empty_catalog_is_not_found() {
        let svc = service().await;
        assert!(matches!(svc.list(1, 10).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn exact_page_boundary_has_no_next_page() {
        let svc = service().await;
        for i in 0..20 {
            svc.create(payload(&format!("Movie {i:02}"))).await.unwrap();
        }

        let page = svc.list(2, 10).await.unwrap();

        assert_eq!(page.movies.len(), 10);
        assert_eq!(page.next_page, None);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn get_missing_movie_is_not_found() {
        let svc = service().await;
        assert!(matches!(svc.get(99).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn score_only_update_leaves_everything_else() {
        let svc = service().await;
        let before = svc.create(payload("Arrival")).await.unwrap();

        let changes: MovieUpdate = serde_json::from_str(r#"{"score": 99.5}"#).unwrap();
        let after = svc.update(before.id, changes).await.unwrap();

        assert_eq!(after.score, 99.5);
        assert_eq!(MovieRead { score: before.score, ..after.clone() }, before);
        assert_eq!(svc.get(before.id).await.unwrap(), after);
    }

    #[tokio::test]
    async fn empty_update_returns_current_movie() {
        let svc = service().await;
        let before = svc.create(payload("Arrival")).await.unwrap();

        let after = svc.update(before.id, MovieUpdate::default()).await.unwrap();

        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn update_rejects_far_future_date() {
        let svc = service().await;
        let before = svc.create(payload("Arrival")).await.unwrap();
        let changes = MovieUpdate {
            date: Some(today().checked_add(400.days()).unwrap()),
            name: Some("Arrival II".to_string()),
            ..Default::default()
        };

        let err = svc.update(before.id, changes).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(svc.get(before.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn update_missing_movie_is_not_found() {
        let svc = service().await;
        let changes = MovieUpdate { score: Some(10.0), ..Default::default() };
        assert!(matches!(svc.update(5, changes).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_into_existing_name_and_date_conflicts() {
        let svc = service().await;
        svc.create(payload("Arrival")).await.unwrap();
        let other = svc.create(payload("Sicario")).await.unwrap();

        let rename = MovieUpdate { name: Some("Arrival".to_string()), ..Default::default() };
        let err = svc.update(other.id, rename).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(svc.get(other.id).await.unwrap().name, "Sicario");
    }

    #[tokio::test]
    async fn renaming_to_own_name_is_not_a_conflict() {
        let svc = service().await;
        let movie = svc.create(payload("Arrival")).await.unwrap();

        let same = MovieUpdate {
            name: Some("Arrival".to_string()),
            status: Some("Classic".to_string()),
            ..Default::default()
        };
        let updated = svc.update(movie.id, same).await.unwrap();

        assert_eq!(updated.status, "Classic");
    }

    #[tokio::test]
    async fn rejected_write_rolls_back_as_invalid_input() {
        let svc = service().await;
        let movie = svc.create(payload("Arrival")).await.unwrap();
        svc.db
            .execute_unprepared(
                "CREATE TRIGGER movie_read_only BEFORE UPDATE ON movie \
                 BEGIN SELECT RAISE(ABORT, 'read only'); END",
            )
            .await
            .unwrap();

        let changes = MovieUpdate { score: Some(5.0), ..Default::default() };
        let err = svc.update(movie.id, changes).await.unwrap_err();

        assert!(matches!(&err, AppError::InvalidInput(msg) if msg == "Invalid input data."));
        let stored = movie::Entity::find_by_id(movie.id).one(&svc.db).await.unwrap().unwrap();
        assert_eq!(stored.score, 79.0);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let svc = service().await;
        let movie = svc.create(payload("Arrival")).await.unwrap();

        svc.delete(movie.id).await.unwrap();

        assert!(matches!(svc.get(movie.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(svc.delete(movie.id).await, Err(AppError::NotFound(_))));
        assert_eq!(country::Entity::find().count(&svc.db).await.unwrap(), 1);
        assert_eq!(genre::Entity::find().count(&svc.db).await.unwrap(), 2);
    }
}
