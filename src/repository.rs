use std::collections::HashSet;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult,
    IntoActiveModel, ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};

use crate::{
    entities::{actor, country, genre, language, movie, movie_actor, movie_genre, movie_language},
    models::MovieUpdate,
};

/// Which relations to load alongside a movie row.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Relations {
    pub country: bool,
    pub genres: bool,
    pub actors: bool,
    pub languages: bool,
}

impl Relations {
    pub const NONE: Self = Self { country: false, genres: false, actors: false, languages: false };
    pub const ALL: Self = Self { country: true, genres: true, actors: true, languages: true };
}

/// A movie row plus whatever relations were requested. Relations that were not
/// requested stay `None`, which is distinct from a loaded empty set.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieAggregate {
    pub movie: movie::Model,
    pub country: Option<country::Model>,
    pub genres: Option<Vec<genre::Model>>,
    pub actors: Option<Vec<actor::Model>>,
    pub languages: Option<Vec<language::Model>>,
}

#[derive(Clone, Debug, PartialEq, FromQueryResult)]
pub struct MovieSummaryRow {
    pub id: i32,
    pub name: String,
    pub date: String,
    pub score: f64,
    pub overview: String,
}

#[derive(Clone, Debug)]
pub struct NewMovie {
    pub name: String,
    pub date: String,
    pub score: f64,
    pub overview: String,
    pub status: String,
    pub budget: f64,
    pub revenue: f64,
    pub country_id: i32,
    pub genre_ids: Vec<i32>,
    pub actor_ids: Vec<i32>,
    pub language_ids: Vec<i32>,
}

pub struct MovieRepository;

impl MovieRepository {
    pub async fn count<C: ConnectionTrait>(conn: &C) -> Result<u64, DbErr> {
        movie::Entity::find().count(conn).await
    }

    /// Newest first. `page` is 1-based.
    pub async fn page_summaries<C: ConnectionTrait>(
        conn: &C,
        page: u64,
        per_page: u64,
    ) -> Result<Vec<MovieSummaryRow>, DbErr> {
        movie::Entity::find()
            .select_only()
            .columns([
                movie::Column::Id,
                movie::Column::Name,
                movie::Column::Date,
                movie::Column::Score,
                movie::Column::Overview,
            ])
            .order_by_desc(movie::Column::Id)
            .into_model::<MovieSummaryRow>()
            .paginate(conn, per_page)
            .fetch_page(page.saturating_sub(1))
            .await
    }

    pub async fn find_with_relations<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        include: Relations,
    ) -> Result<Option<MovieAggregate>, DbErr> {
        let Some(movie) = movie::Entity::find_by_id(id).one(conn).await? else {
            return Ok(None);
        };
        Self::load_relations(conn, movie, include).await.map(Some)
    }

    pub async fn load_relations<C: ConnectionTrait>(
        conn: &C,
        movie: movie::Model,
        include: Relations,
    ) -> Result<MovieAggregate, DbErr> {
        let (country, genres, actors, languages) = futures::try_join!(
            async {
                if include.country {
                    movie.find_related(country::Entity).one(conn).await
                } else {
                    Ok(None)
                }
            },
            async {
                if include.genres {
                    movie
                        .find_related(genre::Entity)
                        .order_by_asc(genre::Column::Id)
                        .all(conn)
                        .await
                        .map(Some)
                } else {
                    Ok(None)
                }
            },
            async {
                if include.actors {
                    movie
                        .find_related(actor::Entity)
                        .order_by_asc(actor::Column::Id)
                        .all(conn)
                        .await
                        .map(Some)
                } else {
                    Ok(None)
                }
            },
            async {
                if include.languages {
                    movie
                        .find_related(language::Entity)
                        .order_by_asc(language::Column::Id)
                        .all(conn)
                        .await
                        .map(Some)
                } else {
                    Ok(None)
                }
            },
        )?;

        Ok(MovieAggregate { movie, country, genres, actors, languages })
    }

    pub async fn find_by_name_and_date<C: ConnectionTrait>(
        conn: &C,
        name: &str,
        date: &str,
    ) -> Result<Option<movie::Model>, DbErr> {
        movie::Entity::find()
            .filter(movie::Column::Name.eq(name))
            .filter(movie::Column::Date.eq(date))
            .one(conn)
            .await
    }

    /// Inserts the movie row and its association rows. Duplicate ids in any of the
    /// relation lists are attached once.
    pub async fn insert<C: ConnectionTrait>(conn: &C, new: NewMovie) -> Result<i32, DbErr> {
        let row = movie::ActiveModel {
            id: NotSet,
            name: Set(new.name),
            date: Set(new.date),
            score: Set(new.score),
            overview: Set(new.overview),
            status: Set(new.status),
            budget: Set(new.budget),
            revenue: Set(new.revenue),
            country_id: Set(new.country_id),
        }
        .insert(conn)
        .await?;

        let genres: Vec<_> = dedup_ids(&new.genre_ids)
            .into_iter()
            .map(|genre_id| movie_genre::ActiveModel {
                movie_id: Set(row.id),
                genre_id: Set(genre_id),
            })
            .collect();
        if !genres.is_empty() {
            movie_genre::Entity::insert_many(genres).exec_without_returning(conn).await?;
        }

        let actors: Vec<_> = dedup_ids(&new.actor_ids)
            .into_iter()
            .map(|actor_id| movie_actor::ActiveModel {
                movie_id: Set(row.id),
                actor_id: Set(actor_id),
            })
            .collect();
        if !actors.is_empty() {
            movie_actor::Entity::insert_many(actors).exec_without_returning(conn).await?;
        }

        let languages: Vec<_> = dedup_ids(&new.language_ids)
            .into_iter()
            .map(|language_id| movie_language::ActiveModel {
                movie_id: Set(row.id),
                language_id: Set(language_id),
            })
            .collect();
        if !languages.is_empty() {
            movie_language::Entity::insert_many(languages).exec_without_returning(conn).await?;
        }

        Ok(row.id)
    }

    /// Applies the present fields of `changes` to `current`. Returns the row unchanged
    /// without touching the store when nothing is present.
    pub async fn update_fields<C: ConnectionTrait>(
        conn: &C,
        current: movie::Model,
        changes: &MovieUpdate,
    ) -> Result<movie::Model, DbErr> {
        let mut active = current.clone().into_active_model();
        changes.merge_into(&mut active);
        if !active.is_changed() {
            return Ok(current);
        }
        active.update(conn).await
    }

    /// Removes the movie and its association rows. Reference rows are left alone.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, DbErr> {
        movie_genre::Entity::delete_many()
            .filter(movie_genre::Column::MovieId.eq(id))
            .exec(conn)
            .await?;
        movie_actor::Entity::delete_many()
            .filter(movie_actor::Column::MovieId.eq(id))
            .exec(conn)
            .await?;
        movie_language::Entity::delete_many()
            .filter(movie_language::Column::MovieId.eq(id))
            .exec(conn)
            .await?;

        let result = movie::Entity::delete_by_id(id).exec(conn).await?;
        Ok(result.rows_affected)
    }
}

fn dedup_ids(ids: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
