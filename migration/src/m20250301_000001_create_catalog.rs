use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Country::Table)
                    .if_not_exists()
                    .col(pk_auto(Country::Id))
                    .col(string_uniq(Country::Code))
                    .col(string_null(Country::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(pk_auto(Genre::Id))
                    .col(string_uniq(Genre::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Actor::Table)
                    .if_not_exists()
                    .col(pk_auto(Actor::Id))
                    .col(string_uniq(Actor::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Language::Table)
                    .if_not_exists()
                    .col(pk_auto(Language::Id))
                    .col(string_uniq(Language::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Movie::Table)
                    .if_not_exists()
                    .col(pk_auto(Movie::Id))
                    .col(string_len(Movie::Name, 255))
                    .col(string(Movie::Date))
                    .col(double(Movie::Score))
                    .col(text(Movie::Overview))
                    .col(string(Movie::Status))
                    .col(double(Movie::Budget))
                    .col(double(Movie::Revenue))
                    .col(integer(Movie::CountryId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_country")
                            .from(Movie::Table, Movie::CountryId)
                            .to(Country::Table, Country::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movie_country_id")
                    .table(Movie::Table)
                    .col(Movie::CountryId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MovieGenre::Table)
                    .if_not_exists()
                    .col(integer(MovieGenre::MovieId))
                    .col(integer(MovieGenre::GenreId))
                    .primary_key(Index::create().col(MovieGenre::MovieId).col(MovieGenre::GenreId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_genre_movie")
                            .from(MovieGenre::Table, MovieGenre::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_genre_genre")
                            .from(MovieGenre::Table, MovieGenre::GenreId)
                            .to(Genre::Table, Genre::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MovieActor::Table)
                    .if_not_exists()
                    .col(integer(MovieActor::MovieId))
                    .col(integer(MovieActor::ActorId))
                    .primary_key(Index::create().col(MovieActor::MovieId).col(MovieActor::ActorId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_actor_movie")
                            .from(MovieActor::Table, MovieActor::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_actor_actor")
                            .from(MovieActor::Table, MovieActor::ActorId)
                            .to(Actor::Table, Actor::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MovieLanguage::Table)
                    .if_not_exists()
                    .col(integer(MovieLanguage::MovieId))
                    .col(integer(MovieLanguage::LanguageId))
                    .primary_key(
                        Index::create().col(MovieLanguage::MovieId).col(MovieLanguage::LanguageId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_language_movie")
                            .from(MovieLanguage::Table, MovieLanguage::MovieId)
                            .to(Movie::Table, Movie::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_movie_language_language")
                            .from(MovieLanguage::Table, MovieLanguage::LanguageId)
                            .to(Language::Table, Language::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(MovieLanguage::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(MovieActor::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(MovieGenre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movie::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Language::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Actor::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Country::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Country {
    Table,
    Id,
    Code,
    Name,
}

#[derive(DeriveIden)]
enum Genre {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Actor {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Language {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Movie {
    Table,
    Id,
    Name,
    Date,
    Score,
    Overview,
    Status,
    Budget,
    Revenue,
    CountryId,
}

#[derive(DeriveIden)]
enum MovieGenre {
    Table,
    MovieId,
    GenreId,
}

#[derive(DeriveIden)]
enum MovieActor {
    Table,
    MovieId,
    ActorId,
}

#[derive(DeriveIden)]
enum MovieLanguage {
    Table,
    MovieId,
    LanguageId,
}
