use jiff::{ToSpan, civil::Date};
use sea_orm::Set;
use serde::{Deserialize, Serialize};

use crate::{
    entities::{actor, country, genre, language, movie},
    error::{AppError, AppResult},
};

pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_PER_PAGE: u64 = 50;

#[derive(Clone, Debug, Deserialize)]
pub struct MovieCreate {
    pub name: String,
    #[serde(deserialize_with = "iso_date::deserialize")]
    pub date: Date,
    pub score: f64,
    pub overview: String,
    pub status: String,
    pub budget: f64,
    pub revenue: f64,
    /// Country code, resolved or created on insert.
    pub country: String,
    pub genres: Vec<String>,
    pub actors: Vec<String>,
    pub languages: Vec<String>,
}

impl MovieCreate {
    pub fn validate(&self, today: Date) -> AppResult<()> {
        validate_name(&self.name)?;
        validate_release_date(self.date, today)?;
        validate_score(self.score)?;
        validate_amount("budget", self.budget)?;
        validate_amount("revenue", self.revenue)?;
        Ok(())
    }
}

/// Partial update of the scalar movie fields. `None` (absent or `null`) leaves the
/// column untouched; relations are not updatable here.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MovieUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "iso_date::deserialize_option")]
    pub date: Option<Date>,
    pub score: Option<f64>,
    pub overview: Option<String>,
    pub status: Option<String>,
    pub budget: Option<f64>,
    pub revenue: Option<f64>,
}

impl MovieUpdate {
    pub fn validate(&self, today: Date) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(date) = self.date {
            validate_release_date(date, today)?;
        }
        if let Some(score) = self.score {
            validate_score(score)?;
        }
        if let Some(budget) = self.budget {
            validate_amount("budget", budget)?;
        }
        if let Some(revenue) = self.revenue {
            validate_amount("revenue", revenue)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.date.is_none()
            && self.score.is_none()
            && self.overview.is_none()
            && self.status.is_none()
            && self.budget.is_none()
            && self.revenue.is_none()
    }

    pub fn touches_identity(&self) -> bool {
        self.name.is_some() || self.date.is_some()
    }

    /// Writes every present field into `active`; absent fields keep their current state.
    pub fn merge_into(&self, active: &mut movie::ActiveModel) {
        if let Some(name) = &self.name {
            active.name = Set(name.clone());
        }
        if let Some(date) = self.date {
            active.date = Set(date.to_string());
        }
        if let Some(score) = self.score {
            active.score = Set(score);
        }
        if let Some(overview) = &self.overview {
            active.overview = Set(overview.clone());
        }
        if let Some(status) = &self.status {
            active.status = Set(status.clone());
        }
        if let Some(budget) = self.budget {
            active.budget = Set(budget);
        }
        if let Some(revenue) = self.revenue {
            active.revenue = Set(revenue);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

impl ListQuery {
    pub fn validate(&self) -> AppResult<()> {
        if self.page < 1 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if !(1..=MAX_PER_PAGE).contains(&self.per_page) {
            return Err(AppError::Validation(format!(
                "per_page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(())
    }
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    10
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountryOut {
    pub id: i32,
    pub code: String,
    pub name: Option<String>,
}

impl From<country::Model> for CountryOut {
    fn from(row: country::Model) -> Self {
        Self { id: row.id, code: row.code, name: row.name }
    }
}

/// Shape shared by genres, actors and languages.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamedOut {
    pub id: i32,
    pub name: String,
}

impl From<genre::Model> for NamedOut {
    fn from(row: genre::Model) -> Self {
        Self { id: row.id, name: row.name }
    }
}

impl From<actor::Model> for NamedOut {
    fn from(row: actor::Model) -> Self {
        Self { id: row.id, name: row.name }
    }
}

impl From<language::Model> for NamedOut {
    fn from(row: language::Model) -> Self {
        Self { id: row.id, name: row.name }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovieRead {
    pub id: i32,
    pub name: String,
    pub date: Date,
    pub score: f64,
    pub overview: String,
    pub status: String,
    pub budget: f64,
    pub revenue: f64,
    pub country: CountryOut,
    pub genres: Vec<NamedOut>,
    pub actors: Vec<NamedOut>,
    pub languages: Vec<NamedOut>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovieShort {
    pub id: i32,
    pub name: String,
    pub date: Date,
    pub score: f64,
    pub overview: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaginatedMovies {
    pub movies: Vec<MovieShort>,
    pub prev_page: Option<String>,
    pub next_page: Option<String>,
    pub total_pages: u64,
    pub total_items: u64,
}

/// Request dates are plain `YYYY-MM-DD`; datetimes and the compact `YYYYMMDD` form are
/// rejected rather than truncated.
mod iso_date {
    use jiff::civil::Date;
    use serde::{Deserialize, Deserializer, de::Error};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(de)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<Date>, D::Error> {
        Option::<String>::deserialize(de)?
            .map(|raw| parse(&raw))
            .transpose()
            .map_err(D::Error::custom)
    }

    fn parse(raw: &str) -> Result<Date, String> {
        Date::strptime(FORMAT, raw)
            .map_err(|_| format!("date must be formatted as YYYY-MM-DD, got '{raw}'"))
    }
}

/// Latest release date accepted for a movie written on `today`.
pub fn latest_release_date(today: Date) -> AppResult<Date> {
    Ok(today.checked_add(365.days())?)
}

pub fn validate_release_date(date: Date, today: Date) -> AppResult<()> {
    if date > latest_release_date(today)? {
        return Err(AppError::Validation(
            "Date must not be more than one year in the future.".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_score(score: f64) -> AppResult<()> {
    if !(0.0..=100.0).contains(&score) {
        return Err(AppError::Validation("score must be between 0 and 100".to_string()));
    }
    Ok(())
}

fn validate_amount(field: &str, value: f64) -> AppResult<()> {
    if value.is_nan() || value < 0.0 {
        return Err(AppError::Validation(format!("{field} must not be negative")));
    }
    Ok(())
}
