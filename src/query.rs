use std::{fmt, str::FromStr};

use serde::Serialize;
use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    perms::Actor,
    store::{FileLookup, UserDirectory},
    util,
};

use self::{
    compiler::predicate::SqlValue, favorite::FavoriteSearch, file::FileSearch, post::PostSearch,
    post_version::PostVersionSearch, tag::TagSearch,
};

pub mod compiler;
pub mod favorite;
pub mod file;
pub mod post;
pub mod post_version;
pub mod tag;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ordering {
    pub expression: String,
    pub direction: Direction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A compiled statement with positional `$n` placeholders and their values in order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    pub fn resolve(
        limit: Option<&str>,
        page: Option<&str>,
        default_limit: u32,
        config: &Config,
    ) -> Pagination {
        let (limit, offset) = util::parse_limit(limit, page, default_limit, config);
        Pagination { limit, offset }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    Post,
    PostVersion,
    Tag,
    Favorite,
    File,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Post => "post",
            SearchKind::PostVersion => "post_version",
            SearchKind::Tag => "tag",
            SearchKind::Favorite => "favorite",
            SearchKind::File => "file",
        }
    }
}

impl FromStr for SearchKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "post" | "posts" => Ok(SearchKind::Post),
            "post_version" | "post_versions" => Ok(SearchKind::PostVersion),
            "tag" | "tags" => Ok(SearchKind::Tag),
            "favorite" | "favorites" => Ok(SearchKind::Favorite),
            "file" | "files" => Ok(SearchKind::File),
            _ => Err(Error::InvalidRequestInputError(format!(
                "Unknown search kind '{s}'"
            ))),
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum SearchFilter {
    Post(PostSearch),
    PostVersion(PostVersionSearch),
    Tag(TagSearch),
    Favorite(FavoriteSearch),
    File(FileSearch),
}

impl SearchFilter {
    /// Deserialize the filter object for `kind`.
    pub fn from_json(kind: SearchKind, value: serde_json::Value) -> Result<SearchFilter, Error> {
        fn parse<T: serde::de::DeserializeOwned>(
            kind: SearchKind,
            value: serde_json::Value,
        ) -> Result<T, Error> {
            serde_json::from_value(value).map_err(|e| {
                Error::InvalidRequestInputError(format!("Invalid {kind} search filter: {e}"))
            })
        }

        Ok(match kind {
            SearchKind::Post => SearchFilter::Post(parse(kind, value)?),
            SearchKind::PostVersion => SearchFilter::PostVersion(parse(kind, value)?),
            SearchKind::Tag => SearchFilter::Tag(parse(kind, value)?),
            SearchKind::Favorite => SearchFilter::Favorite(parse(kind, value)?),
            SearchKind::File => SearchFilter::File(parse(kind, value)?),
        })
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            SearchFilter::Post(_) => SearchKind::Post,
            SearchFilter::PostVersion(_) => SearchKind::PostVersion,
            SearchFilter::Tag(_) => SearchKind::Tag,
            SearchFilter::Favorite(_) => SearchKind::Favorite,
            SearchFilter::File(_) => SearchKind::File,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        let (name, result) = match self {
            SearchFilter::Post(f) => ("PostSearch", f.validate()),
            SearchFilter::PostVersion(f) => ("PostVersionSearch", f.validate()),
            SearchFilter::Tag(f) => ("TagSearch", f.validate()),
            SearchFilter::Favorite(f) => ("FavoriteSearch", f.validate()),
            SearchFilter::File(f) => ("FileSearch", f.validate()),
        };
        result.map_err(|e| {
            Error::InvalidRequestInputError(format!("Validation failed for {name}: {e}"))
        })
    }
}

/// Compile a search filter to a parameterized select statement.
///
/// The limit defaults to the actor's posts per page, `page` accepts a page number or an `a<id>` / `b<id>`
/// cursor. `limit:` and `page:` meta-tags in the tag string take precedence.
pub async fn compile_search<L: UserDirectory + FileLookup + ?Sized>(
    filter: &SearchFilter,
    limit: Option<&str>,
    page: Option<&str>,
    actor: &Actor,
    lookup: &L,
    config: &Config,
) -> Result<Statement, Error> {
    filter.validate()?;

    let default_limit = actor.posts_per_page(config);
    let pagination = Pagination::resolve(limit, page, default_limit, config);

    let start_time = if log::log_enabled!(log::Level::Debug) {
        Some(std::time::Instant::now())
    } else {
        None
    };

    let statement = match filter {
        SearchFilter::Post(search) => {
            post::compile(search, pagination, default_limit, lookup, config).await?
        }
        SearchFilter::PostVersion(search) => {
            post_version::compile(search, pagination, default_limit, lookup, config).await?
        }
        SearchFilter::Tag(search) => tag::compile(search, pagination, config)?,
        SearchFilter::Favorite(search) => {
            favorite::compile(search, pagination, lookup, config).await?
        }
        SearchFilter::File(search) => file::compile(search, pagination)?,
    };

    if let Some(start_time) = start_time {
        log::debug!(
            "Compiled {} query {:?} (in {} microseconds) to sql {}",
            filter.kind(),
            filter,
            start_time.elapsed().as_micros(),
            &statement.sql
        );
    }

    Ok(statement)
}

/// The trimmed value of an optional filter field, `None` if absent or blank.
pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
