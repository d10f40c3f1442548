use serde::Deserialize;
use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    model::{Rating, RatingLock},
    store::{FileLookup, UserDirectory},
    util::{self, deserialize_string_from_number},
};

use super::{
    Pagination, Statement,
    compiler::{
        Filters, assemble_statement,
        meta::MetaContext,
        predicate::{LikeWrap, array_contains, equals, is_null, like_match},
        tags::{TagQueryOptions, compile_tag_query, source_filters},
        user_name_filter,
    },
    present,
};

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct PostSearch {
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub uploader_id: Option<String>,
    #[validate(length(max = 255))]
    pub uploader_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub approver_id: Option<String>,
    #[validate(length(max = 255))]
    pub approver_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub parent_id: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub sources: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub locked_tags: Option<String>,
    pub rating: Option<String>,
    pub rating_lock: Option<String>,
    /// Whitespace separated post ids that must all be children.
    #[validate(length(max = 1024))]
    pub children: Option<String>,
    #[validate(length(max = 1024))]
    pub pools: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    #[validate(length(max = 1024))]
    pub title: Option<String>,
}

pub const POST_TAGS: TagQueryOptions<'static> = TagQueryOptions {
    column: "tags",
    table_alias: "p",
    context: MetaContext::Search,
};

pub async fn compile<L: UserDirectory + FileLookup + ?Sized>(
    search: &PostSearch,
    pagination: Pagination,
    default_limit: u32,
    lookup: &L,
    config: &Config,
) -> Result<Statement, Error> {
    let mut filters = Filters::default();
    let mut pagination = pagination;
    let mut order = None;

    if let Some(id) = present(&search.uploader_id).and_then(util::parse_id) {
        filters.push(Some(equals("p.uploader_id", id)));
    }
    if let Some(name) = present(&search.uploader_name) {
        filters.push(user_name_filter("p.uploader_id", name, lookup, config).await?);
    }
    if let Some(id) = present(&search.approver_id).and_then(util::parse_id) {
        filters.push(Some(equals("p.approver_id", id)));
    }
    if let Some(name) = present(&search.approver_name) {
        filters.push(user_name_filter("p.approver_id", name, lookup, config).await?);
    }
    if let Some(parent_id) = present(&search.parent_id) {
        if parent_id.eq_ignore_ascii_case("none") {
            filters.push(Some(is_null("p.parent_id", true)));
        } else if let Some(id) = util::parse_id(parent_id) {
            filters.push(Some(equals("p.parent_id", id)));
        }
    }
    if let Some(sources) = present(&search.sources) {
        source_filters(&mut filters, "p", "sources", sources, config);
    }
    if let Some(tags) = present(&search.tags) {
        let query = compile_tag_query(tags, pagination, default_limit, &POST_TAGS, lookup, config)
            .await?;
        if let Some(limit) = query.limit {
            pagination.limit = limit;
        }
        if let Some(offset) = query.offset {
            pagination.offset = offset;
        }
        order = query.order;
        filters.extend(query.filters);
    }
    if let Some(children) = present(&search.children) {
        for id in children.split_whitespace().filter_map(util::parse_id) {
            filters.push(Some(array_contains("p.children", id)));
        }
    }
    if let Some(pools) = present(&search.pools) {
        for id in pools.split_whitespace().filter_map(util::parse_id) {
            filters.push(Some(array_contains("p.pools", id)));
        }
    }

    apply_shared_fields(
        &mut filters,
        SharedFields::from(search),
        "p",
        pagination,
        default_limit,
        lookup,
        config,
    )
    .await?;

    assemble_statement("posts", "p", filters, order.as_ref(), pagination)
}

/// Filters on columns present on both posts and their versions.
pub(super) struct SharedFields<'a> {
    pub locked_tags: Option<&'a str>,
    pub rating: Option<&'a str>,
    pub rating_lock: Option<&'a str>,
    pub description: Option<&'a str>,
    pub title: Option<&'a str>,
}

impl<'a> From<&'a PostSearch> for SharedFields<'a> {
    fn from(search: &'a PostSearch) -> Self {
        SharedFields {
            locked_tags: present(&search.locked_tags),
            rating: present(&search.rating),
            rating_lock: present(&search.rating_lock),
            description: present(&search.description),
            title: present(&search.title),
        }
    }
}

pub(super) async fn apply_shared_fields<L: UserDirectory + FileLookup + ?Sized>(
    filters: &mut Filters,
    fields: SharedFields<'_>,
    alias: &str,
    pagination: Pagination,
    default_limit: u32,
    lookup: &L,
    config: &Config,
) -> Result<(), Error> {
    let col = |column: &str| format!("{alias}.{column}");

    if let Some(locked_tags) = fields.locked_tags {
        let options = TagQueryOptions {
            column: "locked_tags",
            table_alias: alias,
            context: MetaContext::Disabled,
        };
        let query = compile_tag_query(
            locked_tags,
            pagination,
            default_limit,
            &options,
            lookup,
            config,
        )
        .await?;
        filters.extend(query.filters);
    }
    if let Some(rating) = fields.rating.and_then(|r| r.parse::<Rating>().ok()) {
        filters.push(Some(equals(&col("rating"), rating.as_str())));
    }
    if let Some(rating_lock) = fields.rating_lock {
        match RatingLock::parse_optional(rating_lock) {
            Ok(Some(lock)) => filters.push(Some(equals(&col("rating_lock"), lock.as_str()))),
            Ok(None) => filters.push(Some(is_null(&col("rating_lock"), true))),
            Err(_) => log::debug!("Ignoring invalid rating lock filter '{rating_lock}'"),
        }
    }
    if let Some(description) = fields.description {
        filters.push(like_match(
            &col("description"),
            description,
            LikeWrap::Both,
            config.wildcard_character,
        ));
    }
    if let Some(title) = fields.title {
        filters.push(like_match(
            &col("title"),
            title,
            LikeWrap::Both,
            config.wildcard_character,
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{PostSearch, compile};
    use crate::{
        config::Config,
        model::UserLevel,
        query::{Pagination, compiler::predicate::SqlValue},
        store::memory::MemoryStore,
    };

    fn pagination() -> Pagination {
        Pagination {
            limit: 75,
            offset: 0,
        }
    }

    #[tokio::test]
    async fn test_empty_search() {
        let store = MemoryStore::new();
        let statement = compile(
            &PostSearch::default(),
            pagination(),
            75,
            &store,
            &Config::default(),
        )
        .await
        .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT p.* FROM posts p ORDER BY id DESC LIMIT 75 OFFSET 0"
        );
        assert!(statement.values.is_empty());
    }

    #[tokio::test]
    async fn test_field_filters() {
        let store = MemoryStore::new();
        let uploader = store.add_user("uploader", UserLevel::Member);
        let search = PostSearch {
            uploader_name: Some(String::from("uploader")),
            approver_name: Some(String::from("missing")),
            parent_id: Some(String::from("none")),
            rating: Some(String::from("q")),
            pools: Some(String::from("4 x 0")),
            title: Some(String::from("sun*set")),
            ..PostSearch::default()
        };

        let statement = compile(&search, pagination(), 75, &store, &Config::default())
            .await
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT p.* FROM posts p WHERE p.uploader_id = $1 AND p.parent_id IS NULL AND p.pools @> ARRAY[$2] AND p.rating = $3 AND p.title LIKE $4 ORDER BY id DESC LIMIT 75 OFFSET 0"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Int(uploader),
                SqlValue::Int(4),
                SqlValue::from("questionable"),
                SqlValue::from("%sun%set%"),
            ]
        );
    }

    #[tokio::test]
    async fn test_sources_and_wildcard_tags_share_joins() {
        let store = MemoryStore::new();
        let search = PostSearch {
            sources: Some(String::from("example.com/*")),
            tags: Some(String::from("fox* page:2")),
            ..PostSearch::default()
        };

        let statement = compile(&search, pagination(), 75, &store, &Config::default())
            .await
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT p.* FROM posts p, unnest(p.sources) AS sources_elem, unnest(p.tags) AS tags_elem WHERE sources_elem LIKE $1 AND tags_elem LIKE $2 ORDER BY id DESC LIMIT 75 OFFSET 75"
        );
        assert_eq!(
            statement.values,
            vec![SqlValue::from("%example.com/%"), SqlValue::from("fox%")]
        );
    }

    #[tokio::test]
    async fn test_numeric_strings_deserialize() {
        let search: PostSearch =
            serde_json::from_value(serde_json::json!({ "uploader_id": 12, "parent_id": "7" }))
                .unwrap();
        assert_eq!(search.uploader_id.as_deref(), Some("12"));

        let store = MemoryStore::new();
        let statement = compile(&search, pagination(), 75, &store, &Config::default())
            .await
            .unwrap();
        assert_eq!(statement.values, vec![SqlValue::Int(12), SqlValue::Int(7)]);
    }
}
