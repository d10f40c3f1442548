use crate::{
    config::Config,
    error::Error,
    model::{PostFlags, Rating, RatingLock},
    query::Pagination,
    store::{FileLookup, UserDirectory},
    util,
};

use super::{
    Filters, md5_filter,
    meta::{BooleanMetaTag, MetaContext, MetaTag, SearchMetaTag, resolve_meta_tag, split_negation},
    order::{OrderDirective, parse_order},
    predicate::{
        LikeWrap, NumberKind, Predicate, SqlValue, array_contains, array_is_empty, equals,
        is_null, like_match, with_operator,
    },
    unnest_join, unresolved_filter, user_name_filter,
};

/// The array column a tag string is matched against.
#[derive(Clone, Copy, Debug)]
pub struct TagQueryOptions<'a> {
    pub column: &'a str,
    pub table_alias: &'a str,
    pub context: MetaContext,
}

/// Filters, pagination and ordering collected from a tag string.
#[derive(Clone, Debug, Default)]
pub struct TagQuery {
    pub filters: Filters,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub order: Option<OrderDirective>,
}

/// Compile a whitespace separated tag string, processing tokens left to right.
///
/// Later `limit:`, `page:` and `order:` tokens overwrite earlier ones, `page:` is resolved against the
/// limit in effect when it is encountered.
pub async fn compile_tag_query<L: UserDirectory + FileLookup + ?Sized>(
    input: &str,
    pagination: Pagination,
    default_limit: u32,
    options: &TagQueryOptions<'_>,
    lookup: &L,
    config: &Config,
) -> Result<TagQuery, Error> {
    let tokens = input.split_whitespace().collect::<Vec<_>>();
    if tokens.len() > config.tag_query_limit {
        return Err(Error::IllegalQueryInputError(format!(
            "Exceeded maximum number of tags of {} (supplied {}).",
            config.tag_query_limit,
            tokens.len()
        )));
    }

    let mut query = TagQuery::default();
    let mut current_limit = pagination.limit;
    for token in tokens {
        let (negated, body) = split_negation(token);
        match resolve_meta_tag(body, options.context) {
            MetaTag::Search(SearchMetaTag::Order, value) => match parse_order(value) {
                Some(OrderDirective::Popular) => {
                    log::debug!("Ordering by popularity is not supported, ignoring order:{value}")
                }
                Some(order) => query.order = Some(order),
                None => log::debug!("Ignoring unknown order '{value}'"),
            },
            MetaTag::Search(SearchMetaTag::Limit, value) => {
                if value.trim().parse::<i64>().is_ok() {
                    current_limit = util::parse_limit(Some(value), None, default_limit, config).0;
                    query.limit = Some(current_limit);
                }
            }
            MetaTag::Search(SearchMetaTag::Page, value) => {
                let limit = current_limit.to_string();
                let (_, offset) =
                    util::parse_limit(Some(&limit), Some(value), default_limit, config);
                query.offset = Some(offset);
            }
            MetaTag::Search(meta, value) => {
                let predicate = search_meta_predicate(
                    meta,
                    value,
                    negated,
                    &mut query.filters,
                    options.table_alias,
                    lookup,
                    config,
                )
                .await?;
                query.filters.push(predicate);
            }
            MetaTag::Plain(_) | MetaTag::Category(..) | MetaTag::Functional(..) => {
                let predicate = plain_tag_predicate(body, negated, &mut query.filters, options, config);
                query.filters.push(predicate);
            }
        }
    }

    Ok(query)
}

/// Containment for exact names, per element LIKE matching through an unnest join for wildcards.
///
/// All positive wildcards of a column share one unnest join, so `a* b*` needs a single tag matching both
/// patterns, and a row is returned once per matching tag since the select is not distinct.
fn plain_tag_predicate(
    name: &str,
    negated: bool,
    filters: &mut Filters,
    options: &TagQueryOptions<'_>,
    config: &Config,
) -> Option<Predicate> {
    let name = name.to_lowercase();
    let column = format!("{}.{}", options.table_alias, options.column);
    let wildcard = config.wildcard_character;

    if !name.contains(wildcard) {
        let predicate = array_contains(&column, name);
        return Some(if negated { predicate.negate() } else { predicate });
    }

    if negated {
        let element = format!("{}_excluded", options.column);
        Some(Predicate::new(
            format!("NOT EXISTS (SELECT 1 FROM unnest({column}) AS {element} WHERE {element} LIKE ?)"),
            vec![SqlValue::Text(util::parse_wildcards(&name, wildcard))],
        ))
    } else {
        let (join, element) = unnest_join(options.table_alias, options.column);
        filters.add_join(join);
        like_match(&element, &name, LikeWrap::None, wildcard)
    }
}

/// Source patterns match the end of any source of the row, each whitespace separated pattern must match.
pub fn source_filters(
    filters: &mut Filters,
    table_alias: &str,
    column: &str,
    value: &str,
    config: &Config,
) {
    for source in value.split_whitespace() {
        let predicate = source_predicate(filters, table_alias, column, source, false, config);
        filters.push(predicate);
    }
}

fn source_predicate(
    filters: &mut Filters,
    table_alias: &str,
    column: &str,
    source: &str,
    negated: bool,
    config: &Config,
) -> Option<Predicate> {
    if negated {
        let element = format!("{column}_excluded");
        let predicate = like_match(&element, source, LikeWrap::Leading, config.wildcard_character)?;
        Some(Predicate::new(
            format!(
                "NOT EXISTS (SELECT 1 FROM unnest({table_alias}.{column}) AS {element} WHERE {})",
                predicate.sql
            ),
            predicate.values,
        ))
    } else {
        let (join, element) = unnest_join(table_alias, column);
        let predicate = like_match(&element, source, LikeWrap::Leading, config.wildcard_character)?;
        filters.add_join(join);
        Some(predicate)
    }
}

async fn search_meta_predicate<L: UserDirectory + FileLookup + ?Sized>(
    meta: SearchMetaTag,
    value: &str,
    negated: bool,
    filters: &mut Filters,
    alias: &str,
    lookup: &L,
    config: &Config,
) -> Result<Option<Predicate>, Error> {
    let col = |column: &str| format!("{alias}.{column}");
    let wildcard = config.wildcard_character;

    let predicate = match meta {
        SearchMetaTag::Boolean(tag) => Some(boolean_predicate(
            tag,
            util::parse_boolean(value) == Some(true),
            alias,
        )),
        SearchMetaTag::User => user_name_filter(&col("uploader_id"), value, lookup, config).await?,
        SearchMetaTag::UserId => util::parse_id(value).map(|id| equals(&col("uploader_id"), id)),
        SearchMetaTag::Approver => {
            user_name_filter(&col("approver_id"), value, lookup, config).await?
        }
        SearchMetaTag::ApproverId => {
            util::parse_id(value).map(|id| equals(&col("approver_id"), id))
        }
        SearchMetaTag::Id => with_operator(&col("id"), value, NumberKind::Int),
        SearchMetaTag::Pool => util::parse_id(value).map(|id| array_contains(&col("pools"), id)),
        SearchMetaTag::Parent => {
            if value.eq_ignore_ascii_case("none") {
                Some(is_null(&col("parent_id"), true))
            } else {
                util::parse_id(value).map(|id| equals(&col("parent_id"), id))
            }
        }
        SearchMetaTag::Child => {
            util::parse_id(value).map(|id| array_contains(&col("children"), id))
        }
        SearchMetaTag::Rating => value
            .parse::<Rating>()
            .ok()
            .map(|rating| equals(&col("rating"), rating.as_str())),
        SearchMetaTag::Lock => match RatingLock::parse_optional(value) {
            Ok(Some(lock)) => Some(equals(&col("rating_lock"), lock.as_str())),
            Ok(None) => Some(is_null(&col("rating_lock"), true)),
            Err(_) => None,
        },
        SearchMetaTag::Score => with_operator(&col("score"), value, NumberKind::Int),
        SearchMetaTag::FavCount => with_operator(&col("favorite_count"), value, NumberKind::Int),
        SearchMetaTag::CommentCount => {
            with_operator(&col("comment_count"), value, NumberKind::Int)
        }
        SearchMetaTag::Filesize => with_operator(&col("filesize"), value, NumberKind::Int),
        SearchMetaTag::Duration => with_operator(&col("duration"), value, NumberKind::Float),
        SearchMetaTag::Type => {
            (!value.is_empty()).then(|| equals(&col("file_type"), value.to_lowercase()))
        }
        SearchMetaTag::Description => {
            like_match(&col("description"), value, LikeWrap::Both, wildcard)
        }
        SearchMetaTag::Title => like_match(&col("title"), value, LikeWrap::Both, wildcard),
        SearchMetaTag::Source => {
            // negation is part of the predicate, the unnest join cannot express exclusion
            return Ok(source_predicate(
                filters, alias, "sources", value, negated, config,
            ));
        }
        SearchMetaTag::VotedUp | SearchMetaTag::VotedDown => {
            let vote_type = if meta == SearchMetaTag::VotedUp {
                "up"
            } else {
                "down"
            };
            match lookup.name_to_id(value).await? {
                Some(user_id) => Some(Predicate::new(
                    format!(
                        "EXISTS (SELECT 1 FROM post_votes v WHERE v.post_id = {alias}.id AND v.user_id = ? AND v.vote_type = ?)"
                    ),
                    vec![SqlValue::Int(user_id), SqlValue::from(vote_type)],
                )),
                None => unresolved_filter("post_votes.user_id", value, config),
            }
        }
        SearchMetaTag::Md5 => md5_filter(&col("id"), value, lookup, config).await?,
        SearchMetaTag::Unsupported
        | SearchMetaTag::Order
        | SearchMetaTag::Limit
        | SearchMetaTag::Page => None,
    };

    Ok(predicate.map(|p| if negated { p.negate() } else { p }))
}

fn boolean_predicate(tag: BooleanMetaTag, value: bool, alias: &str) -> Predicate {
    let col = |column: &str| format!("{alias}.{column}");
    let flag_predicate = |flag: PostFlags, set: bool| {
        Predicate::raw(format!(
            "({} & {}) {} {}",
            col("flags"),
            flag.bits(),
            if set { "=" } else { "!=" },
            flag.bits()
        ))
    };
    let blank_predicate = |column: &str, present: bool| {
        Predicate::raw(format!(
            "{} {} ''",
            col(column),
            if present { "!=" } else { "=" }
        ))
    };

    match tag {
        BooleanMetaTag::HasSources => array_is_empty(&col("sources"), !value),
        BooleanMetaTag::HasDescription => blank_predicate("description", value),
        BooleanMetaTag::HasTitle => blank_predicate("title", value),
        BooleanMetaTag::HasLockedTags => array_is_empty(&col("locked_tags"), !value),
        BooleanMetaTag::IsParent => array_is_empty(&col("children"), !value),
        BooleanMetaTag::IsChild => is_null(&col("parent_id"), !value),
        BooleanMetaTag::InPool => array_is_empty(&col("pools"), !value),
        BooleanMetaTag::Approved => flag_predicate(PostFlags::PENDING, !value),
        BooleanMetaTag::Deleted => flag_predicate(PostFlags::DELETED, value),
        BooleanMetaTag::Pending => flag_predicate(PostFlags::PENDING, value),
    }
}

#[cfg(test)]
mod tests {
    use super::{TagQueryOptions, compile_tag_query};
    use crate::{
        config::Config,
        query::{
            Direction, Ordering, Pagination,
            compiler::{meta::MetaContext, order::OrderDirective, predicate::SqlValue},
        },
        store::memory::MemoryStore,
    };

    const POSTS: TagQueryOptions<'static> = TagQueryOptions {
        column: "tags",
        table_alias: "p",
        context: MetaContext::Search,
    };

    fn pagination() -> Pagination {
        Pagination {
            limit: 75,
            offset: 0,
        }
    }

    #[tokio::test]
    async fn test_plain_and_negated_tags() {
        let store = MemoryStore::new();
        let config = Config::default();
        let query = compile_tag_query("Fox -canine", pagination(), 75, &POSTS, &store, &config)
            .await
            .unwrap();

        let sql = query
            .filters
            .predicates
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sql, vec!["p.tags @> ARRAY[?]", "NOT (p.tags @> ARRAY[?])"]);
        assert_eq!(query.filters.predicates[0].values, vec![SqlValue::from("fox")]);
        assert!(query.filters.joins.is_empty());
    }

    #[tokio::test]
    async fn test_wildcards_add_single_join() {
        let store = MemoryStore::new();
        let config = Config::default();
        let query = compile_tag_query(
            "fox* *_ears -wolf*",
            pagination(),
            75,
            &POSTS,
            &store,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(query.filters.joins, vec!["unnest(p.tags) AS tags_elem"]);
        assert_eq!(query.filters.predicates[0].sql, "tags_elem LIKE ?");
        assert_eq!(
            query.filters.predicates[1].values,
            vec![SqlValue::from("%_ears")]
        );
        assert_eq!(
            query.filters.predicates[2].sql,
            "NOT EXISTS (SELECT 1 FROM unnest(p.tags) AS tags_excluded WHERE tags_excluded LIKE ?)"
        );
    }

    #[tokio::test]
    async fn test_pagination_and_order_overrides() {
        let store = MemoryStore::new();
        let config = Config::default();
        let query = compile_tag_query(
            "order:id limit:10 page:3 order:score_asc",
            pagination(),
            75,
            &POSTS,
            &store,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
        assert_eq!(
            query.order,
            Some(OrderDirective::Column(Ordering {
                expression: String::from("score"),
                direction: Direction::Ascending,
            }))
        );
        assert!(query.filters.predicates.is_empty());
    }

    #[tokio::test]
    async fn test_page_uses_limit_in_effect() {
        let store = MemoryStore::new();
        let config = Config::default();
        let query = compile_tag_query("page:2 limit:10", pagination(), 75, &POSTS, &store, &config)
            .await
            .unwrap();
        assert_eq!(query.offset, Some(75));
        assert_eq!(query.limit, Some(10));
    }

    #[tokio::test]
    async fn test_md5_resolves_to_owning_post() {
        let store = MemoryStore::new();
        let config = Config::default();
        store.add_file(9, "0123456789abcdef0123456789abcdef", true);
        store.add_file(9, "fedcba9876543210fedcba9876543210", false);

        let query = compile_tag_query(
            "md5:fedcba9876543210fedcba9876543210",
            pagination(),
            75,
            &POSTS,
            &store,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(query.filters.predicates.len(), 1);
        assert_eq!(query.filters.predicates[0].values, vec![SqlValue::Int(9)]);
    }

    #[tokio::test]
    async fn test_extreme_page_values() {
        let store = MemoryStore::new();
        let config = Config::default();
        for (tags, offset) in [
            ("page:0", 0),
            ("page:abc", 0),
            ("limit:10 page:18446744073709551615", crate::util::MAX_OFFSET),
        ] {
            let query = compile_tag_query(tags, pagination(), 75, &POSTS, &store, &config)
                .await
                .unwrap();
            assert_eq!(query.offset, Some(offset), "{tags}");
        }
    }

    #[tokio::test]
    async fn test_unknown_order_and_user_are_dropped() {
        let store = MemoryStore::new();
        let config = Config::default();
        let query = compile_tag_query(
            "order:sideways user:nobody",
            pagination(),
            75,
            &POSTS,
            &store,
            &config,
        )
        .await
        .unwrap();
        assert_eq!(query.order, None);
        assert!(query.filters.predicates.is_empty());

        let strict = Config {
            strict_lookup_filters: true,
            ..Config::default()
        };
        let query = compile_tag_query("user:nobody", pagination(), 75, &POSTS, &store, &strict)
            .await
            .unwrap();
        assert_eq!(query.filters.predicates[0].sql, "FALSE");
    }

    #[tokio::test]
    async fn test_search_meta_tags() {
        let store = MemoryStore::new();
        let user_id = store.add_user("someone", crate::model::UserLevel::Member);
        let config = Config::default();
        let query = compile_tag_query(
            "user:someone score:>=5 rating:e -pending:true lock:none source:example.com hasdescription:true",
            pagination(),
            75,
            &POSTS,
            &store,
            &config,
        )
        .await
        .unwrap();

        let sql = query
            .filters
            .predicates
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            sql,
            vec![
                "p.uploader_id = ?",
                "p.score >= ?",
                "p.rating = ?",
                "NOT ((p.flags & 1) = 1)",
                "p.rating_lock IS NULL",
                "sources_elem LIKE ?",
                "p.description != ''",
            ]
        );
        assert_eq!(query.filters.predicates[0].values, vec![SqlValue::Int(user_id)]);
        assert_eq!(
            query.filters.predicates[2].values,
            vec![SqlValue::from("explicit")]
        );
        assert_eq!(
            query.filters.predicates[5].values,
            vec![SqlValue::from("%example.com")]
        );
        assert_eq!(query.filters.joins, vec!["unnest(p.sources) AS sources_elem"]);
    }

    #[tokio::test]
    async fn test_disabled_context_treats_meta_as_tags() {
        let store = MemoryStore::new();
        let config = Config::default();
        let options = TagQueryOptions {
            column: "added_tags",
            table_alias: "pv",
            context: MetaContext::Disabled,
        };
        let query = compile_tag_query("order:score", pagination(), 75, &options, &store, &config)
            .await
            .unwrap();
        assert_eq!(query.order, None);
        assert_eq!(query.filters.predicates[0].sql, "pv.added_tags @> ARRAY[?]");
        assert_eq!(
            query.filters.predicates[0].values,
            vec![SqlValue::from("order:score")]
        );
    }

    #[tokio::test]
    async fn test_too_many_tags() {
        let store = MemoryStore::new();
        let config = Config {
            tag_query_limit: 2,
            ..Config::default()
        };
        assert!(
            compile_tag_query("a b c", pagination(), 75, &POSTS, &store, &config)
                .await
                .is_err()
        );
    }
}
