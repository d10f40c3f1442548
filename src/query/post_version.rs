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
        predicate::{LikeWrap, equals, like_match},
        tags::{TagQueryOptions, compile_tag_query, source_filters},
        user_name_filter,
    },
    post::{SharedFields, apply_shared_fields},
    present,
};

/// Search over the post version ledger.
///
/// `tags` accepts the post search meta-tags, so `order:`, `limit:` and `page:` apply to the version
/// listing. The added and removed tag columns match tag names literally.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct PostVersionSearch {
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub post_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub updater_id: Option<String>,
    #[validate(length(max = 255))]
    pub updater_name: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub sources: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub old_sources: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub added_tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub removed_tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub locked_tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub added_locked_tags: Option<String>,
    #[validate(length(min = 0, max = 1024))]
    pub removed_locked_tags: Option<String>,
    pub rating: Option<String>,
    pub old_rating: Option<String>,
    pub rating_lock: Option<String>,
    pub old_rating_lock: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub old_parent_id: Option<String>,
    #[validate(length(max = 1024))]
    pub description: Option<String>,
    #[validate(length(max = 1024))]
    pub old_description: Option<String>,
    #[validate(length(max = 1024))]
    pub title: Option<String>,
    #[validate(length(max = 1024))]
    pub old_title: Option<String>,
    #[validate(length(max = 1024))]
    pub reason: Option<String>,
}

const TAG_COLUMNS: &[&str] = &["added_tags", "removed_tags"];
const LOCKED_TAG_COLUMNS: &[&str] = &["added_locked_tags", "removed_locked_tags"];

pub async fn compile<L: UserDirectory + FileLookup + ?Sized>(
    search: &PostVersionSearch,
    mut pagination: Pagination,
    default_limit: u32,
    lookup: &L,
    config: &Config,
) -> Result<Statement, Error> {
    let mut filters = Filters::default();
    let mut order = None;
    let wildcard = config.wildcard_character;

    if let Some(id) = present(&search.post_id).and_then(util::parse_id) {
        filters.push(Some(equals("pv.post_id", id)));
    }
    if let Some(id) = present(&search.updater_id).and_then(util::parse_id) {
        filters.push(Some(equals("pv.updater_id", id)));
    }
    if let Some(name) = present(&search.updater_name) {
        filters.push(user_name_filter("pv.updater_id", name, lookup, config).await?);
    }
    if let Some(sources) = present(&search.sources) {
        source_filters(&mut filters, "pv", "sources", sources, config);
    }
    if let Some(sources) = present(&search.old_sources) {
        source_filters(&mut filters, "pv", "old_sources", sources, config);
    }

    if let Some(tags) = present(&search.tags) {
        let options = TagQueryOptions {
            column: "tags",
            table_alias: "pv",
            context: MetaContext::Search,
        };
        let query =
            compile_tag_query(tags, pagination, default_limit, &options, lookup, config).await?;
        if let Some(limit) = query.limit {
            pagination.limit = limit;
        }
        if let Some(offset) = query.offset {
            pagination.offset = offset;
        }
        order = query.order;
        filters.extend(query.filters);
    }

    let tag_fields = [&search.added_tags, &search.removed_tags];
    let locked_tag_fields = [&search.added_locked_tags, &search.removed_locked_tags];
    let literal_columns = TAG_COLUMNS
        .iter()
        .zip(tag_fields)
        .chain(LOCKED_TAG_COLUMNS.iter().zip(locked_tag_fields));
    for (column, field) in literal_columns {
        let Some(value) = present(field) else {
            continue;
        };
        let options = TagQueryOptions {
            column,
            table_alias: "pv",
            context: MetaContext::Disabled,
        };
        let query =
            compile_tag_query(value, pagination, default_limit, &options, lookup, config).await?;
        filters.extend(query.filters);
    }

    if let Some(rating) = present(&search.old_rating).and_then(|r| r.parse::<Rating>().ok()) {
        filters.push(Some(equals("pv.old_rating", rating.as_str())));
    }
    if let Some(rating_lock) = present(&search.old_rating_lock) {
        // an explicit "none" is recorded for a lock that was cleared
        match RatingLock::parse_optional(rating_lock) {
            Ok(lock) => filters.push(Some(equals(
                "pv.old_rating_lock",
                lock.map(|l| l.as_str()).unwrap_or("none"),
            ))),
            Err(_) => log::debug!("Ignoring invalid rating lock filter '{rating_lock}'"),
        }
    }
    if let Some(parent_id) = present(&search.parent_id).and_then(util::parse_id) {
        filters.push(Some(equals("pv.parent_id", parent_id)));
    }
    if let Some(parent_id) = present(&search.old_parent_id).and_then(util::parse_id) {
        filters.push(Some(equals("pv.old_parent_id", parent_id)));
    }
    if let Some(description) = present(&search.old_description) {
        filters.push(like_match(
            "pv.old_description",
            description,
            LikeWrap::Both,
            wildcard,
        ));
    }
    if let Some(title) = present(&search.old_title) {
        filters.push(like_match("pv.old_title", title, LikeWrap::Both, wildcard));
    }
    if let Some(reason) = present(&search.reason) {
        filters.push(like_match("pv.reason", reason, LikeWrap::Both, wildcard));
    }

    let shared = SharedFields {
        locked_tags: present(&search.locked_tags),
        rating: present(&search.rating),
        rating_lock: present(&search.rating_lock),
        description: present(&search.description),
        title: present(&search.title),
    };
    apply_shared_fields(
        &mut filters,
        shared,
        "pv",
        pagination,
        default_limit,
        lookup,
        config,
    )
    .await?;

    assemble_statement("post_versions", "pv", filters, order.as_ref(), pagination)
}
