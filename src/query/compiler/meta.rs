use crate::model::TagCategory;

pub const BOOLEAN_META_TAGS: &[&str] = &[
    "hassources",
    "hasdescription",
    "hastitle",
    "haslockedtags",
    "isparent",
    "ischild",
    "inpool",
    "approved",
    "deleted",
    "pending",
];

pub const FUNCTIONAL_META_TAGS: &[&str] = &[
    "newpool", "pool", "newset", "set", "vote", "fav", "lock", "locked", "rating",
];

pub const SEARCH_META_TAGS: &[&str] = &[
    "hassources",
    "hasdescription",
    "hastitle",
    "haslockedtags",
    "isparent",
    "ischild",
    "inpool",
    "approved",
    "deleted",
    "pending",
    "user",
    "user_id",
    "approver",
    "approver_id",
    "commenter",
    "commenter_id",
    "flagger",
    "flagger_id",
    "del",
    "del_id",
    "id",
    "pool",
    "parent",
    "child",
    "rating",
    "lock",
    "locked",
    "score",
    "favcount",
    "commentcount",
    "filesize",
    "duration",
    "type",
    "delreason",
    "description",
    "title",
    "source",
    "votedup",
    "voteddown",
    "order",
    "limit",
    "page",
    "md5",
];

/// Which meta-tags are recognized when resolving a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaContext {
    /// Search strings, search meta-tags only.
    Search,
    /// Tag strings applied to a post, functional meta-tags and category prefixes.
    Mutation,
    /// Every token is a plain tag name.
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionalMetaTag {
    Pool,
    NewPool,
    Set,
    NewSet,
    Vote,
    Fav,
    Lock,
    Rating,
}

impl FunctionalMetaTag {
    fn from_name(name: &str) -> Option<FunctionalMetaTag> {
        match name {
            "pool" => Some(FunctionalMetaTag::Pool),
            "newpool" => Some(FunctionalMetaTag::NewPool),
            "set" => Some(FunctionalMetaTag::Set),
            "newset" => Some(FunctionalMetaTag::NewSet),
            "vote" => Some(FunctionalMetaTag::Vote),
            "fav" => Some(FunctionalMetaTag::Fav),
            "lock" | "locked" => Some(FunctionalMetaTag::Lock),
            "rating" => Some(FunctionalMetaTag::Rating),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BooleanMetaTag {
    HasSources,
    HasDescription,
    HasTitle,
    HasLockedTags,
    IsParent,
    IsChild,
    InPool,
    Approved,
    Deleted,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMetaTag {
    Boolean(BooleanMetaTag),
    User,
    UserId,
    Approver,
    ApproverId,
    Id,
    Pool,
    Parent,
    Child,
    Rating,
    Lock,
    Score,
    FavCount,
    CommentCount,
    Filesize,
    Duration,
    Type,
    Description,
    Title,
    Source,
    VotedUp,
    VotedDown,
    Order,
    Limit,
    Page,
    Md5,
    /// Recognized so the token is not searched as a tag, but there is nothing to filter on.
    Unsupported,
}

impl SearchMetaTag {
    fn from_name(name: &str) -> Option<SearchMetaTag> {
        let tag = match name {
            "hassources" => SearchMetaTag::Boolean(BooleanMetaTag::HasSources),
            "hasdescription" => SearchMetaTag::Boolean(BooleanMetaTag::HasDescription),
            "hastitle" => SearchMetaTag::Boolean(BooleanMetaTag::HasTitle),
            "haslockedtags" => SearchMetaTag::Boolean(BooleanMetaTag::HasLockedTags),
            "isparent" => SearchMetaTag::Boolean(BooleanMetaTag::IsParent),
            "ischild" => SearchMetaTag::Boolean(BooleanMetaTag::IsChild),
            "inpool" => SearchMetaTag::Boolean(BooleanMetaTag::InPool),
            "approved" => SearchMetaTag::Boolean(BooleanMetaTag::Approved),
            "deleted" => SearchMetaTag::Boolean(BooleanMetaTag::Deleted),
            "pending" => SearchMetaTag::Boolean(BooleanMetaTag::Pending),
            "user" => SearchMetaTag::User,
            "user_id" => SearchMetaTag::UserId,
            "approver" => SearchMetaTag::Approver,
            "approver_id" => SearchMetaTag::ApproverId,
            "id" => SearchMetaTag::Id,
            "pool" => SearchMetaTag::Pool,
            "parent" => SearchMetaTag::Parent,
            "child" => SearchMetaTag::Child,
            "rating" => SearchMetaTag::Rating,
            "lock" | "locked" => SearchMetaTag::Lock,
            "score" => SearchMetaTag::Score,
            "favcount" => SearchMetaTag::FavCount,
            "commentcount" => SearchMetaTag::CommentCount,
            "filesize" => SearchMetaTag::Filesize,
            "duration" => SearchMetaTag::Duration,
            "type" => SearchMetaTag::Type,
            "description" => SearchMetaTag::Description,
            "title" => SearchMetaTag::Title,
            "source" => SearchMetaTag::Source,
            "votedup" => SearchMetaTag::VotedUp,
            "voteddown" => SearchMetaTag::VotedDown,
            "order" => SearchMetaTag::Order,
            "limit" => SearchMetaTag::Limit,
            "page" => SearchMetaTag::Page,
            "md5" => SearchMetaTag::Md5,
            "commenter" | "commenter_id" | "flagger" | "flagger_id" | "del" | "del_id"
            | "delreason" => SearchMetaTag::Unsupported,
            _ => return None,
        };
        Some(tag)
    }
}

/// The meaning of a single token of a tag string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaTag<'a> {
    Plain(&'a str),
    Category(TagCategory, &'a str),
    Functional(FunctionalMetaTag, &'a str),
    Search(SearchMetaTag, &'a str),
}

/// Strip a leading negation marker, a lone `-` is not negated.
pub fn split_negation(token: &str) -> (bool, &str) {
    match token.strip_prefix('-') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, token),
    }
}

/// Split `meta:value` on the first colon if `meta` case-insensitively matches one of `valid_meta`.
///
/// Returns the lower-cased meta name and the untouched remainder, `None` if the token is a plain tag name.
pub fn parse_meta_tag<'a>(token: &'a str, valid_meta: &[&str]) -> Option<(String, &'a str)> {
    let (meta, value) = token.split_once(':')?;
    let meta = meta.to_lowercase();
    if valid_meta.iter().any(|valid| valid.eq_ignore_ascii_case(&meta)) {
        Some((meta, value))
    } else {
        None
    }
}

/// Resolve the meaning of a token, unrecognized `namespace:value` tokens are plain tag names.
pub fn resolve_meta_tag(token: &str, context: MetaContext) -> MetaTag<'_> {
    match context {
        MetaContext::Disabled => MetaTag::Plain(token),
        MetaContext::Search => match parse_meta_tag(token, SEARCH_META_TAGS) {
            Some((meta, value)) => SearchMetaTag::from_name(&meta)
                .map(|tag| MetaTag::Search(tag, value))
                .unwrap_or(MetaTag::Plain(token)),
            None => MetaTag::Plain(token),
        },
        MetaContext::Mutation => {
            let Some((meta, value)) = token.split_once(':') else {
                return MetaTag::Plain(token);
            };
            if let Ok(category) = meta.parse::<TagCategory>() {
                MetaTag::Category(category, value)
            } else if let Some(functional) = FunctionalMetaTag::from_name(&meta.to_lowercase()) {
                MetaTag::Functional(functional, value)
            } else {
                MetaTag::Plain(token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BOOLEAN_META_TAGS, BooleanMetaTag, FunctionalMetaTag, MetaContext, MetaTag, SEARCH_META_TAGS, SearchMetaTag,
        parse_meta_tag, resolve_meta_tag, split_negation,
    };
    use crate::model::TagCategory;

    #[test]
    fn test_parse_meta_tag() {
        assert_eq!(parse_meta_tag("fox", SEARCH_META_TAGS), None);
        assert_eq!(
            parse_meta_tag("ORDER:score", SEARCH_META_TAGS),
            Some((String::from("order"), "score"))
        );
        assert_eq!(
            parse_meta_tag("source:http://example.com", SEARCH_META_TAGS),
            Some((String::from("source"), "http://example.com"))
        );
        assert_eq!(parse_meta_tag("foo:bar", SEARCH_META_TAGS), None);
    }

    #[test]
    fn test_unrecognized_namespace_is_plain() {
        assert_eq!(
            resolve_meta_tag("foo:bar", MetaContext::Search),
            MetaTag::Plain("foo:bar")
        );
        assert_eq!(
            resolve_meta_tag("vote:up", MetaContext::Search),
            MetaTag::Plain("vote:up")
        );
        assert_eq!(
            resolve_meta_tag("order:score", MetaContext::Disabled),
            MetaTag::Plain("order:score")
        );
        assert_eq!(
            resolve_meta_tag("artist:foo", MetaContext::Search),
            MetaTag::Plain("artist:foo")
        );
    }

    #[test]
    fn test_resolve_contexts() {
        assert_eq!(
            resolve_meta_tag("Artist:someone", MetaContext::Mutation),
            MetaTag::Category(TagCategory::Artist, "someone")
        );
        assert_eq!(
            resolve_meta_tag("locked:exact", MetaContext::Mutation),
            MetaTag::Functional(FunctionalMetaTag::Lock, "exact")
        );
        assert_eq!(
            resolve_meta_tag("newset:x", MetaContext::Mutation),
            MetaTag::Functional(FunctionalMetaTag::NewSet, "x")
        );
        assert_eq!(
            resolve_meta_tag("hassources:true", MetaContext::Search),
            MetaTag::Search(
                SearchMetaTag::Boolean(BooleanMetaTag::HasSources),
                "true"
            )
        );
        assert_eq!(
            resolve_meta_tag("delreason:x", MetaContext::Search),
            MetaTag::Search(SearchMetaTag::Unsupported, "x")
        );
    }

    #[test]
    fn test_boolean_tags_are_search_tags() {
        for name in BOOLEAN_META_TAGS {
            let token = format!("{name}:true");
            assert!(matches!(
                resolve_meta_tag(&token, MetaContext::Search),
                MetaTag::Search(SearchMetaTag::Boolean(_), "true")
            ));
        }
    }

    #[test]
    fn test_split_negation() {
        assert_eq!(split_negation("-canine"), (true, "canine"));
        assert_eq!(split_negation("canine"), (false, "canine"));
        assert_eq!(split_negation("-"), (false, "-"));
    }
}
