use serde::Deserialize;
use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    model::{
        InitialVersionTags, Post, PostUpdate, PostVersion, Rating, RatingLock, TagCategory,
        TagCounts, VoteType,
    },
    perms::{self, Actor},
    query::compiler::meta::{FunctionalMetaTag, MetaContext, MetaTag, resolve_meta_tag, split_negation},
    store::Store,
    tag::{create::create_tag, get_or_create_tag, validation::validate_tag_name},
    util::{dedup_preserve_order, deserialize_double_option, parse_boolean},
};

use super::{favorite, history::next_version, vote::vote};

/// Versioned fields of a post to change, `None` leaves a field untouched.
///
/// `tag_counts` is derived from the tags and not recorded in the version.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct PostChanges {
    #[validate(length(max = 100))]
    pub sources: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    #[validate(length(max = 100))]
    pub locked_tags: Option<Vec<String>>,
    pub rating: Option<Rating>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub rating_lock: Option<Option<RatingLock>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub parent_id: Option<Option<i64>>,
    #[validate(length(max = 50000))]
    pub description: Option<String>,
    #[validate(length(max = 300))]
    pub title: Option<String>,
    #[serde(skip)]
    pub tag_counts: Option<TagCounts>,
    #[validate(length(max = 300))]
    pub reason: Option<String>,
}

impl PostChanges {
    pub fn is_empty(&self) -> bool {
        self.sources.is_none()
            && self.tags.is_none()
            && self.locked_tags.is_none()
            && self.rating.is_none()
            && self.rating_lock.is_none()
            && self.parent_id.is_none()
            && self.description.is_none()
            && self.title.is_none()
    }

    fn to_update(&self) -> PostUpdate {
        PostUpdate {
            sources: self.sources.clone(),
            tags: self.tags.clone(),
            locked_tags: self.locked_tags.clone(),
            rating: self.rating,
            rating_lock: self.rating_lock,
            parent_id: self.parent_id,
            description: self.description.clone(),
            title: self.title.clone(),
            tag_counts: self.tag_counts,
            ..PostUpdate::default()
        }
    }
}

/// Record a new version of `post` containing `changes` and apply them to the post row.
///
/// Version insert and post update are committed together only if the stored revision still matches
/// `post.revision`, otherwise this fails with [`Error::ConcurrentModificationError`]. Returns `None` if
/// `changes` touches no versioned field. `post` is refreshed on success.
pub async fn edit_post<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    actor: &Actor,
    ip_address: Option<&str>,
    changes: PostChanges,
) -> Result<Option<PostVersion>, Error> {
    changes
        .validate()
        .map_err(|e| Error::InvalidRequestInputError(format!("Validation failed for PostChanges: {e}")))?;
    if changes.is_empty() {
        return Ok(None);
    }

    let new_version = next_version(post, actor, ip_address, &changes);
    let update = changes.to_update();
    let version = store
        .append_post_version(post.id, post.revision, new_version, &update)
        .await?
        .ok_or(Error::ConcurrentModificationError(post.id))?;

    if !version.added_tags.is_empty() || !version.removed_tags.is_empty() {
        store
            .adjust_tag_post_counts(&version.added_tags, &version.removed_tags)
            .await?;
    }

    update.apply_to(post);
    post.version = version.id;
    post.versions.push(version.id);
    post.revision = version.revision;
    post.updated_at = Some(version.created_at);

    log::debug!(
        "Created version {} (revision {}) of post {}",
        version.id,
        version.revision,
        post.id
    );
    Ok(Some(version))
}

async fn count_tags<S: Store + ?Sized>(store: &S, tags: &[String]) -> Result<TagCounts, Error> {
    let categories = store.get_tag_categories(tags).await?;
    Ok(TagCounts::from_categories(tags.iter().map(|name| {
        categories
            .get(name)
            .copied()
            .unwrap_or(TagCategory::General)
    })))
}

/// Collect the validation errors of a tag name, returns false if there were any.
fn check_name(name: &str, errors: &mut Vec<String>) -> bool {
    let violations = validate_tag_name(name);
    let valid = violations.is_empty();
    errors.extend(violations.into_iter().map(|e| format!("{e} ({name})")));
    valid
}

/// Apply a tag string to `post`, replacing its tags and executing functional meta-tags.
///
/// Problems with single tokens are collected as soft errors and returned, the remaining tokens are still
/// applied. A name that is negated anywhere in the string is removed regardless of token order. During
/// the initial application at post creation the tags are folded into the creation version, otherwise all
/// changes are recorded as one new version.
pub async fn apply_tags<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    actor: &Actor,
    ip_address: Option<&str>,
    tag_string: &str,
    initial: bool,
    config: &Config,
) -> Result<Vec<String>, Error> {
    let mut errors = Vec::new();
    let mut tags: Vec<String> = Vec::new();
    let mut negated: Vec<String> = Vec::new();
    let mut rating = None;
    let mut rating_lock = None;

    for token in tag_string.split_whitespace() {
        let (negate, body) = split_negation(token);
        match resolve_meta_tag(body, MetaContext::Mutation) {
            MetaTag::Plain(name) => {
                let name = name.to_lowercase();
                if !check_name(&name, &mut errors) {
                    continue;
                }
                if negate {
                    if !negated.contains(&name) {
                        negated.push(name);
                    }
                    continue;
                }
                get_or_create_tag(store, &name, actor, ip_address).await?;
                tags.push(name);
            }
            MetaTag::Category(category, name) => {
                let name = name.to_lowercase();
                if !check_name(&name, &mut errors) {
                    continue;
                }
                if negate {
                    if !negated.contains(&name) {
                        negated.push(name);
                    }
                    continue;
                }
                match store.get_tag_by_name(&name).await? {
                    Some(tag) if tag.category != category => errors.push(format!(
                        "Tag categories cannot be changed with a meta prefix if they already exist. ({name})"
                    )),
                    Some(_) => {}
                    None => {
                        create_tag(store, &name, category, false, actor, ip_address).await?;
                    }
                }
                tags.push(name);
            }
            MetaTag::Functional(_, _) if negate => {
                errors.push(format!("Functional meta-tags cannot be negated. ({token})"));
            }
            MetaTag::Functional(meta, value) => match meta {
                // pools and sets are accepted without effect
                FunctionalMetaTag::Pool
                | FunctionalMetaTag::NewPool
                | FunctionalMetaTag::Set
                | FunctionalMetaTag::NewSet => {}
                FunctionalMetaTag::Vote => match value.parse::<VoteType>() {
                    Ok(_) if actor.is_anonymous() => {
                        errors.push(format!("You must be logged in to vote. ({token})"))
                    }
                    Ok(vote_type) => {
                        vote(store, post, actor, vote_type, ip_address).await?;
                    }
                    Err(()) => errors.push(format!("Invalid vote type \"{value}\" ({token})")),
                },
                FunctionalMetaTag::Fav => {
                    if actor.is_anonymous() {
                        errors.push(format!("You must be logged in to favorite posts. ({token})"));
                        continue;
                    }
                    match parse_boolean(value) {
                        Some(false) => {
                            favorite::unfavorite(store, actor, post).await?;
                        }
                        parsed => {
                            if parsed.is_none() {
                                errors.push(format!(
                                    "Invalid favorite value \"{value}\", looking for true/false. ({token})"
                                ));
                            }
                            favorite::favorite(store, actor, post).await?;
                        }
                    }
                }
                FunctionalMetaTag::Lock => {
                    if !perms::can_edit_rating_lock(actor) {
                        errors.push(String::from(
                            "You cannot modify rating locks, you must be at least Privileged.",
                        ));
                        continue;
                    }
                    match RatingLock::parse_optional(value) {
                        Ok(lock) if lock == post.rating_lock => rating_lock = None,
                        Ok(lock) => rating_lock = Some(lock),
                        Err(()) => errors.push(format!(
                            "Invalid rating lock \"{value}\", looking for minimum/exact/maximum/none. ({token})"
                        )),
                    }
                }
                FunctionalMetaTag::Rating => {
                    if !perms::can_change_rating(actor, post) {
                        errors.push(format!(
                            "This post is rating locked, and you cannot change it. ({token})"
                        ));
                        continue;
                    }
                    match value.parse::<Rating>() {
                        Ok(new_rating) if new_rating == post.rating => rating = None,
                        Ok(new_rating) => rating = Some(new_rating),
                        Err(()) => errors.push(format!(
                            "Invalid rating \"{value}\", looking for safe/questionable/explicit. ({token})"
                        )),
                    }
                }
            },
            // search meta-tags are not resolved in a mutation context
            MetaTag::Search(_, _) => {}
        }
    }

    tags.retain(|name| !negated.contains(name));
    dedup_preserve_order(&mut tags);

    let tags = if tags.len() > config.max_post_tags {
        errors.push(format!(
            "Too many tags ({}), a post may have at most {}.",
            tags.len(),
            config.max_post_tags
        ));
        None
    } else {
        Some(tags)
    };
    let tag_counts = match tags {
        Some(ref tags) => Some(count_tags(store, tags).await?),
        None => None,
    };

    if initial {
        if let Some(tags) = tags {
            let folded = store
                .fold_initial_version(
                    post.version,
                    &InitialVersionTags {
                        tags: tags.clone(),
                        locked_tags: post.locked_tags.clone(),
                    },
                )
                .await?;
            if !folded {
                return Err(Error::InvariantViolation(format!(
                    "creation version {} of post {} disappeared",
                    post.version, post.id
                )));
            }

            let update = PostUpdate {
                tags: Some(tags.clone()),
                tag_counts,
                ..PostUpdate::default()
            };
            if !store.update_post(post.id, &update).await? {
                return Err(Error::InvariantViolation(format!(
                    "post {} disappeared while applying its initial tags",
                    post.id
                )));
            }
            store.adjust_tag_post_counts(&tags, &[]).await?;
            update.apply_to(post);
        }

        if rating.is_some() || rating_lock.is_some() {
            edit_post(
                store,
                post,
                actor,
                ip_address,
                PostChanges {
                    rating,
                    rating_lock,
                    ..PostChanges::default()
                },
            )
            .await?;
        }
    } else {
        edit_post(
            store,
            post,
            actor,
            ip_address,
            PostChanges {
                tags,
                tag_counts,
                rating,
                rating_lock,
                ..PostChanges::default()
            },
        )
        .await?;
    }

    if !errors.is_empty() {
        log::debug!(
            "Applied tags to post {} with {} errors: {:?}",
            post.id,
            errors.len(),
            errors
        );
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::{PostChanges, apply_tags, edit_post};
    use crate::{
        config::Config,
        error::Error,
        model::{NewPost, Post, Rating, RatingLock, TagCategory, UserLevel, VoteType},
        perms::Actor,
        post::create::create_post,
        store::{Store, UserDirectory, memory::MemoryStore},
        tag::create::create_tag,
    };

    async fn actor(store: &MemoryStore, name: &str, level: UserLevel) -> Actor {
        let id = store.add_user(name, level);
        Actor::from(store.get_user(id).await.unwrap())
    }

    async fn post(store: &MemoryStore, actor: &Actor, tags: &str) -> Post {
        create_post(store, actor, None, NewPost::default(), tags, &Config::default())
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_negation_wins_regardless_of_order() {
        let store = MemoryStore::new();
        let config = Config::default();
        let mut post = post(&store, &Actor::Anonymous, "").await;

        for tag_string in ["fox canine -canine", "-canine fox canine"] {
            let errors = apply_tags(&store, &mut post, &Actor::Anonymous, None, tag_string, false, &config)
                .await
                .unwrap();
            assert!(errors.is_empty());
            assert_eq!(post.tags, vec![String::from("fox")]);
        }
        // the tag is still created even though it is not applied
        assert!(store.get_tag_by_name("canine").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_category_prefix() {
        let store = MemoryStore::new();
        let config = Config::default();
        create_tag(&store, "existing", TagCategory::General, false, &Actor::Anonymous, None)
            .await
            .unwrap();
        let mut post = post(&store, &Actor::Anonymous, "").await;

        let errors = apply_tags(
            &store,
            &mut post,
            &Actor::Anonymous,
            None,
            "artist:newname artist:existing",
            false,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(
            errors,
            vec![String::from(
                "Tag categories cannot be changed with a meta prefix if they already exist. (existing)"
            )]
        );
        let created = store.get_tag_by_name("newname").await.unwrap().unwrap();
        assert_eq!(created.category, TagCategory::Artist);
        let existing = store.get_tag_by_name("existing").await.unwrap().unwrap();
        assert_eq!(existing.category, TagCategory::General);
        assert_eq!(post.tags, vec![String::from("newname"), String::from("existing")]);
        assert_eq!(post.tag_counts.artist, 1);
        assert_eq!(post.tag_counts.general, 1);
        assert_eq!(post.tag_counts.total, 2);
    }

    #[tokio::test]
    async fn test_invalid_names_are_soft_errors() {
        let store = MemoryStore::new();
        let mut post = post(&store, &Actor::Anonymous, "").await;
        let errors = apply_tags(
            &store,
            &mut post,
            &Actor::Anonymous,
            None,
            "fox __ vote:sideways",
            false,
            &Config::default(),
        )
        .await
        .unwrap();

        assert!(errors.iter().any(|e| e.ends_with("(__)")));
        assert!(errors.contains(&String::from("Invalid vote type \"sideways\" (vote:sideways)")));
        assert_eq!(post.tags, vec![String::from("fox")]);
        assert!(store.get_tag_by_name("__").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rating_lock_requires_privileges() {
        let store = MemoryStore::new();
        let config = Config::default();
        let member = actor(&store, "member", UserLevel::Member).await;
        let janitor = actor(&store, "janitor", UserLevel::Janitor).await;
        let mut post = post(&store, &member, "fox").await;

        let errors = apply_tags(&store, &mut post, &member, None, "fox lock:exact", false, &config)
            .await
            .unwrap();
        assert_eq!(
            errors,
            vec![String::from(
                "You cannot modify rating locks, you must be at least Privileged."
            )]
        );
        assert_eq!(post.rating_lock, None);

        let errors = apply_tags(
            &store,
            &mut post,
            &janitor,
            None,
            "fox lock:exact rating:s",
            false,
            &config,
        )
        .await
        .unwrap();
        assert!(errors.is_empty());
        assert_eq!(post.rating_lock, Some(RatingLock::Exact));
        assert_eq!(post.rating, Rating::Safe);

        let errors = apply_tags(&store, &mut post, &member, None, "fox rating:e", false, &config)
            .await
            .unwrap();
        assert_eq!(
            errors,
            vec![String::from(
                "This post is rating locked, and you cannot change it. (rating:e)"
            )]
        );
        assert_eq!(post.rating, Rating::Safe);

        let stored = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.rating, Rating::Safe);
        assert_eq!(stored.rating_lock, Some(RatingLock::Exact));
    }

    #[tokio::test]
    async fn test_functional_meta_tags() {
        let store = MemoryStore::new();
        let member = actor(&store, "member", UserLevel::Member).await;
        let mut post = post(&store, &member, "").await;

        let errors = apply_tags(
            &store,
            &mut post,
            &member,
            None,
            "fox vote:up fav:maybe pool:1 newset:x",
            false,
            &Config::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            errors,
            vec![String::from(
                "Invalid favorite value \"maybe\", looking for true/false. (fav:maybe)"
            )]
        );
        assert_eq!(post.tags, vec![String::from("fox")]);
        assert_eq!((post.score_up, post.score), (1, 1));
        assert_eq!(post.favorite_count, 1);
        let vote = store.get_vote(post.id, member.id()).await.unwrap().unwrap();
        assert_eq!(vote.vote_type, VoteType::Up);

        let errors = apply_tags(
            &store,
            &mut post,
            &Actor::Anonymous,
            None,
            "fox fav:true",
            false,
            &Config::default(),
        )
        .await
        .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(post.favorite_count, 1);
    }

    #[tokio::test]
    async fn test_tag_post_counts_follow_changes() {
        let store = MemoryStore::new();
        let config = Config::default();
        let mut post = post(&store, &Actor::Anonymous, "fox red").await;
        assert_eq!(store.get_tag_by_name("fox").await.unwrap().unwrap().post_count, 1);

        apply_tags(&store, &mut post, &Actor::Anonymous, None, "fox blue", false, &config)
            .await
            .unwrap();
        assert_eq!(store.get_tag_by_name("fox").await.unwrap().unwrap().post_count, 1);
        assert_eq!(store.get_tag_by_name("red").await.unwrap().unwrap().post_count, 0);
        assert_eq!(store.get_tag_by_name("blue").await.unwrap().unwrap().post_count, 1);
    }

    #[tokio::test]
    async fn test_too_many_tags() {
        let store = MemoryStore::new();
        let config = Config {
            max_post_tags: 2,
            ..Config::default()
        };
        let mut post = post(&store, &Actor::Anonymous, "fox").await;
        let errors = apply_tags(&store, &mut post, &Actor::Anonymous, None, "a b c", false, &config)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(post.tags, vec![String::from("fox")]);
    }

    #[tokio::test]
    async fn test_stale_post_is_rejected() {
        let store = MemoryStore::new();
        let mut post = post(&store, &Actor::Anonymous, "").await;
        let mut stale = post.clone();

        edit_post(
            &store,
            &mut post,
            &Actor::Anonymous,
            None,
            PostChanges {
                title: Some(String::from("new")),
                ..PostChanges::default()
            },
        )
        .await
        .unwrap();
        let result = edit_post(
            &store,
            &mut stale,
            &Actor::Anonymous,
            None,
            PostChanges {
                title: Some(String::from("other")),
                ..PostChanges::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::ConcurrentModificationError(id)) if id == post.id));
        assert!(
            edit_post(&store, &mut post, &Actor::Anonymous, None, PostChanges::default())
                .await
                .unwrap()
                .is_none()
        );
    }
}
