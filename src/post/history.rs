use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Error,
    model::{NewPost, NewPostVersion, Post, PostVersion, Rating, RatingLock},
    perms::Actor,
    store::Store,
    util::find_differences,
};

use super::update::PostChanges;

/// The revision 1 version of a post that is about to be created, its post id is filled in afterwards.
pub fn initial_version(post: &NewPost, rating: Rating, actor: &Actor, ip_address: Option<&str>) -> NewPostVersion {
    NewPostVersion {
        post_id: None,
        updater_id: actor.id(),
        updater_ip_address: ip_address.map(str::to_string),
        revision: 1,
        sources: post.sources.clone(),
        old_sources: None,
        added_sources: post.sources.clone(),
        removed_sources: Vec::new(),
        tags: Vec::new(),
        old_tags: None,
        added_tags: Vec::new(),
        removed_tags: Vec::new(),
        locked_tags: post.locked_tags.clone(),
        old_locked_tags: None,
        added_locked_tags: post.locked_tags.clone(),
        removed_locked_tags: Vec::new(),
        rating,
        old_rating: None,
        rating_lock: post.rating_lock,
        old_rating_lock: None,
        parent_id: post.parent_id,
        old_parent_id: None,
        description: post.description.clone(),
        old_description: None,
        title: post.title.clone(),
        old_title: None,
        reason: None,
    }
}

/// The next version of `post` after applying `changes`.
///
/// Every field carries its new value, fields present in `changes` also carry the value they replace and
/// array fields their added and removed elements.
pub fn next_version(
    post: &Post,
    actor: &Actor,
    ip_address: Option<&str>,
    changes: &PostChanges,
) -> NewPostVersion {
    let (sources, old_sources, added_sources, removed_sources) =
        array_change(&post.sources, changes.sources.as_ref());
    let (tags, old_tags, added_tags, removed_tags) =
        array_change(&post.tags, changes.tags.as_ref());
    let (locked_tags, old_locked_tags, added_locked_tags, removed_locked_tags) =
        array_change(&post.locked_tags, changes.locked_tags.as_ref());

    NewPostVersion {
        post_id: Some(post.id),
        updater_id: actor.id(),
        updater_ip_address: ip_address.map(str::to_string),
        revision: post.revision + 1,
        sources,
        old_sources,
        added_sources,
        removed_sources,
        tags,
        old_tags,
        added_tags,
        removed_tags,
        locked_tags,
        old_locked_tags,
        added_locked_tags,
        removed_locked_tags,
        rating: changes.rating.unwrap_or(post.rating),
        old_rating: changes.rating.map(|_| post.rating),
        rating_lock: changes.rating_lock.unwrap_or(post.rating_lock),
        old_rating_lock: changes.rating_lock.map(|_| post.rating_lock),
        parent_id: changes.parent_id.unwrap_or(post.parent_id),
        old_parent_id: changes.parent_id.map(|_| post.parent_id),
        description: changes
            .description
            .clone()
            .unwrap_or_else(|| post.description.clone()),
        old_description: changes
            .description
            .as_ref()
            .map(|_| post.description.clone()),
        title: changes.title.clone().unwrap_or_else(|| post.title.clone()),
        old_title: changes.title.as_ref().map(|_| post.title.clone()),
        reason: changes.reason.clone(),
    }
}

type ArrayChange = (Vec<String>, Option<Vec<String>>, Vec<String>, Vec<String>);

fn array_change(current: &[String], new: Option<&Vec<String>>) -> ArrayChange {
    match new {
        Some(new) => {
            let (added, removed) = find_differences(current, new);
            (new.clone(), Some(current.to_vec()), added, removed)
        }
        None => (current.to_vec(), None, Vec::new(), Vec::new()),
    }
}

/// A field changed in a version iff its previous value was recorded and differs.
fn changed<T: PartialEq>(old: Option<&T>, new: &T) -> bool {
    old.is_some_and(|old| old != new)
}

pub fn sources_changed(version: &PostVersion) -> bool {
    changed(version.old_sources.as_ref(), &version.sources)
}

pub fn tags_changed(version: &PostVersion) -> bool {
    changed(version.old_tags.as_ref(), &version.tags)
}

pub fn locked_tags_changed(version: &PostVersion) -> bool {
    changed(version.old_locked_tags.as_ref(), &version.locked_tags)
}

pub fn rating_changed(version: &PostVersion) -> bool {
    changed(version.old_rating.as_ref(), &version.rating)
}

pub fn rating_lock_changed(version: &PostVersion) -> bool {
    changed(version.old_rating_lock.as_ref(), &version.rating_lock)
}

pub fn parent_changed(version: &PostVersion) -> bool {
    changed(version.old_parent_id.as_ref(), &version.parent_id)
}

pub fn description_changed(version: &PostVersion) -> bool {
    changed(version.old_description.as_ref(), &version.description)
}

pub fn title_changed(version: &PostVersion) -> bool {
    changed(version.old_title.as_ref(), &version.title)
}

pub fn something_changed(version: &PostVersion) -> bool {
    sources_changed(version)
        || tags_changed(version)
        || locked_tags_changed(version)
        || rating_changed(version)
        || rating_lock_changed(version)
        || parent_changed(version)
        || description_changed(version)
        || title_changed(version)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArrayFieldSnapshot {
    pub current: Vec<String>,
    pub changed: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ArrayFieldSnapshot {
    fn new(
        current: &[String],
        old: Option<&Vec<String>>,
        added: &[String],
        removed: &[String],
    ) -> Self {
        ArrayFieldSnapshot {
            current: current.to_vec(),
            changed: changed(old, &current.to_vec()),
            added: added.to_vec(),
            removed: removed.to_vec(),
            unchanged: current
                .iter()
                .filter(|e| !added.contains(e))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldSnapshot<T> {
    pub current: T,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<T>,
}

impl<T: Clone + PartialEq> FieldSnapshot<T> {
    fn new(current: &T, old: Option<&T>) -> Self {
        let changed = changed(old, current);
        FieldSnapshot {
            current: current.clone(),
            changed,
            old: old.filter(|_| changed).cloned(),
        }
    }
}

/// Projection of a post version with derived change flags, old values are only present when changed.
#[derive(Clone, Debug, Serialize)]
pub struct PostVersionSnapshot {
    pub id: i64,
    pub post_id: Option<i64>,
    pub updater_id: i64,
    pub created_at: DateTime<Utc>,
    pub revision: i32,
    pub reason: Option<String>,
    pub something_changed: bool,
    pub sources: ArrayFieldSnapshot,
    pub tags: ArrayFieldSnapshot,
    pub locked_tags: ArrayFieldSnapshot,
    pub rating: FieldSnapshot<Rating>,
    pub rating_lock: FieldSnapshot<Option<RatingLock>>,
    pub parent_id: FieldSnapshot<Option<i64>>,
    pub description: FieldSnapshot<String>,
    pub title: FieldSnapshot<String>,
}

impl From<&PostVersion> for PostVersionSnapshot {
    fn from(version: &PostVersion) -> Self {
        PostVersionSnapshot {
            id: version.id,
            post_id: version.post_id,
            updater_id: version.updater_id,
            created_at: version.created_at,
            revision: version.revision,
            reason: version.reason.clone(),
            something_changed: something_changed(version),
            sources: ArrayFieldSnapshot::new(
                &version.sources,
                version.old_sources.as_ref(),
                &version.added_sources,
                &version.removed_sources,
            ),
            tags: ArrayFieldSnapshot::new(
                &version.tags,
                version.old_tags.as_ref(),
                &version.added_tags,
                &version.removed_tags,
            ),
            locked_tags: ArrayFieldSnapshot::new(
                &version.locked_tags,
                version.old_locked_tags.as_ref(),
                &version.added_locked_tags,
                &version.removed_locked_tags,
            ),
            rating: FieldSnapshot::new(&version.rating, version.old_rating.as_ref()),
            rating_lock: FieldSnapshot::new(
                &version.rating_lock,
                version.old_rating_lock.as_ref(),
            ),
            parent_id: FieldSnapshot::new(&version.parent_id, version.old_parent_id.as_ref()),
            description: FieldSnapshot::new(
                &version.description,
                version.old_description.as_ref(),
            ),
            title: FieldSnapshot::new(&version.title, version.old_title.as_ref()),
        }
    }
}

/// All versions of a post ordered by revision.
pub async fn get_post_history<S: Store + ?Sized>(
    store: &S,
    post_id: i64,
) -> Result<Vec<PostVersionSnapshot>, Error> {
    let versions = store.get_post_versions(post_id).await?;
    Ok(versions.iter().map(PostVersionSnapshot::from).collect())
}
