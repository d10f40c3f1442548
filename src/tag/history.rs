use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Error,
    model::{TagCategory, TagVersion},
    store::Store,
};

pub fn category_changed(version: &TagVersion) -> bool {
    version
        .old_category
        .is_some_and(|old| old != version.category)
}

pub fn locked_changed(version: &TagVersion) -> bool {
    version.old_locked.is_some_and(|old| old != version.locked)
}

#[derive(Clone, Debug, Serialize)]
pub struct TagVersionSnapshot {
    pub id: i64,
    pub tag_id: Option<i64>,
    pub updater_id: i64,
    pub created_at: DateTime<Utc>,
    pub revision: i32,
    pub category: TagCategory,
    pub category_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_category: Option<TagCategory>,
    pub locked: bool,
    pub locked_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_locked: Option<bool>,
}

impl From<&TagVersion> for TagVersionSnapshot {
    fn from(version: &TagVersion) -> Self {
        let category_changed = category_changed(version);
        let locked_changed = locked_changed(version);
        TagVersionSnapshot {
            id: version.id,
            tag_id: version.tag_id,
            updater_id: version.updater_id,
            created_at: version.created_at,
            revision: version.revision,
            category: version.category,
            category_changed,
            old_category: version.old_category.filter(|_| category_changed),
            locked: version.locked,
            locked_changed,
            old_locked: version.old_locked.filter(|_| locked_changed),
        }
    }
}

/// All versions of a tag ordered by revision.
pub async fn get_tag_history<S: Store + ?Sized>(
    store: &S,
    tag_id: i64,
) -> Result<Vec<TagVersionSnapshot>, Error> {
    let versions = store.get_tag_versions(tag_id).await?;
    Ok(versions.iter().map(TagVersionSnapshot::from).collect())
}
