use crate::{
    error::Error,
    model::{NewTagVersion, Tag, TagUpdate, TagVersion},
    perms::Actor,
    store::Store,
};

/// Apply a versioned edit to `tag`, recording old values for the fields that actually change.
///
/// Returns `None` if nothing changes. Fails with [`Error::ConcurrentModificationError`] if the tag was
/// edited since it was loaded, `tag` is refreshed on success.
pub async fn edit_tag<S: Store + ?Sized>(
    store: &S,
    tag: &mut Tag,
    actor: &Actor,
    ip_address: Option<&str>,
    update: TagUpdate,
) -> Result<Option<TagVersion>, Error> {
    let update = TagUpdate {
        category: update.category.filter(|c| *c != tag.category),
        locked: update.locked.filter(|l| *l != tag.locked),
    };
    if update.category.is_none() && update.locked.is_none() {
        return Ok(None);
    }

    let version = NewTagVersion {
        tag_id: Some(tag.id),
        updater_id: actor.id(),
        updater_ip_address: ip_address.map(str::to_string),
        revision: tag.revision + 1,
        category: update.category.unwrap_or(tag.category),
        old_category: update.category.map(|_| tag.category),
        locked: update.locked.unwrap_or(tag.locked),
        old_locked: update.locked.map(|_| tag.locked),
    };

    let version = store
        .append_tag_version(tag.id, tag.revision, version, &update)
        .await?
        .ok_or(Error::ConcurrentModificationError(tag.id))?;

    tag.category = version.category;
    tag.locked = version.locked;
    tag.version = version.id;
    tag.revision = version.revision;
    tag.versions.push(version.id);
    tag.updated_at = Some(version.created_at);

    log::debug!(
        "Created version {} (revision {}) of tag {}",
        version.id,
        version.revision,
        tag.id
    );
    Ok(Some(version))
}

#[cfg(test)]
mod tests {
    use super::edit_tag;
    use crate::{
        error::Error,
        model::{TagCategory, TagUpdate},
        perms::Actor,
        store::{Store, memory::MemoryStore},
        tag::create::create_tag,
    };

    #[tokio::test]
    async fn test_edit_records_touched_fields() {
        let store = MemoryStore::new();
        let mut tag = create_tag(&store, "fox", TagCategory::General, false, &Actor::Anonymous, None)
            .await
            .unwrap();

        let version = edit_tag(
            &store,
            &mut tag,
            &Actor::Anonymous,
            None,
            TagUpdate {
                category: Some(TagCategory::Species),
                locked: Some(false),
            },
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(version.revision, 2);
        assert_eq!(version.old_category, Some(TagCategory::General));
        assert_eq!(version.old_locked, None);
        assert_eq!(tag.category, TagCategory::Species);
        assert_eq!(tag.versions.len(), 2);

        let stored = store.get_tag(tag.id).await.unwrap().unwrap();
        assert_eq!(stored.category, TagCategory::Species);
        assert_eq!(stored.revision, 2);

        let unchanged = edit_tag(
            &store,
            &mut tag,
            &Actor::Anonymous,
            None,
            TagUpdate {
                category: Some(TagCategory::Species),
                locked: None,
            },
        )
        .await
        .unwrap();
        assert!(unchanged.is_none());
    }

    #[tokio::test]
    async fn test_stale_tag_is_rejected() {
        let store = MemoryStore::new();
        let mut tag = create_tag(&store, "fox", TagCategory::General, false, &Actor::Anonymous, None)
            .await
            .unwrap();
        let mut stale = tag.clone();

        edit_tag(
            &store,
            &mut tag,
            &Actor::Anonymous,
            None,
            TagUpdate {
                category: None,
                locked: Some(true),
            },
        )
        .await
        .unwrap();

        let result = edit_tag(
            &store,
            &mut stale,
            &Actor::Anonymous,
            None,
            TagUpdate {
                category: Some(TagCategory::Meta),
                locked: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::ConcurrentModificationError(id)) if id == tag.id));
    }
}
