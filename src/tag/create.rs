use crate::{
    error::Error,
    model::{NewTag, NewTagVersion, Tag, TagCategory},
    perms::Actor,
    store::Store,
};

use super::validation::validate_tag_name;

/// Create a tag together with its first version.
///
/// Tag and version are written together. Creating a tag whose name is taken fails with
/// [`Error::DuplicateEntityError`] and records no version.
pub async fn create_tag<S: Store + ?Sized>(
    store: &S,
    name: &str,
    category: TagCategory,
    locked: bool,
    actor: &Actor,
    ip_address: Option<&str>,
) -> Result<Tag, Error> {
    let name = name.to_lowercase();
    let errors = validate_tag_name(&name);
    if !errors.is_empty() {
        return Err(Error::InvalidRequestInputError(errors.join(", ")));
    }

    let (tag, version) = store
        .insert_tag_with_version(
            NewTag {
                name,
                category,
                creator_id: actor.id(),
                locked,
            },
            NewTagVersion {
                tag_id: None,
                updater_id: actor.id(),
                updater_ip_address: ip_address.map(str::to_string),
                revision: 1,
                category,
                old_category: None,
                locked,
                old_locked: None,
            },
        )
        .await?;

    let versions = store.get_tag_versions(tag.id).await?;
    if !versions.iter().any(|v| v.id == version.id) {
        return Err(Error::InvariantViolation(format!(
            "version {} of new tag {} has no tag id",
            version.id, tag.id
        )));
    }

    log::debug!(
        "Created tag '{}' ({}) in category {} by user {}",
        &tag.name,
        tag.id,
        tag.category,
        actor.id()
    );
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::create_tag;
    use crate::{
        error::Error,
        model::{TagCategory, UserLevel},
        perms::Actor,
        store::{Store, UserDirectory, memory::MemoryStore},
    };

    #[tokio::test]
    async fn test_create_tag() {
        let store = MemoryStore::new();
        let user_id = store.add_user("creator", UserLevel::Member);
        let actor = Actor::from(store.get_user(user_id).await.unwrap());

        let tag = create_tag(
            &store,
            "Some_Artist",
            TagCategory::Artist,
            false,
            &actor,
            Some("127.0.0.1"),
        )
        .await
        .unwrap();
        assert_eq!(tag.name, "some_artist");
        assert_eq!(tag.creator_id, user_id);
        assert_eq!(tag.revision, 1);

        let versions = store.get_tag_versions(tag.id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(tag.version, versions[0].id);
        assert_eq!(versions[0].category, TagCategory::Artist);
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_names() {
        let store = MemoryStore::new();
        create_tag(&store, "fox", TagCategory::General, false, &Actor::Anonymous, None)
            .await
            .unwrap();
        assert!(matches!(
            create_tag(&store, "FOX", TagCategory::Species, false, &Actor::Anonymous, None).await,
            Err(Error::DuplicateEntityError(_))
        ));
        assert!(matches!(
            create_tag(&store, "a,b", TagCategory::General, false, &Actor::Anonymous, None).await,
            Err(Error::InvalidRequestInputError(_))
        ));
    }
}
