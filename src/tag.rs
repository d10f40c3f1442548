use std::collections::BTreeMap;

use crate::{
    error::Error,
    model::{Tag, TagCategory},
    perms::Actor,
    store::Store,
};

pub mod create;
pub mod history;
pub mod update;
pub mod validation;

/// Get the tag with the exact supplied name or create it as a general tag, returning whether it was created.
pub async fn get_or_create_tag<S: Store + ?Sized>(
    store: &S,
    name: &str,
    actor: &Actor,
    ip_address: Option<&str>,
) -> Result<(Tag, bool), Error> {
    if let Some(tag) = store.get_tag_by_name(name).await? {
        return Ok((tag, false));
    }

    let tag = create::create_tag(
        store,
        name,
        TagCategory::General,
        false,
        actor,
        ip_address,
    )
    .await?;
    Ok((tag, true))
}

/// Group tag names by the name of their category, names without a tag are listed under `unknown`.
pub async fn parse_tag_types<S: Store + ?Sized>(
    store: &S,
    names: &[String],
) -> Result<BTreeMap<String, Vec<String>>, Error> {
    let categories = store.get_tag_categories(names).await?;
    let mut types: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        let key = categories
            .get(name)
            .map(|category| category.as_str())
            .unwrap_or("unknown");
        types.entry(key.to_string()).or_default().push(name.clone());
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::{get_or_create_tag, parse_tag_types};
    use crate::{model::TagCategory, perms::Actor, store::memory::MemoryStore};

    #[tokio::test]
    async fn test_get_or_create() {
        let store = MemoryStore::new();
        let (tag, created) = get_or_create_tag(&store, "fox", &Actor::Anonymous, None)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(tag.category, TagCategory::General);

        let (existing, created) = get_or_create_tag(&store, "fox", &Actor::Anonymous, None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(existing.id, tag.id);
    }

    #[tokio::test]
    async fn test_parse_tag_types() {
        let store = MemoryStore::new();
        get_or_create_tag(&store, "fox", &Actor::Anonymous, None)
            .await
            .unwrap();
        let types = parse_tag_types(&store, &[String::from("fox"), String::from("unseen")])
            .await
            .unwrap();
        assert_eq!(types["general"], vec![String::from("fox")]);
        assert_eq!(types["unknown"], vec![String::from("unseen")]);
    }
}
