use crate::{
    error::Error,
    model::{Post, PostFlags, PostUpdate},
    perms::{self, Actor},
    store::Store,
};

pub mod create;
pub mod favorite;
pub mod history;
pub mod update;
pub mod vote;

async fn set_flags<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    update: PostUpdate,
) -> Result<(), Error> {
    if !store.update_post(post.id, &update).await? {
        return Err(Error::InvariantViolation(format!(
            "post {} disappeared while updating its flags",
            post.id
        )));
    }
    update.apply_to(post);
    Ok(())
}

/// Set `flag` on the post, returns false if it was already set.
pub async fn add_flag<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    flag: PostFlags,
) -> Result<bool, Error> {
    if post.flags.contains(flag) {
        return Ok(false);
    }
    let update = PostUpdate {
        flags: Some(post.flags | flag),
        ..PostUpdate::default()
    };
    set_flags(store, post, update).await?;
    Ok(true)
}

/// Clear `flag` on the post, returns false if it was not set.
pub async fn remove_flag<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    flag: PostFlags,
) -> Result<bool, Error> {
    if !post.flags.intersects(flag) {
        return Ok(false);
    }
    let update = PostUpdate {
        flags: Some(post.flags - flag),
        ..PostUpdate::default()
    };
    set_flags(store, post, update).await?;
    Ok(true)
}

/// Approve a pending post, returns true if the actor was recorded as its approver.
///
/// Posts that already have an approver only lose their pending flag.
pub async fn approve<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    actor: &Actor,
) -> Result<bool, Error> {
    if !post.is_pending() || !perms::is_approver(actor) {
        return Ok(false);
    }
    if post.approver_id.is_some() {
        remove_flag(store, post, PostFlags::PENDING).await?;
        return Ok(false);
    }

    let update = PostUpdate {
        flags: Some(post.flags - PostFlags::PENDING),
        approver_id: Some(Some(actor.id())),
        ..PostUpdate::default()
    };
    set_flags(store, post, update).await?;
    log::info!("Post {} approved by user {}", post.id, actor.id());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{add_flag, approve, remove_flag};
    use crate::{
        config::Config,
        model::{NewPost, PostFlags, UserLevel},
        perms::Actor,
        post::create::create_post,
        store::{Store, UserDirectory, memory::MemoryStore},
    };

    #[tokio::test]
    async fn test_flags() {
        let store = MemoryStore::new();
        let (mut post, _) = create_post(
            &store,
            &Actor::Anonymous,
            None,
            NewPost::default(),
            "",
            &Config::default(),
        )
        .await
        .unwrap();

        assert!(add_flag(&store, &mut post, PostFlags::FLAGGED).await.unwrap());
        assert!(!add_flag(&store, &mut post, PostFlags::FLAGGED).await.unwrap());
        assert_eq!(
            store.get_post(post.id).await.unwrap().unwrap().flags,
            PostFlags::FLAGGED
        );
        assert!(remove_flag(&store, &mut post, PostFlags::FLAGGED).await.unwrap());
        assert!(!remove_flag(&store, &mut post, PostFlags::FLAGGED).await.unwrap());
        assert!(post.flags.is_empty());
        // versioning is untouched by flag changes
        assert_eq!(post.revision, 1);
    }

    #[tokio::test]
    async fn test_approve() {
        let store = MemoryStore::new();
        let member = store.add_user("member", UserLevel::Member);
        let member = Actor::from(store.get_user(member).await.unwrap());
        let janitor = store.add_user("janitor", UserLevel::Janitor);
        let janitor = Actor::from(store.get_user(janitor).await.unwrap());

        let (mut post, _) = create_post(
            &store,
            &member,
            None,
            NewPost {
                flags: PostFlags::PENDING,
                ..NewPost::default()
            },
            "",
            &Config::default(),
        )
        .await
        .unwrap();

        assert!(!approve(&store, &mut post, &member).await.unwrap());
        assert!(post.is_pending());
        assert!(approve(&store, &mut post, &janitor).await.unwrap());
        assert!(!post.is_pending());
        assert_eq!(post.approver_id, Some(janitor.id()));
        assert!(!approve(&store, &mut post, &janitor).await.unwrap());

        let stored = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.approver_id, Some(janitor.id()));
        assert!(!stored.is_pending());
    }
}
