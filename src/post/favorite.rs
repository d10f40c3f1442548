use crate::{
    error::Error,
    model::{Favorite, Post},
    perms::Actor,
    store::Store,
};

/// Favorite `post` for the actor, `None` for anonymous actors or if it is already a favorite.
pub async fn favorite<S: Store + ?Sized>(
    store: &S,
    actor: &Actor,
    post: &mut Post,
) -> Result<Option<Favorite>, Error> {
    let Some(user) = actor.user() else {
        return Ok(None);
    };
    if store.get_favorite(post.id, user.id).await?.is_some() {
        return Ok(None);
    }

    let favorite = match store.insert_favorite(post.id, user.id).await {
        Ok(favorite) => favorite,
        Err(Error::DuplicateEntityError(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    if let Some(count) = store.adjust_post_favorite_count(post.id, 1).await? {
        post.favorite_count = count;
    }
    store.adjust_user_favorite_count(user.id, 1).await?;

    log::debug!("User {} favorited post {}", user.id, post.id);
    Ok(Some(favorite))
}

/// Remove `post` from the actor's favorites, returns whether a favorite was removed.
pub async fn unfavorite<S: Store + ?Sized>(
    store: &S,
    actor: &Actor,
    post: &mut Post,
) -> Result<bool, Error> {
    let Some(user) = actor.user() else {
        return Ok(false);
    };
    let Some(favorite) = store.get_favorite(post.id, user.id).await? else {
        return Ok(false);
    };

    if !store.delete_favorite(favorite.id).await? {
        return Ok(false);
    }
    if let Some(count) = store.adjust_post_favorite_count(post.id, -1).await? {
        post.favorite_count = count;
    }
    store.adjust_user_favorite_count(user.id, -1).await?;

    log::debug!("User {} unfavorited post {}", user.id, post.id);
    Ok(true)
}
