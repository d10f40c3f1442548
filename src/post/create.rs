use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    model::{NewPost, Post, Rating},
    perms::Actor,
    store::Store,
    util::OptFmt,
};

use super::{history::initial_version, update::apply_tags};

/// Create a post with its first version and apply `tag_string` as its initial tags.
///
/// The version is inserted before the post and pointed at it once the post row exists, the initial tags
/// are folded into that version. Returns the post together with the soft errors of the tag application.
pub async fn create_post<S: Store + ?Sized>(
    store: &S,
    actor: &Actor,
    ip_address: Option<&str>,
    mut new_post: NewPost,
    tag_string: &str,
    config: &Config,
) -> Result<(Post, Vec<String>), Error> {
    new_post
        .validate()
        .map_err(|e| Error::InvalidRequestInputError(format!("Validation failed for NewPost: {e}")))?;
    new_post.uploader_id = actor.id();
    let rating = *new_post.rating.get_or_insert(Rating::Explicit);

    let version = store
        .insert_post_version(initial_version(&new_post, rating, actor, ip_address))
        .await?;
    let mut post = store.insert_post(new_post, version.id).await?;

    store.set_post_version_post_id(version.id, post.id).await?;
    let stored_version = store.get_post_version(version.id).await?;
    if stored_version.and_then(|v| v.post_id) != Some(post.id) {
        return Err(Error::InvariantViolation(format!(
            "version {} of new post {} has no post id",
            version.id, post.id
        )));
    }

    log::debug!(
        "Created post {} (version {}) by user {} ({})",
        post.id,
        version.id,
        actor.id(),
        OptFmt(ip_address)
    );

    let errors = apply_tags(store, &mut post, actor, ip_address, tag_string, true, config).await?;
    Ok((post, errors))
}
