use chrono::Utc;

use crate::{
    error::Error,
    model::{NewPostVote, Post, PostVote, VoteType},
    perms::Actor,
    store::Store,
};

/// Move the actor's vote on `post` towards `requested`.
///
/// Requesting the type already held toggles the vote off. Score counters are adjusted in the store by
/// the difference between the old and new contribution, `post` receives the resulting counters.
/// Returns `None` for anonymous actors and when there is no vote to record.
pub async fn vote<S: Store + ?Sized>(
    store: &S,
    post: &mut Post,
    actor: &Actor,
    requested: VoteType,
    ip_address: Option<&str>,
) -> Result<Option<PostVote>, Error> {
    let Some(user) = actor.user() else {
        return Ok(None);
    };

    let existing = store.get_vote(post.id, user.id).await?;
    let (previous, next) = match existing {
        None if requested == VoteType::None => return Ok(None),
        None => (VoteType::None, requested),
        Some(ref current) if current.vote_type == requested => {
            (current.vote_type, VoteType::None)
        }
        Some(ref current) => (current.vote_type, requested),
    };

    let vote = match existing {
        None => {
            store
                .insert_vote(NewPostVote {
                    post_id: post.id,
                    user_id: user.id,
                    vote_type: next,
                    ip_address: ip_address.map(str::to_string),
                })
                .await?
        }
        Some(mut current) => {
            if !store.update_vote(current.id, next, ip_address).await? {
                log::error!(
                    "Vote update changed 0 rows (post: {}, user: {}, vote: {} - {} -> {})",
                    post.id,
                    user.id,
                    current.id,
                    current.vote_type,
                    next
                );
                return Err(Error::InvariantViolation(format!(
                    "vote {} could not be updated",
                    current.id
                )));
            }
            current.vote_type = next;
            current.ip_address = ip_address.map(str::to_string);
            current.updated_at = Some(Utc::now());
            current
        }
    };

    let (old_up, old_down) = previous.contribution();
    let (new_up, new_down) = next.contribution();
    if (old_up, old_down) != (new_up, new_down) {
        let score = store
            .adjust_post_score(post.id, new_up - old_up, new_down - old_down)
            .await?
            .ok_or_else(|| {
                Error::InvariantViolation(format!("post {} disappeared while voting", post.id))
            })?;
        post.score_up = score.score_up;
        post.score_down = score.score_down;
        post.score = score.score;
    }

    log::debug!(
        "User {} changed vote on post {} from {} to {}",
        user.id,
        post.id,
        previous,
        next
    );
    Ok(Some(vote))
}
