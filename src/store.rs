use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    error::Error,
    model::{
        Favorite, File, InitialVersionTags, NewPost, NewPostVersion, NewPostVote, NewTag,
        NewTagVersion, Post, PostScore, PostUpdate, PostVersion, PostVote, Tag, TagCategory,
        TagUpdate, TagVersion, User, VoteType,
    },
    query::Statement,
};

pub mod memory;
pub mod pg;

/// Persistence of posts, tags and their versions, votes and favorites.
///
/// Compound operations such as [`Store::append_post_version`] must be applied atomically by implementations.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, Error>;

    /// Insert a post whose first version has already been inserted as `version_id`.
    async fn insert_post(&self, post: NewPost, version_id: i64) -> Result<Post, Error>;

    /// Unversioned update of a post row, returns false if the post does not exist.
    async fn update_post(&self, id: i64, update: &PostUpdate) -> Result<bool, Error>;

    /// Increment the score counters of a post in place, keeping `score = score_up - score_down`.
    async fn adjust_post_score(
        &self,
        id: i64,
        up_delta: i32,
        down_delta: i32,
    ) -> Result<Option<PostScore>, Error>;

    async fn adjust_post_favorite_count(&self, id: i64, delta: i32) -> Result<Option<i32>, Error>;

    async fn insert_post_version(&self, version: NewPostVersion) -> Result<PostVersion, Error>;

    async fn get_post_version(&self, id: i64) -> Result<Option<PostVersion>, Error>;

    /// All versions of a post ordered by revision.
    async fn get_post_versions(&self, post_id: i64) -> Result<Vec<PostVersion>, Error>;

    async fn set_post_version_post_id(&self, version_id: i64, post_id: i64) -> Result<bool, Error>;

    /// Record the tags of the initial tag application on the creation version.
    async fn fold_initial_version(
        &self,
        version_id: i64,
        tags: &InitialVersionTags,
    ) -> Result<bool, Error>;

    /// Insert `version` and apply `update` to the post if its revision still equals `expected_revision`,
    /// pointing the post's version at the new record and bumping its revision.
    ///
    /// Returns `None` without writing anything if the revision check fails.
    async fn append_post_version(
        &self,
        post_id: i64,
        expected_revision: i32,
        version: NewPostVersion,
        update: &PostUpdate,
    ) -> Result<Option<PostVersion>, Error>;

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>, Error>;

    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>, Error>;

    /// Categories of all existing tags among `names`.
    async fn get_tag_categories(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TagCategory>, Error>;

    /// Insert a tag with its first version, the version's tag id is set to the new tag.
    ///
    /// Fails with [`Error::DuplicateEntityError`] if a tag with the same name exists, nothing is written
    /// in that case.
    async fn insert_tag_with_version(
        &self,
        tag: NewTag,
        version: NewTagVersion,
    ) -> Result<(Tag, TagVersion), Error>;

    async fn get_tag_versions(&self, tag_id: i64) -> Result<Vec<TagVersion>, Error>;

    /// Tag counterpart of [`Store::append_post_version`].
    async fn append_tag_version(
        &self,
        tag_id: i64,
        expected_revision: i32,
        version: NewTagVersion,
        update: &TagUpdate,
    ) -> Result<Option<TagVersion>, Error>;

    async fn adjust_tag_post_counts(&self, added: &[String], removed: &[String])
    -> Result<(), Error>;

    async fn get_vote(&self, post_id: i64, user_id: i64) -> Result<Option<PostVote>, Error>;

    /// Fails with [`Error::DuplicateEntityError`] if the user already has a vote row for the post.
    async fn insert_vote(&self, vote: NewPostVote) -> Result<PostVote, Error>;

    /// Returns false if no row was updated.
    async fn update_vote(
        &self,
        id: i64,
        vote_type: VoteType,
        ip_address: Option<&str>,
    ) -> Result<bool, Error>;

    async fn get_favorite(&self, post_id: i64, user_id: i64) -> Result<Option<Favorite>, Error>;

    async fn insert_favorite(&self, post_id: i64, user_id: i64) -> Result<Favorite, Error>;

    async fn delete_favorite(&self, id: i64) -> Result<bool, Error>;

    async fn adjust_user_favorite_count(&self, user_id: i64, delta: i32)
    -> Result<Option<i32>, Error>;
}

/// Resolves user names and ids.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, Error>;

    async fn name_to_id(&self, name: &str) -> Result<Option<i64>, Error>;

    async fn id_to_name(&self, id: i64) -> Result<Option<String>, Error>;
}

/// Resolves files to their posts.
#[async_trait]
pub trait FileLookup: Send + Sync {
    async fn post_id_for_md5(&self, md5: &str) -> Result<Option<i64>, Error>;
}

/// Executes compiled search statements.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn load_posts(&self, statement: &Statement) -> Result<Vec<Post>, Error>;

    async fn load_post_versions(&self, statement: &Statement) -> Result<Vec<PostVersion>, Error>;

    async fn load_tags(&self, statement: &Statement) -> Result<Vec<Tag>, Error>;

    async fn load_favorites(&self, statement: &Statement) -> Result<Vec<Favorite>, Error>;

    async fn load_files(&self, statement: &Statement) -> Result<Vec<File>, Error>;
}
