use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    error::Error,
    model::{
        Favorite, File, FileFlags, InitialVersionTags, NewPost, NewPostVersion, NewPostVote,
        NewTag, NewTagVersion, Post, PostScore, PostUpdate, PostVersion, PostVote, Rating, Tag,
        TagCategory, TagCounts, TagUpdate, TagVersion, User, UserLevel, VoteType,
    },
    perms,
};

use super::{FileLookup, Store, UserDirectory};

#[derive(Default)]
struct Sequences {
    user: i64,
    post: i64,
    post_version: i64,
    tag: i64,
    tag_version: i64,
    vote: i64,
    favorite: i64,
    file: i64,
}

fn next(sequence: &mut i64) -> i64 {
    *sequence += 1;
    *sequence
}

#[derive(Default)]
struct State {
    sequences: Sequences,
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    post_versions: BTreeMap<i64, PostVersion>,
    tags: BTreeMap<i64, Tag>,
    tag_versions: BTreeMap<i64, TagVersion>,
    votes: BTreeMap<i64, PostVote>,
    favorites: BTreeMap<i64, Favorite>,
    files: BTreeMap<i64, File>,
}

/// In-memory store for tests and embedders without a database.
///
/// All state lives behind a single lock so compound operations are applied atomically.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, returns the new user id.
    pub fn add_user(&self, name: &str, level: UserLevel) -> i64 {
        let mut state = self.state.lock();
        let id = next(&mut state.sequences.user);
        state.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                level,
                flags: perms::default_user_flags(level),
                posts_per_page: 0,
                favorite_count: 0,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Register a file of a post, returns the new file id.
    pub fn add_file(&self, post_id: i64, md5: &str, is_primary: bool) -> i64 {
        let mut state = self.state.lock();
        let id = next(&mut state.sequences.file);
        state.files.insert(
            id,
            File {
                id,
                post_id,
                md5: md5.to_lowercase(),
                is_primary,
                file_type: String::from("png"),
                mime: String::from("image/png"),
                ext: String::from("png"),
                width: 0,
                height: 0,
                flags: FileFlags::empty(),
                parent_id: None,
                size: 0,
            },
        );
        if let Some(post) = state.posts.get_mut(&post_id) {
            post.files.push(id);
        }
        id
    }

    pub fn votes_for_post(&self, post_id: i64) -> Vec<PostVote> {
        self.state
            .lock()
            .votes
            .values()
            .filter(|v| v.post_id == post_id)
            .cloned()
            .collect()
    }

    pub fn favorites_for_post(&self, post_id: i64) -> Vec<Favorite> {
        self.state
            .lock()
            .favorites
            .values()
            .filter(|f| f.post_id == post_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, Error> {
        Ok(self.state.lock().posts.get(&id).cloned())
    }

    async fn insert_post(&self, post: NewPost, version_id: i64) -> Result<Post, Error> {
        let mut state = self.state.lock();
        let id = next(&mut state.sequences.post);
        let post = Post {
            id,
            uploader_id: post.uploader_id,
            approver_id: None,
            created_at: Utc::now(),
            updated_at: None,
            version: version_id,
            revision: 1,
            versions: vec![version_id],
            score_up: 0,
            score_down: 0,
            score: 0,
            favorite_count: 0,
            tags: Vec::new(),
            locked_tags: post.locked_tags,
            sources: post.sources,
            flags: post.flags,
            rating: post.rating.unwrap_or(Rating::Explicit),
            rating_lock: post.rating_lock,
            files: post.files,
            parent_id: post.parent_id,
            children: Vec::new(),
            pools: Vec::new(),
            description: post.description,
            title: post.title,
            comment_count: 0,
            duration: post.duration,
            file_type: post.file_type,
            filesize: post.filesize,
            width: post.width,
            height: post.height,
            tag_counts: TagCounts::default(),
        };
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: i64, update: &PostUpdate) -> Result<bool, Error> {
        let mut state = self.state.lock();
        match state.posts.get_mut(&id) {
            Some(post) => {
                update.apply_to(post);
                post.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn adjust_post_score(
        &self,
        id: i64,
        up_delta: i32,
        down_delta: i32,
    ) -> Result<Option<PostScore>, Error> {
        let mut state = self.state.lock();
        Ok(state.posts.get_mut(&id).map(|post| {
            post.score_up += up_delta;
            post.score_down += down_delta;
            post.score = post.score_up - post.score_down;
            PostScore {
                score_up: post.score_up,
                score_down: post.score_down,
                score: post.score,
            }
        }))
    }

    async fn adjust_post_favorite_count(&self, id: i64, delta: i32) -> Result<Option<i32>, Error> {
        let mut state = self.state.lock();
        Ok(state.posts.get_mut(&id).map(|post| {
            post.favorite_count = (post.favorite_count + delta).max(0);
            post.favorite_count
        }))
    }

    async fn insert_post_version(&self, version: NewPostVersion) -> Result<PostVersion, Error> {
        let mut state = self.state.lock();
        let id = next(&mut state.sequences.post_version);
        let version = version.into_version(id, Utc::now());
        state.post_versions.insert(id, version.clone());
        Ok(version)
    }

    async fn get_post_version(&self, id: i64) -> Result<Option<PostVersion>, Error> {
        Ok(self.state.lock().post_versions.get(&id).cloned())
    }

    async fn get_post_versions(&self, post_id: i64) -> Result<Vec<PostVersion>, Error> {
        let state = self.state.lock();
        let mut versions = state
            .post_versions
            .values()
            .filter(|v| v.post_id == Some(post_id))
            .cloned()
            .collect::<Vec<_>>();
        versions.sort_by_key(|v| v.revision);
        Ok(versions)
    }

    async fn set_post_version_post_id(&self, version_id: i64, post_id: i64) -> Result<bool, Error> {
        let mut state = self.state.lock();
        match state.post_versions.get_mut(&version_id) {
            Some(version) => {
                version.post_id = Some(post_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fold_initial_version(
        &self,
        version_id: i64,
        tags: &InitialVersionTags,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock();
        match state.post_versions.get_mut(&version_id) {
            Some(version) => {
                version.tags = tags.tags.clone();
                version.added_tags = tags.tags.clone();
                version.locked_tags = tags.locked_tags.clone();
                version.added_locked_tags = tags.locked_tags.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_post_version(
        &self,
        post_id: i64,
        expected_revision: i32,
        version: NewPostVersion,
        update: &PostUpdate,
    ) -> Result<Option<PostVersion>, Error> {
        let mut state = self.state.lock();
        match state.posts.get(&post_id) {
            Some(post) if post.revision == expected_revision => {}
            _ => return Ok(None),
        }

        let id = next(&mut state.sequences.post_version);
        let version = version.into_version(id, Utc::now());
        state.post_versions.insert(id, version.clone());

        if let Some(post) = state.posts.get_mut(&post_id) {
            update.apply_to(post);
            post.version = id;
            post.versions.push(id);
            post.revision = version.revision;
            post.updated_at = Some(version.created_at);
        }

        Ok(Some(version))
    }

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>, Error> {
        Ok(self.state.lock().tags.get(&id).cloned())
    }

    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>, Error> {
        Ok(self
            .state
            .lock()
            .tags
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn get_tag_categories(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TagCategory>, Error> {
        let state = self.state.lock();
        Ok(state
            .tags
            .values()
            .filter(|t| names.contains(&t.name))
            .map(|t| (t.name.clone(), t.category))
            .collect())
    }

    async fn insert_tag_with_version(
        &self,
        tag: NewTag,
        version: NewTagVersion,
    ) -> Result<(Tag, TagVersion), Error> {
        let mut state = self.state.lock();
        if state.tags.values().any(|t| t.name == tag.name) {
            return Err(Error::DuplicateEntityError(format!("tags.name: {}", tag.name)));
        }

        let now = Utc::now();
        let version_id = next(&mut state.sequences.tag_version);
        let id = next(&mut state.sequences.tag);
        let mut version = version.into_version(version_id, now);
        version.tag_id = Some(id);
        let tag = Tag {
            id,
            name: tag.name,
            category: tag.category,
            creator_id: tag.creator_id,
            post_count: 0,
            locked: tag.locked,
            version: version_id,
            revision: version.revision,
            versions: vec![version_id],
            created_at: now,
            updated_at: None,
        };
        state.tag_versions.insert(version_id, version.clone());
        state.tags.insert(id, tag.clone());
        Ok((tag, version))
    }

    async fn get_tag_versions(&self, tag_id: i64) -> Result<Vec<TagVersion>, Error> {
        let state = self.state.lock();
        let mut versions = state
            .tag_versions
            .values()
            .filter(|v| v.tag_id == Some(tag_id))
            .cloned()
            .collect::<Vec<_>>();
        versions.sort_by_key(|v| v.revision);
        Ok(versions)
    }

    async fn append_tag_version(
        &self,
        tag_id: i64,
        expected_revision: i32,
        version: NewTagVersion,
        update: &TagUpdate,
    ) -> Result<Option<TagVersion>, Error> {
        let mut state = self.state.lock();
        match state.tags.get(&tag_id) {
            Some(tag) if tag.revision == expected_revision => {}
            _ => return Ok(None),
        }

        let id = next(&mut state.sequences.tag_version);
        let version = version.into_version(id, Utc::now());
        state.tag_versions.insert(id, version.clone());

        if let Some(tag) = state.tags.get_mut(&tag_id) {
            if let Some(category) = update.category {
                tag.category = category;
            }
            if let Some(locked) = update.locked {
                tag.locked = locked;
            }
            tag.version = id;
            tag.versions.push(id);
            tag.revision = version.revision;
            tag.updated_at = Some(version.created_at);
        }

        Ok(Some(version))
    }

    async fn adjust_tag_post_counts(
        &self,
        added: &[String],
        removed: &[String],
    ) -> Result<(), Error> {
        let mut state = self.state.lock();
        for tag in state.tags.values_mut() {
            if added.contains(&tag.name) {
                tag.post_count += 1;
            }
            if removed.contains(&tag.name) {
                tag.post_count = (tag.post_count - 1).max(0);
            }
        }
        Ok(())
    }

    async fn get_vote(&self, post_id: i64, user_id: i64) -> Result<Option<PostVote>, Error> {
        Ok(self
            .state
            .lock()
            .votes
            .values()
            .find(|v| v.post_id == post_id && v.user_id == user_id)
            .cloned())
    }

    async fn insert_vote(&self, vote: NewPostVote) -> Result<PostVote, Error> {
        let mut state = self.state.lock();
        if state
            .votes
            .values()
            .any(|v| v.post_id == vote.post_id && v.user_id == vote.user_id)
        {
            return Err(Error::DuplicateEntityError(format!(
                "post_votes: post {} user {}",
                vote.post_id, vote.user_id
            )));
        }

        let id = next(&mut state.sequences.vote);
        let vote = PostVote {
            id,
            post_id: vote.post_id,
            user_id: vote.user_id,
            vote_type: vote.vote_type,
            ip_address: vote.ip_address,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.votes.insert(id, vote.clone());
        Ok(vote)
    }

    async fn update_vote(
        &self,
        id: i64,
        vote_type: VoteType,
        ip_address: Option<&str>,
    ) -> Result<bool, Error> {
        let mut state = self.state.lock();
        match state.votes.get_mut(&id) {
            Some(vote) => {
                vote.vote_type = vote_type;
                vote.ip_address = ip_address.map(str::to_string);
                vote.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_favorite(&self, post_id: i64, user_id: i64) -> Result<Option<Favorite>, Error> {
        Ok(self
            .state
            .lock()
            .favorites
            .values()
            .find(|f| f.post_id == post_id && f.user_id == user_id)
            .cloned())
    }

    async fn insert_favorite(&self, post_id: i64, user_id: i64) -> Result<Favorite, Error> {
        let mut state = self.state.lock();
        if state
            .favorites
            .values()
            .any(|f| f.post_id == post_id && f.user_id == user_id)
        {
            return Err(Error::DuplicateEntityError(format!(
                "favorites: post {post_id} user {user_id}"
            )));
        }

        let id = next(&mut state.sequences.favorite);
        let favorite = Favorite {
            id,
            post_id,
            user_id,
            created_at: Utc::now(),
        };
        state.favorites.insert(id, favorite.clone());
        Ok(favorite)
    }

    async fn delete_favorite(&self, id: i64) -> Result<bool, Error> {
        Ok(self.state.lock().favorites.remove(&id).is_some())
    }

    async fn adjust_user_favorite_count(
        &self,
        user_id: i64,
        delta: i32,
    ) -> Result<Option<i32>, Error> {
        let mut state = self.state.lock();
        Ok(state.users.get_mut(&user_id).map(|user| {
            user.favorite_count = (user.favorite_count + delta).max(0);
            user.favorite_count
        }))
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, Error> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn name_to_id(&self, name: &str) -> Result<Option<i64>, Error> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(name))
            .map(|u| u.id))
    }

    async fn id_to_name(&self, id: i64) -> Result<Option<String>, Error> {
        Ok(self.state.lock().users.get(&id).map(|u| u.name.clone()))
    }
}

#[async_trait]
impl FileLookup for MemoryStore {
    async fn post_id_for_md5(&self, md5: &str) -> Result<Option<i64>, Error> {
        let md5 = md5.to_lowercase();
        Ok(self
            .state
            .lock()
            .files
            .values()
            .find(|f| f.md5 == md5)
            .map(|f| f.post_id))
    }
}
