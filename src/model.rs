use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use validator::Validate;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct PostFlags: i32 {
        const PENDING = 1 << 0;
        const FLAGGED = 1 << 1;
        const NOTE_LOCKED = 1 << 2;
        const DELETED = 1 << 3;
    }
}

bitflags::bitflags! {
    #[derive(Default)]
    pub struct UserFlags: i32 {
        const BANNED = 1 << 0;
        const SYSTEM = 1 << 1;
        const BOT = 1 << 2;
        const APPROVER = 1 << 3;
        const UNLIMITED_UPLOADS = 1 << 4;
        const USE_GRAVATAR = 1 << 5;
        const NO_FLAGGING = 1 << 6;
        const NO_FEEDBACK = 1 << 7;
        const HAS_MAIL = 1 << 8;
        const VERIFIED = 1 << 9;
    }
}

bitflags::bitflags! {
    #[derive(Default)]
    pub struct FileFlags: i32 {
        const PREVIEW = 1 << 0;
        const REPLACEMENT = 1 << 1;
        const DELETED = 1 << 2;
    }
}

// flags are persisted and serialized as their raw bits
macro_rules! impl_flags_serde {
    ($($flags:ty),+) => {
        $(
            impl Serialize for $flags {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_i32(self.bits())
                }
            }

            impl<'de> Deserialize<'de> for $flags {
                fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    i32::deserialize(deserializer).map(<$flags>::from_bits_truncate)
                }
            }
        )+
    };
}

impl_flags_serde!(PostFlags, UserFlags, FileFlags);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserLevel {
    Anonymous = 1,
    Member = 2,
    Privileged = 10,
    FormerStaff = 11,
    Janitor = 20,
    Moderator = 21,
    Admin = 22,
}

impl UserLevel {
    pub fn from_i32(level: i32) -> Option<UserLevel> {
        match level {
            1 => Some(UserLevel::Anonymous),
            2 => Some(UserLevel::Member),
            10 => Some(UserLevel::Privileged),
            11 => Some(UserLevel::FormerStaff),
            20 => Some(UserLevel::Janitor),
            21 => Some(UserLevel::Moderator),
            22 => Some(UserLevel::Admin),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Safe,
    Questionable,
    Explicit,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Safe => "safe",
            Rating::Questionable => "questionable",
            Rating::Explicit => "explicit",
        }
    }
}

impl FromStr for Rating {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "safe" | "s" => Ok(Rating::Safe),
            "questionable" | "q" => Ok(Rating::Questionable),
            "explicit" | "e" => Ok(Rating::Explicit),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingLock {
    Minimum,
    Exact,
    Maximum,
}

impl RatingLock {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingLock::Minimum => "minimum",
            RatingLock::Exact => "exact",
            RatingLock::Maximum => "maximum",
        }
    }

    /// Parse a lock value where `none` clears the lock.
    pub fn parse_optional(s: &str) -> Result<Option<RatingLock>, ()> {
        if s.eq_ignore_ascii_case("none") {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }
}

impl FromStr for RatingLock {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimum" => Ok(RatingLock::Minimum),
            "exact" => Ok(RatingLock::Exact),
            "maximum" => Ok(RatingLock::Maximum),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RatingLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Down,
    None,
    Up,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Down => "down",
            VoteType::None => "none",
            VoteType::Up => "up",
        }
    }

    /// The `(score_up, score_down)` contribution of a vote of this type.
    pub fn contribution(&self) -> (i32, i32) {
        match self {
            VoteType::Up => (1, 0),
            VoteType::Down => (0, 1),
            VoteType::None => (0, 0),
        }
    }
}

impl FromStr for VoteType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "down" => Ok(VoteType::Down),
            "none" => Ok(VoteType::None),
            "up" => Ok(VoteType::Up),
            _ => Err(()),
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    General = 0,
    Artist = 1,
    Copyright = 2,
    Character = 3,
    Species = 4,
    Invalid = 5,
    Lore = 6,
    Meta = 7,
}

impl TagCategory {
    pub const ALL: [TagCategory; 8] = [
        TagCategory::General,
        TagCategory::Artist,
        TagCategory::Copyright,
        TagCategory::Character,
        TagCategory::Species,
        TagCategory::Invalid,
        TagCategory::Lore,
        TagCategory::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::General => "general",
            TagCategory::Artist => "artist",
            TagCategory::Copyright => "copyright",
            TagCategory::Character => "character",
            TagCategory::Species => "species",
            TagCategory::Invalid => "invalid",
            TagCategory::Lore => "lore",
            TagCategory::Meta => "meta",
        }
    }

    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<TagCategory> {
        TagCategory::ALL.into_iter().find(|c| c.id() == id)
    }
}

impl FromStr for TagCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TagCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of tags per category on a post, `total` is always the sum of all categories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCounts {
    pub general: i32,
    pub artist: i32,
    pub copyright: i32,
    pub character: i32,
    pub species: i32,
    pub invalid: i32,
    pub lore: i32,
    pub meta: i32,
    pub total: i32,
}

impl TagCounts {
    pub fn from_categories(categories: impl IntoIterator<Item = TagCategory>) -> TagCounts {
        let mut counts = TagCounts::default();
        for category in categories {
            *counts.get_mut(category) += 1;
            counts.total += 1;
        }
        counts
    }

    pub fn get(&self, category: TagCategory) -> i32 {
        match category {
            TagCategory::General => self.general,
            TagCategory::Artist => self.artist,
            TagCategory::Copyright => self.copyright,
            TagCategory::Character => self.character,
            TagCategory::Species => self.species,
            TagCategory::Invalid => self.invalid,
            TagCategory::Lore => self.lore,
            TagCategory::Meta => self.meta,
        }
    }

    fn get_mut(&mut self, category: TagCategory) -> &mut i32 {
        match category {
            TagCategory::General => &mut self.general,
            TagCategory::Artist => &mut self.artist,
            TagCategory::Copyright => &mut self.copyright,
            TagCategory::Character => &mut self.character,
            TagCategory::Species => &mut self.species,
            TagCategory::Invalid => &mut self.invalid,
            TagCategory::Lore => &mut self.lore,
            TagCategory::Meta => &mut self.meta,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub level: UserLevel,
    pub flags: UserFlags,
    pub posts_per_page: i32,
    pub favorite_count: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_approver(&self) -> bool {
        self.flags.contains(UserFlags::APPROVER)
    }

    pub fn is_banned(&self) -> bool {
        self.flags.contains(UserFlags::BANNED)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub uploader_id: i64,
    pub approver_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Id of the most recent version.
    pub version: i64,
    /// Local version number of this post.
    pub revision: i32,
    pub versions: Vec<i64>,
    pub score_up: i32,
    pub score_down: i32,
    pub score: i32,
    pub favorite_count: i32,
    pub tags: Vec<String>,
    pub locked_tags: Vec<String>,
    pub sources: Vec<String>,
    pub flags: PostFlags,
    pub rating: Rating,
    pub rating_lock: Option<RatingLock>,
    pub files: Vec<i64>,
    pub parent_id: Option<i64>,
    pub children: Vec<i64>,
    pub pools: Vec<i64>,
    pub description: String,
    pub title: String,
    pub comment_count: i32,
    pub duration: Option<f64>,
    pub file_type: String,
    pub filesize: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub tag_counts: TagCounts,
}

impl Post {
    pub fn is_rating_locked(&self) -> bool {
        self.rating_lock.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.flags.contains(PostFlags::PENDING)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(PostFlags::DELETED)
    }
}

/// Values for a post row to be inserted, tags are applied separately as a tag string.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct NewPost {
    #[serde(default)]
    pub uploader_id: i64,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub sources: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub locked_tags: Vec<String>,
    #[serde(default)]
    pub flags: PostFlags,
    pub rating: Option<Rating>,
    pub rating_lock: Option<RatingLock>,
    #[serde(default)]
    pub files: Vec<i64>,
    pub parent_id: Option<i64>,
    #[serde(default)]
    #[validate(length(max = 50000))]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub title: String,
    pub duration: Option<f64>,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub filesize: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Unversioned partial update of a post row, `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct PostUpdate {
    pub sources: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub locked_tags: Option<Vec<String>>,
    pub rating: Option<Rating>,
    pub rating_lock: Option<Option<RatingLock>>,
    pub parent_id: Option<Option<i64>>,
    pub description: Option<String>,
    pub title: Option<String>,
    pub flags: Option<PostFlags>,
    pub approver_id: Option<Option<i64>>,
    pub tag_counts: Option<TagCounts>,
}

impl PostUpdate {
    /// Apply this update to an in-memory post.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(ref sources) = self.sources {
            post.sources = sources.clone();
        }
        if let Some(ref tags) = self.tags {
            post.tags = tags.clone();
        }
        if let Some(ref locked_tags) = self.locked_tags {
            post.locked_tags = locked_tags.clone();
        }
        if let Some(rating) = self.rating {
            post.rating = rating;
        }
        if let Some(rating_lock) = self.rating_lock {
            post.rating_lock = rating_lock;
        }
        if let Some(parent_id) = self.parent_id {
            post.parent_id = parent_id;
        }
        if let Some(ref description) = self.description {
            post.description = description.clone();
        }
        if let Some(ref title) = self.title {
            post.title = title.clone();
        }
        if let Some(flags) = self.flags {
            post.flags = flags;
        }
        if let Some(approver_id) = self.approver_id {
            post.approver_id = approver_id;
        }
        if let Some(tag_counts) = self.tag_counts {
            post.tag_counts = tag_counts;
        }
    }
}

/// Current score fields of a post after an atomic adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostScore {
    pub score_up: i32,
    pub score_down: i32,
    pub score: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostVersion {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Only absent between inserting the first version and inserting its post.
    pub post_id: Option<i64>,
    pub updater_id: i64,
    pub updater_ip_address: Option<String>,
    pub revision: i32,
    pub sources: Vec<String>,
    pub old_sources: Option<Vec<String>>,
    pub added_sources: Vec<String>,
    pub removed_sources: Vec<String>,
    pub tags: Vec<String>,
    pub old_tags: Option<Vec<String>>,
    pub added_tags: Vec<String>,
    pub removed_tags: Vec<String>,
    pub locked_tags: Vec<String>,
    pub old_locked_tags: Option<Vec<String>>,
    pub added_locked_tags: Vec<String>,
    pub removed_locked_tags: Vec<String>,
    pub rating: Rating,
    pub old_rating: Option<Rating>,
    pub rating_lock: Option<RatingLock>,
    pub old_rating_lock: Option<Option<RatingLock>>,
    pub parent_id: Option<i64>,
    pub old_parent_id: Option<Option<i64>>,
    pub description: String,
    pub old_description: Option<String>,
    pub title: String,
    pub old_title: Option<String>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewPostVersion {
    pub post_id: Option<i64>,
    pub updater_id: i64,
    pub updater_ip_address: Option<String>,
    pub revision: i32,
    pub sources: Vec<String>,
    pub old_sources: Option<Vec<String>>,
    pub added_sources: Vec<String>,
    pub removed_sources: Vec<String>,
    pub tags: Vec<String>,
    pub old_tags: Option<Vec<String>>,
    pub added_tags: Vec<String>,
    pub removed_tags: Vec<String>,
    pub locked_tags: Vec<String>,
    pub old_locked_tags: Option<Vec<String>>,
    pub added_locked_tags: Vec<String>,
    pub removed_locked_tags: Vec<String>,
    pub rating: Rating,
    pub old_rating: Option<Rating>,
    pub rating_lock: Option<RatingLock>,
    pub old_rating_lock: Option<Option<RatingLock>>,
    pub parent_id: Option<i64>,
    pub old_parent_id: Option<Option<i64>>,
    pub description: String,
    pub old_description: Option<String>,
    pub title: String,
    pub old_title: Option<String>,
    pub reason: Option<String>,
}

impl NewPostVersion {
    pub fn into_version(self, id: i64, created_at: DateTime<Utc>) -> PostVersion {
        PostVersion {
            id,
            created_at,
            post_id: self.post_id,
            updater_id: self.updater_id,
            updater_ip_address: self.updater_ip_address,
            revision: self.revision,
            sources: self.sources,
            old_sources: self.old_sources,
            added_sources: self.added_sources,
            removed_sources: self.removed_sources,
            tags: self.tags,
            old_tags: self.old_tags,
            added_tags: self.added_tags,
            removed_tags: self.removed_tags,
            locked_tags: self.locked_tags,
            old_locked_tags: self.old_locked_tags,
            added_locked_tags: self.added_locked_tags,
            removed_locked_tags: self.removed_locked_tags,
            rating: self.rating,
            old_rating: self.old_rating,
            rating_lock: self.rating_lock,
            old_rating_lock: self.old_rating_lock,
            parent_id: self.parent_id,
            old_parent_id: self.old_parent_id,
            description: self.description,
            old_description: self.old_description,
            title: self.title,
            old_title: self.old_title,
            reason: self.reason,
        }
    }
}

/// Folds the tag state of an initial tag application into the creation version.
#[derive(Clone, Debug)]
pub struct InitialVersionTags {
    pub tags: Vec<String>,
    pub locked_tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub category: TagCategory,
    pub creator_id: i64,
    pub post_count: i32,
    pub locked: bool,
    pub version: i64,
    pub revision: i32,
    pub versions: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewTag {
    pub name: String,
    pub category: TagCategory,
    pub creator_id: i64,
    pub locked: bool,
}

#[derive(Clone, Debug, Default)]
pub struct TagUpdate {
    pub category: Option<TagCategory>,
    pub locked: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagVersion {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Only absent between inserting the first version and inserting its tag.
    pub tag_id: Option<i64>,
    pub updater_id: i64,
    pub updater_ip_address: Option<String>,
    pub revision: i32,
    pub category: TagCategory,
    pub old_category: Option<TagCategory>,
    pub locked: bool,
    pub old_locked: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct NewTagVersion {
    pub tag_id: Option<i64>,
    pub updater_id: i64,
    pub updater_ip_address: Option<String>,
    pub revision: i32,
    pub category: TagCategory,
    pub old_category: Option<TagCategory>,
    pub locked: bool,
    pub old_locked: Option<bool>,
}

impl NewTagVersion {
    pub fn into_version(self, id: i64, created_at: DateTime<Utc>) -> TagVersion {
        TagVersion {
            id,
            created_at,
            tag_id: self.tag_id,
            updater_id: self.updater_id,
            updater_ip_address: self.updater_ip_address,
            revision: self.revision,
            category: self.category,
            old_category: self.old_category,
            locked: self.locked,
            old_locked: self.old_locked,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostVote {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub vote_type: VoteType,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewPostVote {
    pub post_id: i64,
    pub user_id: i64,
    pub vote_type: VoteType,
    pub ip_address: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub post_id: i64,
    pub md5: String,
    pub is_primary: bool,
    pub file_type: String,
    pub mime: String,
    pub ext: String,
    pub width: i32,
    pub height: i32,
    pub flags: FileFlags,
    pub parent_id: Option<i64>,
    pub size: i64,
}

#[cfg(test)]
mod tests {
    use super::{PostFlags, Rating, RatingLock, TagCategory, TagCounts, UserLevel, VoteType};

    #[test]
    fn test_parse_enums() {
        assert_eq!("e".parse::<Rating>(), Ok(Rating::Explicit));
        assert_eq!("Questionable".parse::<Rating>(), Ok(Rating::Questionable));
        assert!("unsafe".parse::<Rating>().is_err());
        assert_eq!(RatingLock::parse_optional("none"), Ok(None));
        assert_eq!(
            RatingLock::parse_optional("exact"),
            Ok(Some(RatingLock::Exact))
        );
        assert_eq!("UP".parse::<VoteType>(), Ok(VoteType::Up));
        assert_eq!("Artist".parse::<TagCategory>(), Ok(TagCategory::Artist));
        assert_eq!(TagCategory::from_id(7), Some(TagCategory::Meta));
    }

    #[test]
    fn test_user_level_order() {
        assert!(UserLevel::Janitor > UserLevel::Privileged);
        assert!(UserLevel::Member < UserLevel::Privileged);
        assert_eq!(UserLevel::from_i32(21), Some(UserLevel::Moderator));
        assert_eq!(UserLevel::from_i32(3), None);
    }

    #[test]
    fn test_tag_counts_sum_to_total() {
        let counts = TagCounts::from_categories([
            TagCategory::General,
            TagCategory::General,
            TagCategory::Artist,
            TagCategory::Meta,
        ]);
        assert_eq!(counts.general, 2);
        assert_eq!(counts.get(TagCategory::Artist), 1);
        let sum: i32 = TagCategory::ALL.iter().map(|c| counts.get(*c)).sum();
        assert_eq!(sum, counts.total);
    }

    #[test]
    fn test_flags_serialize_as_bits() {
        let flags = PostFlags::PENDING | PostFlags::DELETED;
        assert_eq!(serde_json::to_string(&flags).unwrap(), "9");
        let parsed: PostFlags = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, PostFlags::FLAGGED);
    }
}
