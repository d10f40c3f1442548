use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    AsChangeset, ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable,
    QueryableByName,
    pg::Pg,
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_types::{BigInt, Bool, Double, Integer, Text},
};
use diesel_async::{
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
    pooled_connection::{
        AsyncDieselConnectionManager,
        deadpool::{Object, Pool},
    },
    scoped_futures::ScopedFutureExt,
};
#[cfg(feature = "auto_migration")]
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::{
    config::Config,
    error::Error,
    model::{
        Favorite, File, FileFlags, InitialVersionTags, NewPost, NewPostVersion, NewPostVote,
        NewTag, NewTagVersion, Post, PostFlags, PostScore, PostUpdate, PostVersion, PostVote,
        Rating, RatingLock, Tag, TagCategory, TagCounts, TagUpdate, TagVersion, User, UserFlags,
        UserLevel, VoteType,
    },
    query::{Statement, compiler::predicate::SqlValue},
    schema::{favorites, files, post_versions, post_votes, posts, tag_versions, tags, users},
};

use super::{FileLookup, SearchExecutor, Store, UserDirectory};

#[cfg(feature = "auto_migration")]
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

diesel::define_sql_function!(fn lower(x: Text) -> Text);

/// Run all pending migrations on a dedicated blocking connection.
#[cfg(feature = "auto_migration")]
pub async fn run_migrations(config: &Config) -> Result<(), Error> {
    use diesel::Connection;

    let database_url = database_url(config)?.to_string();
    tokio::task::spawn_blocking(move || {
        log::info!("Running diesel migrations");
        let mut connection = diesel::PgConnection::establish(&database_url).map_err(|e| {
            log::error!("Failed to establish connection for migrations: {e}");
            Error::DatabaseConnectionError
        })?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| Error::QueryError(format!("Failed running db migrations: {e}")))?;
        log::info!("Done running diesel migrations");
        Ok(())
    })
    .await
    .map_err(|e| Error::QueryError(format!("Migration task failed: {e}")))?
}

fn database_url(config: &Config) -> Result<&str, Error> {
    config.database_url.as_deref().ok_or_else(|| {
        Error::ConfigurationError(String::from(
            "Missing environment variable DATABASE_URL must be set to connect to postgres",
        ))
    })
}

fn corrupt(column: &str, value: impl std::fmt::Display) -> Error {
    Error::QueryError(format!("Invalid value '{value}' stored in column {column}"))
}

fn decode_rating(value: &str) -> Result<Rating, Error> {
    value.parse().map_err(|_| corrupt("rating", value))
}

fn decode_rating_lock(value: Option<&str>) -> Result<Option<RatingLock>, Error> {
    value
        .map(|lock| lock.parse().map_err(|_| corrupt("rating_lock", lock)))
        .transpose()
}

fn decode_category(value: i16) -> Result<TagCategory, Error> {
    TagCategory::from_id(value).ok_or_else(|| corrupt("category", value))
}

// a recorded change from no lock is stored as 'none', a recorded change from no parent as 0
const RECORDED_NO_LOCK: &str = "none";
const RECORDED_NO_PARENT: i64 = 0;

fn encode_old_rating_lock(value: Option<Option<RatingLock>>) -> Option<&'static str> {
    value.map(|lock| lock.map(|l| l.as_str()).unwrap_or(RECORDED_NO_LOCK))
}

fn decode_old_rating_lock(value: Option<&str>) -> Result<Option<Option<RatingLock>>, Error> {
    match value {
        None => Ok(None),
        Some(lock) => RatingLock::parse_optional(lock)
            .map(Some)
            .map_err(|_| corrupt("old_rating_lock", lock)),
    }
}

fn encode_old_parent_id(value: Option<Option<i64>>) -> Option<i64> {
    value.map(|parent| parent.unwrap_or(RECORDED_NO_PARENT))
}

fn decode_old_parent_id(value: Option<i64>) -> Option<Option<i64>> {
    value.map(|parent| Some(parent).filter(|id| *id != RECORDED_NO_PARENT))
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = posts)]
struct PostRow {
    id: i64,
    uploader_id: i64,
    approver_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    version: i64,
    revision: i32,
    versions: Vec<i64>,
    score_up: i32,
    score_down: i32,
    score: i32,
    favorite_count: i32,
    tags: Vec<String>,
    locked_tags: Vec<String>,
    sources: Vec<String>,
    flags: i32,
    rating: String,
    rating_lock: Option<String>,
    files: Vec<i64>,
    parent_id: Option<i64>,
    children: Vec<i64>,
    pools: Vec<i64>,
    description: String,
    title: String,
    comment_count: i32,
    duration: Option<f64>,
    file_type: String,
    filesize: i64,
    width: Option<i32>,
    height: Option<i32>,
    tag_count: i32,
    tag_count_general: i32,
    tag_count_artist: i32,
    tag_count_copyright: i32,
    tag_count_character: i32,
    tag_count_species: i32,
    tag_count_invalid: i32,
    tag_count_lore: i32,
    tag_count_meta: i32,
}

impl TryFrom<PostRow> for Post {
    type Error = Error;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Post {
            id: row.id,
            uploader_id: row.uploader_id,
            approver_id: row.approver_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
            revision: row.revision,
            versions: row.versions,
            score_up: row.score_up,
            score_down: row.score_down,
            score: row.score,
            favorite_count: row.favorite_count,
            tags: row.tags,
            locked_tags: row.locked_tags,
            sources: row.sources,
            flags: PostFlags::from_bits_truncate(row.flags),
            rating: decode_rating(&row.rating)?,
            rating_lock: decode_rating_lock(row.rating_lock.as_deref())?,
            files: row.files,
            parent_id: row.parent_id,
            children: row.children,
            pools: row.pools,
            description: row.description,
            title: row.title,
            comment_count: row.comment_count,
            duration: row.duration,
            file_type: row.file_type,
            filesize: row.filesize,
            width: row.width,
            height: row.height,
            tag_counts: TagCounts {
                general: row.tag_count_general,
                artist: row.tag_count_artist,
                copyright: row.tag_count_copyright,
                character: row.tag_count_character,
                species: row.tag_count_species,
                invalid: row.tag_count_invalid,
                lore: row.tag_count_lore,
                meta: row.tag_count_meta,
                total: row.tag_count,
            },
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = posts)]
struct NewPostRow {
    uploader_id: i64,
    version: i64,
    revision: i32,
    versions: Vec<i64>,
    locked_tags: Vec<String>,
    sources: Vec<String>,
    flags: i32,
    rating: &'static str,
    rating_lock: Option<&'static str>,
    files: Vec<i64>,
    parent_id: Option<i64>,
    description: String,
    title: String,
    duration: Option<f64>,
    file_type: String,
    filesize: i64,
    width: Option<i32>,
    height: Option<i32>,
}

#[derive(AsChangeset)]
#[diesel(table_name = posts)]
struct PostChangeset {
    updated_at: DateTime<Utc>,
    sources: Option<Vec<String>>,
    tags: Option<Vec<String>>,
    locked_tags: Option<Vec<String>>,
    rating: Option<&'static str>,
    rating_lock: Option<Option<&'static str>>,
    parent_id: Option<Option<i64>>,
    description: Option<String>,
    title: Option<String>,
    flags: Option<i32>,
    approver_id: Option<Option<i64>>,
    tag_count: Option<i32>,
    tag_count_general: Option<i32>,
    tag_count_artist: Option<i32>,
    tag_count_copyright: Option<i32>,
    tag_count_character: Option<i32>,
    tag_count_species: Option<i32>,
    tag_count_invalid: Option<i32>,
    tag_count_lore: Option<i32>,
    tag_count_meta: Option<i32>,
}

impl From<&PostUpdate> for PostChangeset {
    fn from(update: &PostUpdate) -> Self {
        let counts = update.tag_counts;
        PostChangeset {
            updated_at: Utc::now(),
            sources: update.sources.clone(),
            tags: update.tags.clone(),
            locked_tags: update.locked_tags.clone(),
            rating: update.rating.map(|r| r.as_str()),
            rating_lock: update.rating_lock.map(|lock| lock.map(|l| l.as_str())),
            parent_id: update.parent_id,
            description: update.description.clone(),
            title: update.title.clone(),
            flags: update.flags.map(|f| f.bits()),
            approver_id: update.approver_id,
            tag_count: counts.map(|c| c.total),
            tag_count_general: counts.map(|c| c.general),
            tag_count_artist: counts.map(|c| c.artist),
            tag_count_copyright: counts.map(|c| c.copyright),
            tag_count_character: counts.map(|c| c.character),
            tag_count_species: counts.map(|c| c.species),
            tag_count_invalid: counts.map(|c| c.invalid),
            tag_count_lore: counts.map(|c| c.lore),
            tag_count_meta: counts.map(|c| c.meta),
        }
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = post_versions)]
struct PostVersionRow {
    id: i64,
    created_at: DateTime<Utc>,
    post_id: Option<i64>,
    updater_id: i64,
    updater_ip_address: Option<String>,
    revision: i32,
    sources: Vec<String>,
    old_sources: Option<Vec<String>>,
    added_sources: Vec<String>,
    removed_sources: Vec<String>,
    tags: Vec<String>,
    old_tags: Option<Vec<String>>,
    added_tags: Vec<String>,
    removed_tags: Vec<String>,
    locked_tags: Vec<String>,
    old_locked_tags: Option<Vec<String>>,
    added_locked_tags: Vec<String>,
    removed_locked_tags: Vec<String>,
    rating: String,
    old_rating: Option<String>,
    rating_lock: Option<String>,
    old_rating_lock: Option<String>,
    parent_id: Option<i64>,
    old_parent_id: Option<i64>,
    description: String,
    old_description: Option<String>,
    title: String,
    old_title: Option<String>,
    reason: Option<String>,
}

impl TryFrom<PostVersionRow> for PostVersion {
    type Error = Error;

    fn try_from(row: PostVersionRow) -> Result<Self, Self::Error> {
        Ok(PostVersion {
            id: row.id,
            created_at: row.created_at,
            post_id: row.post_id,
            updater_id: row.updater_id,
            updater_ip_address: row.updater_ip_address,
            revision: row.revision,
            sources: row.sources,
            old_sources: row.old_sources,
            added_sources: row.added_sources,
            removed_sources: row.removed_sources,
            tags: row.tags,
            old_tags: row.old_tags,
            added_tags: row.added_tags,
            removed_tags: row.removed_tags,
            locked_tags: row.locked_tags,
            old_locked_tags: row.old_locked_tags,
            added_locked_tags: row.added_locked_tags,
            removed_locked_tags: row.removed_locked_tags,
            rating: decode_rating(&row.rating)?,
            old_rating: row.old_rating.as_deref().map(decode_rating).transpose()?,
            rating_lock: decode_rating_lock(row.rating_lock.as_deref())?,
            old_rating_lock: decode_old_rating_lock(row.old_rating_lock.as_deref())?,
            parent_id: row.parent_id,
            old_parent_id: decode_old_parent_id(row.old_parent_id),
            description: row.description,
            old_description: row.old_description,
            title: row.title,
            old_title: row.old_title,
            reason: row.reason,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = post_versions)]
struct NewPostVersionRow {
    post_id: Option<i64>,
    updater_id: i64,
    updater_ip_address: Option<String>,
    revision: i32,
    sources: Vec<String>,
    old_sources: Option<Vec<String>>,
    added_sources: Vec<String>,
    removed_sources: Vec<String>,
    tags: Vec<String>,
    old_tags: Option<Vec<String>>,
    added_tags: Vec<String>,
    removed_tags: Vec<String>,
    locked_tags: Vec<String>,
    old_locked_tags: Option<Vec<String>>,
    added_locked_tags: Vec<String>,
    removed_locked_tags: Vec<String>,
    rating: &'static str,
    old_rating: Option<&'static str>,
    rating_lock: Option<&'static str>,
    old_rating_lock: Option<&'static str>,
    parent_id: Option<i64>,
    old_parent_id: Option<i64>,
    description: String,
    old_description: Option<String>,
    title: String,
    old_title: Option<String>,
    reason: Option<String>,
}

impl From<NewPostVersion> for NewPostVersionRow {
    fn from(version: NewPostVersion) -> Self {
        NewPostVersionRow {
            post_id: version.post_id,
            updater_id: version.updater_id,
            updater_ip_address: version.updater_ip_address,
            revision: version.revision,
            sources: version.sources,
            old_sources: version.old_sources,
            added_sources: version.added_sources,
            removed_sources: version.removed_sources,
            tags: version.tags,
            old_tags: version.old_tags,
            added_tags: version.added_tags,
            removed_tags: version.removed_tags,
            locked_tags: version.locked_tags,
            old_locked_tags: version.old_locked_tags,
            added_locked_tags: version.added_locked_tags,
            removed_locked_tags: version.removed_locked_tags,
            rating: version.rating.as_str(),
            old_rating: version.old_rating.map(|r| r.as_str()),
            rating_lock: version.rating_lock.map(|l| l.as_str()),
            old_rating_lock: encode_old_rating_lock(version.old_rating_lock),
            parent_id: version.parent_id,
            old_parent_id: encode_old_parent_id(version.old_parent_id),
            description: version.description,
            old_description: version.old_description,
            title: version.title,
            old_title: version.old_title,
            reason: version.reason,
        }
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = tags)]
struct TagRow {
    id: i64,
    name: String,
    category: i16,
    creator_id: i64,
    post_count: i32,
    locked: bool,
    version: i64,
    revision: i32,
    versions: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<TagRow> for Tag {
    type Error = Error;

    fn try_from(row: TagRow) -> Result<Self, Self::Error> {
        Ok(Tag {
            id: row.id,
            name: row.name,
            category: decode_category(row.category)?,
            creator_id: row.creator_id,
            post_count: row.post_count,
            locked: row.locked,
            version: row.version,
            revision: row.revision,
            versions: row.versions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable)]
struct TagVersionRow {
    id: i64,
    created_at: DateTime<Utc>,
    tag_id: Option<i64>,
    updater_id: i64,
    updater_ip_address: Option<String>,
    revision: i32,
    category: i16,
    old_category: Option<i16>,
    locked: bool,
    old_locked: Option<bool>,
}

impl TryFrom<TagVersionRow> for TagVersion {
    type Error = Error;

    fn try_from(row: TagVersionRow) -> Result<Self, Self::Error> {
        Ok(TagVersion {
            id: row.id,
            created_at: row.created_at,
            tag_id: row.tag_id,
            updater_id: row.updater_id,
            updater_ip_address: row.updater_ip_address,
            revision: row.revision,
            category: decode_category(row.category)?,
            old_category: row.old_category.map(decode_category).transpose()?,
            locked: row.locked,
            old_locked: row.old_locked,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = tag_versions)]
struct NewTagVersionRow {
    tag_id: Option<i64>,
    updater_id: i64,
    updater_ip_address: Option<String>,
    revision: i32,
    category: i16,
    old_category: Option<i16>,
    locked: bool,
    old_locked: Option<bool>,
}

impl From<NewTagVersion> for NewTagVersionRow {
    fn from(version: NewTagVersion) -> Self {
        NewTagVersionRow {
            tag_id: version.tag_id,
            updater_id: version.updater_id,
            updater_ip_address: version.updater_ip_address,
            revision: version.revision,
            category: version.category.id(),
            old_category: version.old_category.map(|c| c.id()),
            locked: version.locked,
            old_locked: version.old_locked,
        }
    }
}

#[derive(Queryable)]
struct PostVoteRow {
    id: i64,
    post_id: i64,
    user_id: i64,
    vote_type: String,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<PostVoteRow> for PostVote {
    type Error = Error;

    fn try_from(row: PostVoteRow) -> Result<Self, Self::Error> {
        Ok(PostVote {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            vote_type: row
                .vote_type
                .parse::<VoteType>()
                .map_err(|_| corrupt("vote_type", &row.vote_type))?,
            ip_address: row.ip_address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = favorites)]
struct FavoriteRow {
    id: i64,
    post_id: i64,
    user_id: i64,
    created_at: DateTime<Utc>,
}

impl From<FavoriteRow> for Favorite {
    fn from(row: FavoriteRow) -> Self {
        Favorite {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, QueryableByName)]
#[diesel(table_name = files)]
struct FileRow {
    id: i64,
    post_id: i64,
    md5: String,
    is_primary: bool,
    file_type: String,
    mime: String,
    ext: String,
    width: i32,
    height: i32,
    flags: i32,
    parent_id: Option<i64>,
    size: i64,
}

impl From<FileRow> for File {
    fn from(row: FileRow) -> Self {
        File {
            id: row.id,
            post_id: row.post_id,
            md5: row.md5,
            is_primary: row.is_primary,
            file_type: row.file_type,
            mime: row.mime,
            ext: row.ext,
            width: row.width,
            height: row.height,
            flags: FileFlags::from_bits_truncate(row.flags),
            parent_id: row.parent_id,
            size: row.size,
        }
    }
}

#[derive(Queryable)]
struct UserRow {
    id: i64,
    name: String,
    level: i32,
    flags: i32,
    posts_per_page: i32,
    favorite_count: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            level: UserLevel::from_i32(row.level).ok_or_else(|| corrupt("level", row.level))?,
            flags: UserFlags::from_bits_truncate(row.flags),
            posts_per_page: row.posts_per_page,
            favorite_count: row.favorite_count,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T: TryFrom<R, Error = Error>>(rows: Vec<R>) -> Result<Vec<T>, Error> {
    rows.into_iter().map(T::try_from).collect()
}

/// Bind the positional values of a compiled statement in order.
fn bind_statement(statement: &Statement) -> BoxedSqlQuery<'_, Pg, SqlQuery> {
    let mut query = diesel::sql_query(statement.sql.as_str()).into_boxed::<Pg>();
    for value in &statement.values {
        query = match value {
            SqlValue::Int(v) => query.bind::<BigInt, _>(*v),
            SqlValue::Float(v) => query.bind::<Double, _>(*v),
            SqlValue::Text(v) => query.bind::<Text, _>(v.as_str()),
            SqlValue::Bool(v) => query.bind::<Bool, _>(*v),
        };
    }
    query
}

/// PostgreSQL store backed by a diesel-async deadpool connection pool.
pub struct PgStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgStore {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url(config)?);
        let pool = Pool::builder(manager)
            .max_size(config.max_db_connections)
            .build()
            .map_err(|e| Error::ConfigurationError(format!("Failed to initialise connection pool: {e}")))?;
        Ok(PgStore { pool })
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>, Error> {
        self.pool.get().await.map_err(|e| {
            log::error!("Failed to acquire database connection: {e}");
            Error::DatabaseConnectionError
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, Error> {
        let mut connection = self.connection().await?;
        posts::table
            .find(id)
            .get_result::<PostRow>(&mut connection)
            .await
            .optional()?
            .map(Post::try_from)
            .transpose()
    }

    async fn insert_post(&self, post: NewPost, version_id: i64) -> Result<Post, Error> {
        let mut connection = self.connection().await?;
        let row = NewPostRow {
            uploader_id: post.uploader_id,
            version: version_id,
            revision: 1,
            versions: vec![version_id],
            locked_tags: post.locked_tags,
            sources: post.sources,
            flags: post.flags.bits(),
            rating: post.rating.unwrap_or(Rating::Explicit).as_str(),
            rating_lock: post.rating_lock.map(|l| l.as_str()),
            files: post.files,
            parent_id: post.parent_id,
            description: post.description,
            title: post.title,
            duration: post.duration,
            file_type: post.file_type,
            filesize: post.filesize,
            width: post.width,
            height: post.height,
        };
        diesel::insert_into(posts::table)
            .values(&row)
            .get_result::<PostRow>(&mut connection)
            .await?
            .try_into()
    }

    async fn update_post(&self, id: i64, update: &PostUpdate) -> Result<bool, Error> {
        let mut connection = self.connection().await?;
        let updated = diesel::update(posts::table.find(id))
            .set(PostChangeset::from(update))
            .execute(&mut connection)
            .await?;
        Ok(updated > 0)
    }

    async fn adjust_post_score(
        &self,
        id: i64,
        up_delta: i32,
        down_delta: i32,
    ) -> Result<Option<PostScore>, Error> {
        let mut connection = self.connection().await?;
        let score = diesel::update(posts::table.find(id))
            .set((
                posts::score_up.eq(posts::score_up + up_delta),
                posts::score_down.eq(posts::score_down + down_delta),
                posts::score.eq(posts::score + (up_delta - down_delta)),
            ))
            .returning((posts::score_up, posts::score_down, posts::score))
            .get_result::<(i32, i32, i32)>(&mut connection)
            .await
            .optional()?;
        Ok(score.map(|(score_up, score_down, score)| PostScore {
            score_up,
            score_down,
            score,
        }))
    }

    async fn adjust_post_favorite_count(&self, id: i64, delta: i32) -> Result<Option<i32>, Error> {
        let mut connection = self.connection().await?;
        Ok(diesel::update(posts::table.find(id))
            .set(posts::favorite_count.eq(posts::favorite_count + delta))
            .returning(posts::favorite_count)
            .get_result::<i32>(&mut connection)
            .await
            .optional()?)
    }

    async fn insert_post_version(&self, version: NewPostVersion) -> Result<PostVersion, Error> {
        let mut connection = self.connection().await?;
        diesel::insert_into(post_versions::table)
            .values(NewPostVersionRow::from(version))
            .get_result::<PostVersionRow>(&mut connection)
            .await?
            .try_into()
    }

    async fn get_post_version(&self, id: i64) -> Result<Option<PostVersion>, Error> {
        let mut connection = self.connection().await?;
        post_versions::table
            .find(id)
            .get_result::<PostVersionRow>(&mut connection)
            .await
            .optional()?
            .map(PostVersion::try_from)
            .transpose()
    }

    async fn get_post_versions(&self, post_id: i64) -> Result<Vec<PostVersion>, Error> {
        let mut connection = self.connection().await?;
        let rows = post_versions::table
            .filter(post_versions::post_id.eq(post_id))
            .order(post_versions::revision.asc())
            .load::<PostVersionRow>(&mut connection)
            .await?;
        convert_all(rows)
    }

    async fn set_post_version_post_id(&self, version_id: i64, post_id: i64) -> Result<bool, Error> {
        let mut connection = self.connection().await?;
        let updated = diesel::update(post_versions::table.find(version_id))
            .set(post_versions::post_id.eq(post_id))
            .execute(&mut connection)
            .await?;
        Ok(updated > 0)
    }

    async fn fold_initial_version(
        &self,
        version_id: i64,
        tags: &InitialVersionTags,
    ) -> Result<bool, Error> {
        let mut connection = self.connection().await?;
        let updated = diesel::update(post_versions::table.find(version_id))
            .set((
                post_versions::tags.eq(&tags.tags),
                post_versions::added_tags.eq(&tags.tags),
                post_versions::locked_tags.eq(&tags.locked_tags),
                post_versions::added_locked_tags.eq(&tags.locked_tags),
            ))
            .execute(&mut connection)
            .await?;
        Ok(updated > 0)
    }

    async fn append_post_version(
        &self,
        post_id: i64,
        expected_revision: i32,
        version: NewPostVersion,
        update: &PostUpdate,
    ) -> Result<Option<PostVersion>, Error> {
        let mut connection = self.connection().await?;
        connection
            .transaction::<_, Error, _>(|connection| {
                async move {
                    let current = posts::table
                        .find(post_id)
                        .select((posts::revision, posts::versions))
                        .for_update()
                        .get_result::<(i32, Vec<i64>)>(connection)
                        .await
                        .optional()?;
                    let mut versions = match current {
                        Some((revision, versions)) if revision == expected_revision => versions,
                        _ => return Ok(None),
                    };

                    let version = diesel::insert_into(post_versions::table)
                        .values(NewPostVersionRow::from(version))
                        .get_result::<PostVersionRow>(connection)
                        .await?;
                    versions.push(version.id);

                    diesel::update(posts::table.find(post_id))
                        .set((
                            PostChangeset::from(update),
                            posts::version.eq(version.id),
                            posts::revision.eq(version.revision),
                            posts::versions.eq(versions),
                        ))
                        .execute(connection)
                        .await?;

                    PostVersion::try_from(version).map(Some)
                }
                .scope_boxed()
            })
            .await
    }

    async fn get_tag(&self, id: i64) -> Result<Option<Tag>, Error> {
        let mut connection = self.connection().await?;
        tags::table
            .find(id)
            .get_result::<TagRow>(&mut connection)
            .await
            .optional()?
            .map(Tag::try_from)
            .transpose()
    }

    async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>, Error> {
        let mut connection = self.connection().await?;
        tags::table
            .filter(tags::name.eq(name))
            .get_result::<TagRow>(&mut connection)
            .await
            .optional()?
            .map(Tag::try_from)
            .transpose()
    }

    async fn get_tag_categories(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, TagCategory>, Error> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let mut connection = self.connection().await?;
        let rows = tags::table
            .filter(tags::name.eq_any(names))
            .select((tags::name, tags::category))
            .load::<(String, i16)>(&mut connection)
            .await?;
        rows.into_iter()
            .map(|(name, category)| Ok((name, decode_category(category)?)))
            .collect()
    }

    async fn insert_tag_with_version(
        &self,
        tag: NewTag,
        version: NewTagVersion,
    ) -> Result<(Tag, TagVersion), Error> {
        let mut connection = self.connection().await?;
        connection
            .transaction::<_, Error, _>(|connection| {
                async move {
                    let version = diesel::insert_into(tag_versions::table)
                        .values(NewTagVersionRow::from(version))
                        .get_result::<TagVersionRow>(connection)
                        .await?;

                    let tag = diesel::insert_into(tags::table)
                        .values((
                            tags::name.eq(&tag.name),
                            tags::category.eq(tag.category.id()),
                            tags::creator_id.eq(tag.creator_id),
                            tags::locked.eq(tag.locked),
                            tags::version.eq(version.id),
                            tags::revision.eq(version.revision),
                            tags::versions.eq(vec![version.id]),
                        ))
                        .get_result::<TagRow>(connection)
                        .await?;

                    let version = diesel::update(tag_versions::table.find(version.id))
                        .set(tag_versions::tag_id.eq(tag.id))
                        .get_result::<TagVersionRow>(connection)
                        .await?;

                    Ok((Tag::try_from(tag)?, TagVersion::try_from(version)?))
                }
                .scope_boxed()
            })
            .await
    }

    async fn get_tag_versions(&self, tag_id: i64) -> Result<Vec<TagVersion>, Error> {
        let mut connection = self.connection().await?;
        let rows = tag_versions::table
            .filter(tag_versions::tag_id.eq(tag_id))
            .order(tag_versions::revision.asc())
            .load::<TagVersionRow>(&mut connection)
            .await?;
        convert_all(rows)
    }

    async fn append_tag_version(
        &self,
        tag_id: i64,
        expected_revision: i32,
        version: NewTagVersion,
        update: &TagUpdate,
    ) -> Result<Option<TagVersion>, Error> {
        let mut connection = self.connection().await?;
        connection
            .transaction::<_, Error, _>(|connection| {
                async move {
                    let current = tags::table
                        .find(tag_id)
                        .select((tags::revision, tags::versions))
                        .for_update()
                        .get_result::<(i32, Vec<i64>)>(connection)
                        .await
                        .optional()?;
                    let mut versions = match current {
                        Some((revision, versions)) if revision == expected_revision => versions,
                        _ => return Ok(None),
                    };

                    let version = diesel::insert_into(tag_versions::table)
                        .values(NewTagVersionRow::from(version))
                        .get_result::<TagVersionRow>(connection)
                        .await?;
                    versions.push(version.id);

                    diesel::update(tags::table.find(tag_id))
                        .set((
                            update.category.map(|c| tags::category.eq(c.id())),
                            update.locked.map(|l| tags::locked.eq(l)),
                            tags::version.eq(version.id),
                            tags::revision.eq(version.revision),
                            tags::versions.eq(versions),
                            tags::updated_at.eq(Some(version.created_at)),
                        ))
                        .execute(connection)
                        .await?;

                    TagVersion::try_from(version).map(Some)
                }
                .scope_boxed()
            })
            .await
    }

    async fn adjust_tag_post_counts(
        &self,
        added: &[String],
        removed: &[String],
    ) -> Result<(), Error> {
        let mut connection = self.connection().await?;
        connection
            .transaction::<_, Error, _>(|connection| {
                async move {
                    if !added.is_empty() {
                        diesel::update(tags::table.filter(tags::name.eq_any(added)))
                            .set(tags::post_count.eq(tags::post_count + 1))
                            .execute(connection)
                            .await?;
                    }
                    if !removed.is_empty() {
                        diesel::update(tags::table.filter(tags::name.eq_any(removed)))
                            .set(tags::post_count.eq(diesel::dsl::sql::<Integer>(
                                "GREATEST(post_count - 1, 0)",
                            )))
                            .execute(connection)
                            .await?;
                    }
                    Ok(())
                }
                .scope_boxed()
            })
            .await
    }

    async fn get_vote(&self, post_id: i64, user_id: i64) -> Result<Option<PostVote>, Error> {
        let mut connection = self.connection().await?;
        post_votes::table
            .filter(post_votes::post_id.eq(post_id))
            .filter(post_votes::user_id.eq(user_id))
            .get_result::<PostVoteRow>(&mut connection)
            .await
            .optional()?
            .map(PostVote::try_from)
            .transpose()
    }

    async fn insert_vote(&self, vote: NewPostVote) -> Result<PostVote, Error> {
        let mut connection = self.connection().await?;
        diesel::insert_into(post_votes::table)
            .values((
                post_votes::post_id.eq(vote.post_id),
                post_votes::user_id.eq(vote.user_id),
                post_votes::vote_type.eq(vote.vote_type.as_str()),
                post_votes::ip_address.eq(vote.ip_address),
            ))
            .get_result::<PostVoteRow>(&mut connection)
            .await?
            .try_into()
    }

    async fn update_vote(
        &self,
        id: i64,
        vote_type: VoteType,
        ip_address: Option<&str>,
    ) -> Result<bool, Error> {
        let mut connection = self.connection().await?;
        let updated = diesel::update(post_votes::table.find(id))
            .set((
                post_votes::vote_type.eq(vote_type.as_str()),
                post_votes::ip_address.eq(ip_address),
                post_votes::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut connection)
            .await?;
        Ok(updated > 0)
    }

    async fn get_favorite(&self, post_id: i64, user_id: i64) -> Result<Option<Favorite>, Error> {
        let mut connection = self.connection().await?;
        Ok(favorites::table
            .filter(favorites::post_id.eq(post_id))
            .filter(favorites::user_id.eq(user_id))
            .get_result::<FavoriteRow>(&mut connection)
            .await
            .optional()?
            .map(Favorite::from))
    }

    async fn insert_favorite(&self, post_id: i64, user_id: i64) -> Result<Favorite, Error> {
        let mut connection = self.connection().await?;
        Ok(diesel::insert_into(favorites::table)
            .values((
                favorites::post_id.eq(post_id),
                favorites::user_id.eq(user_id),
            ))
            .get_result::<FavoriteRow>(&mut connection)
            .await?
            .into())
    }

    async fn delete_favorite(&self, id: i64) -> Result<bool, Error> {
        let mut connection = self.connection().await?;
        let deleted = diesel::delete(favorites::table.find(id))
            .execute(&mut connection)
            .await?;
        Ok(deleted > 0)
    }

    async fn adjust_user_favorite_count(
        &self,
        user_id: i64,
        delta: i32,
    ) -> Result<Option<i32>, Error> {
        let mut connection = self.connection().await?;
        Ok(diesel::update(users::table.find(user_id))
            .set(users::favorite_count.eq(users::favorite_count + delta))
            .returning(users::favorite_count)
            .get_result::<i32>(&mut connection)
            .await
            .optional()?)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user(&self, id: i64) -> Result<Option<User>, Error> {
        let mut connection = self.connection().await?;
        users::table
            .find(id)
            .get_result::<UserRow>(&mut connection)
            .await
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    async fn name_to_id(&self, name: &str) -> Result<Option<i64>, Error> {
        let mut connection = self.connection().await?;
        Ok(users::table
            .filter(lower(users::name).eq(name.to_lowercase()))
            .select(users::id)
            .get_result::<i64>(&mut connection)
            .await
            .optional()?)
    }

    async fn id_to_name(&self, id: i64) -> Result<Option<String>, Error> {
        let mut connection = self.connection().await?;
        Ok(users::table
            .find(id)
            .select(users::name)
            .get_result::<String>(&mut connection)
            .await
            .optional()?)
    }
}

#[async_trait]
impl FileLookup for PgStore {
    async fn post_id_for_md5(&self, md5: &str) -> Result<Option<i64>, Error> {
        let mut connection = self.connection().await?;
        Ok(files::table
            .filter(files::md5.eq(md5.to_lowercase()))
            .select(files::post_id)
            .order(files::id.asc())
            .first::<i64>(&mut connection)
            .await
            .optional()?)
    }
}

#[async_trait]
impl SearchExecutor for PgStore {
    async fn load_posts(&self, statement: &Statement) -> Result<Vec<Post>, Error> {
        let mut connection = self.connection().await?;
        let rows = bind_statement(statement)
            .load::<PostRow>(&mut connection)
            .await?;
        convert_all(rows)
    }

    async fn load_post_versions(&self, statement: &Statement) -> Result<Vec<PostVersion>, Error> {
        let mut connection = self.connection().await?;
        let rows = bind_statement(statement)
            .load::<PostVersionRow>(&mut connection)
            .await?;
        convert_all(rows)
    }

    async fn load_tags(&self, statement: &Statement) -> Result<Vec<Tag>, Error> {
        let mut connection = self.connection().await?;
        let rows = bind_statement(statement)
            .load::<TagRow>(&mut connection)
            .await?;
        convert_all(rows)
    }

    async fn load_favorites(&self, statement: &Statement) -> Result<Vec<Favorite>, Error> {
        let mut connection = self.connection().await?;
        let rows = bind_statement(statement)
            .load::<FavoriteRow>(&mut connection)
            .await?;
        Ok(rows.into_iter().map(Favorite::from).collect())
    }

    async fn load_files(&self, statement: &Statement) -> Result<Vec<File>, Error> {
        let mut connection = self.connection().await?;
        let rows = bind_statement(statement)
            .load::<FileRow>(&mut connection)
            .await?;
        Ok(rows.into_iter().map(File::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        decode_old_parent_id, decode_old_rating_lock, encode_old_parent_id, encode_old_rating_lock,
    };
    use crate::model::RatingLock;

    #[test]
    fn test_recorded_absent_values() {
        assert_eq!(encode_old_rating_lock(None), None);
        assert_eq!(encode_old_rating_lock(Some(None)), Some("none"));
        assert_eq!(
            decode_old_rating_lock(encode_old_rating_lock(Some(Some(RatingLock::Exact)))).unwrap(),
            Some(Some(RatingLock::Exact))
        );
        assert_eq!(decode_old_rating_lock(Some("none")).unwrap(), Some(None));
        assert!(decode_old_rating_lock(Some("sideways")).is_err());

        assert_eq!(decode_old_parent_id(encode_old_parent_id(Some(None))), Some(None));
        assert_eq!(decode_old_parent_id(encode_old_parent_id(Some(Some(7)))), Some(Some(7)));
        assert_eq!(decode_old_parent_id(None), None);
    }
}
