table! {
    favorites (id) {
        id -> Int8,
        post_id -> Int8,
        user_id -> Int8,
        created_at -> Timestamptz,
    }
}

table! {
    files (id) {
        id -> Int8,
        post_id -> Int8,
        md5 -> Varchar,
        is_primary -> Bool,
        file_type -> Varchar,
        mime -> Varchar,
        ext -> Varchar,
        width -> Int4,
        height -> Int4,
        flags -> Int4,
        parent_id -> Nullable<Int8>,
        size -> Int8,
    }
}

table! {
    post_versions (id) {
        id -> Int8,
        created_at -> Timestamptz,
        post_id -> Nullable<Int8>,
        updater_id -> Int8,
        updater_ip_address -> Nullable<Varchar>,
        revision -> Int4,
        sources -> Array<Text>,
        old_sources -> Nullable<Array<Text>>,
        added_sources -> Array<Text>,
        removed_sources -> Array<Text>,
        tags -> Array<Text>,
        old_tags -> Nullable<Array<Text>>,
        added_tags -> Array<Text>,
        removed_tags -> Array<Text>,
        locked_tags -> Array<Text>,
        old_locked_tags -> Nullable<Array<Text>>,
        added_locked_tags -> Array<Text>,
        removed_locked_tags -> Array<Text>,
        rating -> Varchar,
        old_rating -> Nullable<Varchar>,
        rating_lock -> Nullable<Varchar>,
        old_rating_lock -> Nullable<Varchar>,
        parent_id -> Nullable<Int8>,
        old_parent_id -> Nullable<Int8>,
        description -> Text,
        old_description -> Nullable<Text>,
        title -> Text,
        old_title -> Nullable<Text>,
        reason -> Nullable<Text>,
    }
}

table! {
    post_votes (id) {
        id -> Int8,
        post_id -> Int8,
        user_id -> Int8,
        vote_type -> Varchar,
        ip_address -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

table! {
    posts (id) {
        id -> Int8,
        uploader_id -> Int8,
        approver_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
        version -> Int8,
        revision -> Int4,
        versions -> Array<Int8>,
        score_up -> Int4,
        score_down -> Int4,
        score -> Int4,
        favorite_count -> Int4,
        tags -> Array<Text>,
        locked_tags -> Array<Text>,
        sources -> Array<Text>,
        flags -> Int4,
        rating -> Varchar,
        rating_lock -> Nullable<Varchar>,
        files -> Array<Int8>,
        parent_id -> Nullable<Int8>,
        children -> Array<Int8>,
        pools -> Array<Int8>,
        description -> Text,
        title -> Text,
        comment_count -> Int4,
        duration -> Nullable<Float8>,
        file_type -> Varchar,
        filesize -> Int8,
        width -> Nullable<Int4>,
        height -> Nullable<Int4>,
        tag_count -> Int4,
        tag_count_general -> Int4,
        tag_count_artist -> Int4,
        tag_count_copyright -> Int4,
        tag_count_character -> Int4,
        tag_count_species -> Int4,
        tag_count_invalid -> Int4,
        tag_count_lore -> Int4,
        tag_count_meta -> Int4,
    }
}

table! {
    tag_versions (id) {
        id -> Int8,
        created_at -> Timestamptz,
        tag_id -> Nullable<Int8>,
        updater_id -> Int8,
        updater_ip_address -> Nullable<Varchar>,
        revision -> Int4,
        category -> Int2,
        old_category -> Nullable<Int2>,
        locked -> Bool,
        old_locked -> Nullable<Bool>,
    }
}

table! {
    tags (id) {
        id -> Int8,
        name -> Varchar,
        category -> Int2,
        creator_id -> Int8,
        post_count -> Int4,
        locked -> Bool,
        version -> Int8,
        revision -> Int4,
        versions -> Array<Int8>,
        created_at -> Timestamptz,
        updated_at -> Nullable<Timestamptz>,
    }
}

table! {
    users (id) {
        id -> Int8,
        name -> Varchar,
        level -> Int4,
        flags -> Int4,
        posts_per_page -> Int4,
        favorite_count -> Int4,
        created_at -> Timestamptz,
    }
}

joinable!(favorites -> posts (post_id));
joinable!(favorites -> users (user_id));
joinable!(files -> posts (post_id));
joinable!(post_votes -> posts (post_id));
joinable!(post_votes -> users (user_id));
joinable!(posts -> users (uploader_id));
joinable!(tags -> users (creator_id));

allow_tables_to_appear_in_same_query!(
    favorites,
    files,
    post_versions,
    post_votes,
    posts,
    tag_versions,
    tags,
    users,
);
