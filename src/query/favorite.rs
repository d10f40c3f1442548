use serde::Deserialize;
use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    store::UserDirectory,
    util::{self, deserialize_string_from_number},
};

use super::{
    Pagination, Statement,
    compiler::{Filters, assemble_statement, predicate::equals, user_name_filter},
    present,
};

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct FavoriteSearch {
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub user_id: Option<String>,
    #[validate(length(max = 255))]
    pub user_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub post_id: Option<String>,
}

pub async fn compile<L: UserDirectory + ?Sized>(
    search: &FavoriteSearch,
    pagination: Pagination,
    lookup: &L,
    config: &Config,
) -> Result<Statement, Error> {
    let mut filters = Filters::default();

    if let Some(id) = present(&search.user_id).and_then(util::parse_id) {
        filters.push(Some(equals("f.user_id", id)));
    }
    if let Some(name) = present(&search.user_name) {
        filters.push(user_name_filter("f.user_id", name, lookup, config).await?);
    }
    if let Some(id) = present(&search.post_id).and_then(util::parse_id) {
        filters.push(Some(equals("f.post_id", id)));
    }

    assemble_statement("favorites", "f", filters, None, pagination)
}

#[cfg(test)]
mod tests {
    use super::{FavoriteSearch, compile};
    use crate::{
        config::Config,
        model::UserLevel,
        query::{Pagination, compiler::predicate::SqlValue},
        store::memory::MemoryStore,
    };

    #[tokio::test]
    async fn test_user_name_resolution() {
        let store = MemoryStore::new();
        let user_id = store.add_user("fan", UserLevel::Member);
        let pagination = Pagination {
            limit: 10,
            offset: 0,
        };

        let search = FavoriteSearch {
            user_name: Some(String::from("fan")),
            post_id: Some(String::from("abc")),
            ..FavoriteSearch::default()
        };
        let statement = compile(&search, pagination, &store, &Config::default())
            .await
            .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT f.* FROM favorites f WHERE f.user_id = $1 ORDER BY id DESC LIMIT 10 OFFSET 0"
        );
        assert_eq!(statement.values, vec![SqlValue::Int(user_id)]);

        let search = FavoriteSearch {
            user_name: Some(String::from("stranger")),
            ..FavoriteSearch::default()
        };
        let strict = Config {
            strict_lookup_filters: true,
            ..Config::default()
        };
        let statement = compile(&search, pagination, &store, &strict).await.unwrap();
        assert_eq!(
            statement.sql,
            "SELECT f.* FROM favorites f WHERE FALSE ORDER BY id DESC LIMIT 10 OFFSET 0"
        );
    }
}
