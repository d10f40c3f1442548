use serde::Deserialize;
use validator::Validate;

use crate::{
    config::Config,
    error::Error,
    model::TagCategory,
    util::{self, deserialize_string_from_number},
};

use super::{
    Direction, Ordering, Pagination, Statement,
    compiler::{
        Filters, assemble_statement,
        order::OrderDirective,
        predicate::{LikeWrap, NumberKind, equals, like_match, with_operator},
    },
    present,
};

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct TagSearch {
    /// Exact name, or a pattern if it contains the wildcard character.
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// Category name or id.
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub post_count: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub locked: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub creator_id: Option<String>,
    /// `name`, `count` or `id`.
    pub order: Option<String>,
}

pub fn compile(
    search: &TagSearch,
    pagination: Pagination,
    config: &Config,
) -> Result<Statement, Error> {
    let mut filters = Filters::default();

    if let Some(name) = present(&search.name) {
        let name = name.to_lowercase();
        if name.contains(config.wildcard_character) {
            filters.push(like_match(
                "t.name",
                &name,
                LikeWrap::None,
                config.wildcard_character,
            ));
        } else {
            filters.push(Some(equals("t.name", name)));
        }
    }
    if let Some(category) = present(&search.category).and_then(parse_category) {
        filters.push(Some(equals("t.category", i64::from(category.id()))));
    }
    if let Some(post_count) = present(&search.post_count) {
        filters.push(with_operator("t.post_count", post_count, NumberKind::Int));
    }
    if let Some(locked) = present(&search.locked).and_then(util::parse_boolean) {
        filters.push(Some(equals("t.locked", locked)));
    }
    if let Some(id) = present(&search.creator_id).and_then(util::parse_id) {
        filters.push(Some(equals("t.creator_id", id)));
    }

    let order = present(&search.order).and_then(parse_tag_order);
    assemble_statement("tags", "t", filters, order.as_ref(), pagination)
}

fn parse_category(value: &str) -> Option<TagCategory> {
    match value.parse::<i16>() {
        Ok(id) => TagCategory::from_id(id),
        Err(_) => value.parse::<TagCategory>().ok(),
    }
}

fn parse_tag_order(key: &str) -> Option<OrderDirective> {
    let (expression, direction) = match key.to_lowercase().as_str() {
        "name" => ("name", Direction::Ascending),
        "count" => ("post_count", Direction::Descending),
        "id" => ("id", Direction::Descending),
        _ => return None,
    };
    Some(OrderDirective::Column(Ordering {
        expression: String::from(expression),
        direction,
    }))
}

#[cfg(test)]
mod tests {
    use super::{TagSearch, compile};
    use crate::{
        config::Config,
        query::{Pagination, compiler::predicate::SqlValue},
    };

    fn pagination() -> Pagination {
        Pagination {
            limit: 75,
            offset: 0,
        }
    }

    #[test]
    fn test_name_and_category() {
        let search = TagSearch {
            name: Some(String::from("Red_*")),
            category: Some(String::from("artist")),
            post_count: Some(String::from(">10")),
            order: Some(String::from("count")),
            ..TagSearch::default()
        };
        let statement = compile(&search, pagination(), &Config::default()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT t.* FROM tags t WHERE t.name LIKE $1 AND t.category = $2 AND t.post_count > $3 ORDER BY post_count DESC, id DESC LIMIT 75 OFFSET 0"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::from("red_%"),
                SqlValue::Int(1),
                SqlValue::Int(10)
            ]
        );
    }

    #[test]
    fn test_exact_name_and_numeric_category() {
        let search: TagSearch = serde_json::from_value(serde_json::json!({
            "name": "fox",
            "category": 5,
            "locked": true,
        }))
        .unwrap();
        let statement = compile(&search, pagination(), &Config::default()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT t.* FROM tags t WHERE t.name = $1 AND t.category = $2 AND t.locked = $3 ORDER BY id DESC LIMIT 75 OFFSET 0"
        );
        assert_eq!(
            statement.values,
            vec![SqlValue::from("fox"), SqlValue::Int(5), SqlValue::Bool(true)]
        );
    }
}
