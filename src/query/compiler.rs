use std::fmt::Write;

use crate::{
    config::Config,
    error::Error,
    query::{Direction, Ordering, Pagination, Statement},
    store::{FileLookup, UserDirectory},
};

use self::{
    order::OrderDirective,
    predicate::{PLACEHOLDER, Predicate, SqlValue, equals},
};

pub mod meta;
pub mod operator;
pub mod order;
pub mod predicate;
pub mod tags;

/// Where conditions and the unnest joins they depend on.
#[derive(Clone, Debug, Default)]
pub struct Filters {
    pub predicates: Vec<Predicate>,
    pub joins: Vec<String>,
}

impl Filters {
    /// Add a predicate, `None` means the filter could not be resolved and is omitted.
    pub fn push(&mut self, predicate: Option<Predicate>) {
        if let Some(predicate) = predicate {
            self.predicates.push(predicate);
        }
    }

    pub fn add_join(&mut self, join: String) {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
    }

    pub fn extend(&mut self, other: Filters) {
        self.predicates.extend(other.predicates);
        for join in other.joins {
            self.add_join(join);
        }
    }
}

/// The join expanding an array column into one row per element and the alias of the element.
pub fn unnest_join(table_alias: &str, column: &str) -> (String, String) {
    let element = format!("{column}_elem");
    (
        format!("unnest({table_alias}.{column}) AS {element}"),
        element,
    )
}

/// Resolve a user name to an equality predicate on `column`.
///
/// Unknown names drop the filter unless `strict_lookup_filters` is set, in which case nothing matches.
pub async fn user_name_filter<L: UserDirectory + ?Sized>(
    column: &str,
    name: &str,
    lookup: &L,
    config: &Config,
) -> Result<Option<Predicate>, Error> {
    match lookup.name_to_id(name).await? {
        Some(id) => Ok(Some(equals(column, id))),
        None => Ok(unresolved_filter(column, name, config)),
    }
}

/// Resolve an md5 hash to an equality predicate on the id of the owning post.
pub async fn md5_filter<L: FileLookup + ?Sized>(
    column: &str,
    md5: &str,
    lookup: &L,
    config: &Config,
) -> Result<Option<Predicate>, Error> {
    match lookup.post_id_for_md5(md5).await? {
        Some(post_id) => Ok(Some(equals(column, post_id))),
        None => Ok(unresolved_filter(column, md5, config)),
    }
}

fn unresolved_filter(column: &str, value: &str, config: &Config) -> Option<Predicate> {
    if config.strict_lookup_filters {
        Some(Predicate::raw("FALSE"))
    } else {
        log::debug!("Dropping filter on {column}, could not resolve '{value}'");
        None
    }
}

/// Assemble a select statement for `table`, numbering the placeholders of all predicates in order.
pub fn assemble_statement(
    table: &str,
    alias: &str,
    filters: Filters,
    order: Option<&OrderDirective>,
    pagination: Pagination,
) -> Result<Statement, Error> {
    let mut sql = format!("SELECT {alias}.* FROM {table} {alias}");
    for join in filters.joins.iter() {
        sql.push_str(", ");
        sql.push_str(join);
    }

    let mut values = Vec::new();
    apply_where_conditions(&mut sql, &mut values, filters.predicates)?;
    apply_ordering(&mut sql, order);

    // writing to a String cannot fail
    let _ = write!(
        sql,
        " LIMIT {} OFFSET {}",
        pagination.limit, pagination.offset
    );

    Ok(Statement { sql, values })
}

fn apply_where_conditions(
    sql: &mut String,
    values: &mut Vec<SqlValue>,
    predicates: Vec<Predicate>,
) -> Result<(), Error> {
    let predicates_len = predicates.len();
    if predicates_len > 0 {
        sql.push_str(" WHERE ");

        for (i, predicate) in predicates.into_iter().enumerate() {
            if predicate.placeholder_count() != predicate.values.len() {
                return Err(Error::InvariantViolation(format!(
                    "predicate '{}' has {} placeholders but {} values",
                    predicate.sql,
                    predicate.placeholder_count(),
                    predicate.values.len()
                )));
            }

            let mut index = values.len();
            for c in predicate.sql.chars() {
                if c == PLACEHOLDER {
                    index += 1;
                    let _ = write!(sql, "${index}");
                } else {
                    sql.push(c);
                }
            }
            values.extend(predicate.values);

            if i < predicates_len - 1 {
                sql.push_str(" AND ");
            }
        }
    }

    Ok(())
}

pub fn apply_ordering(sql: &mut String, order: Option<&OrderDirective>) {
    let ordering = match order {
        Some(OrderDirective::Random) => {
            sql.push_str(" ORDER BY RANDOM()");
            return;
        }
        Some(OrderDirective::Column(ordering)) => ordering.clone(),
        Some(OrderDirective::Popular) | None => Ordering {
            expression: String::from("id"),
            direction: Direction::Descending,
        },
    };

    sql.push_str(" ORDER BY ");
    sql.push_str(&ordering.expression);
    match ordering.direction {
        Direction::Ascending => sql.push_str(" ASC"),
        Direction::Descending => sql.push_str(" DESC"),
    }

    // tie-breaker keeps pages stable
    if ordering.expression != "id" {
        sql.push_str(", id DESC");
    }
}

#[cfg(test)]
mod tests {
    use super::{Filters, assemble_statement, unnest_join};
    use crate::query::{
        Pagination,
        compiler::{
            order::parse_order,
            predicate::{Predicate, SqlValue, array_contains, equals},
        },
    };

    #[test]
    fn test_assemble_numbers_placeholders() {
        let mut filters = Filters::default();
        filters.push(Some(equals("uploader_id", 3i64)));
        filters.push(None);
        filters.push(Some(Predicate::new(
            "score BETWEEN ? AND ?",
            vec![SqlValue::Int(1), SqlValue::Int(9)],
        )));
        filters.push(Some(array_contains("p.tags", "fox").negate()));

        let statement = assemble_statement(
            "posts",
            "p",
            filters,
            None,
            Pagination {
                limit: 10,
                offset: 20,
            },
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT p.* FROM posts p WHERE uploader_id = $1 AND score BETWEEN $2 AND $3 AND NOT (p.tags @> ARRAY[$4]) ORDER BY id DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Int(3),
                SqlValue::Int(1),
                SqlValue::Int(9),
                SqlValue::Text(String::from("fox"))
            ]
        );
    }

    #[test]
    fn test_assemble_joins_and_order() {
        let mut filters = Filters::default();
        let (join, element) = unnest_join("p", "tags");
        filters.add_join(join.clone());
        filters.add_join(join);
        filters.push(Some(Predicate::new(
            format!("{element} LIKE ?"),
            vec![SqlValue::Text(String::from("fox%"))],
        )));

        let order = parse_order("score").unwrap();
        let statement = assemble_statement(
            "posts",
            "p",
            filters,
            Some(&order),
            Pagination {
                limit: 5,
                offset: 0,
            },
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT p.* FROM posts p, unnest(p.tags) AS tags_elem WHERE tags_elem LIKE $1 ORDER BY score DESC, id DESC LIMIT 5 OFFSET 0"
        );
    }

    #[test]
    fn test_mismatched_placeholders_fail() {
        let mut filters = Filters::default();
        filters.push(Some(Predicate::new("id = ? OR id = ?", vec![SqlValue::Int(1)])));
        assert!(
            assemble_statement(
                "posts",
                "p",
                filters,
                None,
                Pagination {
                    limit: 1,
                    offset: 0
                }
            )
            .is_err()
        );
    }
}
