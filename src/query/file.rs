use serde::Deserialize;
use validator::Validate;

use crate::{
    error::Error,
    model::FileFlags,
    util::{self, deserialize_string_from_number},
};

use super::{
    Pagination, Statement,
    compiler::{
        Filters, assemble_statement,
        predicate::{NumberKind, Predicate, equals, is_null, with_operator},
    },
    present,
};

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct FileSearch {
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub post_id: Option<String>,
    /// Hash of the file itself, case-insensitive.
    #[validate(length(min = 32, max = 32))]
    pub md5: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub is_primary: Option<String>,
    #[validate(length(max = 32))]
    pub file_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub width: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub height: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub size: Option<String>,
    /// A file id, or `none` for original uploads.
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_from_number")]
    pub deleted: Option<String>,
}

pub fn compile(search: &FileSearch, pagination: Pagination) -> Result<Statement, Error> {
    let mut filters = Filters::default();

    if let Some(id) = present(&search.post_id).and_then(util::parse_id) {
        filters.push(Some(equals("f.post_id", id)));
    }
    if let Some(md5) = present(&search.md5) {
        filters.push(Some(equals("f.md5", md5.to_lowercase())));
    }
    if let Some(is_primary) = present(&search.is_primary).and_then(util::parse_boolean) {
        filters.push(Some(equals("f.is_primary", is_primary)));
    }
    if let Some(file_type) = present(&search.file_type) {
        filters.push(Some(equals("f.file_type", file_type.to_lowercase())));
    }
    if let Some(width) = present(&search.width) {
        filters.push(with_operator("f.width", width, NumberKind::Int));
    }
    if let Some(height) = present(&search.height) {
        filters.push(with_operator("f.height", height, NumberKind::Int));
    }
    if let Some(size) = present(&search.size) {
        filters.push(with_operator("f.size", size, NumberKind::Int));
    }
    if let Some(parent_id) = present(&search.parent_id) {
        if parent_id.eq_ignore_ascii_case("none") {
            filters.push(Some(is_null("f.parent_id", true)));
        } else if let Some(id) = util::parse_id(parent_id) {
            filters.push(Some(equals("f.parent_id", id)));
        }
    }
    if let Some(deleted) = present(&search.deleted).and_then(util::parse_boolean) {
        let bits = FileFlags::DELETED.bits();
        filters.push(Some(Predicate::raw(format!(
            "(f.flags & {bits}) {} {bits}",
            if deleted { "=" } else { "!=" }
        ))));
    }

    assemble_statement("files", "f", filters, None, pagination)
}

#[cfg(test)]
mod tests {
    use super::{FileSearch, compile};
    use crate::query::{Pagination, compiler::predicate::SqlValue};

    fn pagination() -> Pagination {
        Pagination {
            limit: 20,
            offset: 0,
        }
    }

    #[test]
    fn test_file_filters() {
        let search: FileSearch = serde_json::from_value(serde_json::json!({
            "is_primary": true,
            "width": ">=1920",
            "size": "100..2000",
            "parent_id": "none",
            "deleted": "false",
        }))
        .unwrap();

        let statement = compile(&search, pagination()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT f.* FROM files f WHERE f.is_primary = $1 AND f.width >= $2 AND f.size BETWEEN $3 AND $4 AND f.parent_id IS NULL AND (f.flags & 4) != 4 ORDER BY id DESC LIMIT 20 OFFSET 0"
        );
        assert_eq!(
            statement.values,
            vec![
                SqlValue::Bool(true),
                SqlValue::Int(1920),
                SqlValue::Int(100),
                SqlValue::Int(2000),
            ]
        );
    }

    #[test]
    fn test_md5_matches_the_file_itself() {
        let md5 = "FEDCBA9876543210FEDCBA9876543210";
        let search = FileSearch {
            md5: Some(String::from(md5)),
            ..FileSearch::default()
        };
        let statement = compile(&search, pagination()).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT f.* FROM files f WHERE f.md5 = $1 ORDER BY id DESC LIMIT 20 OFFSET 0"
        );
        assert_eq!(
            statement.values,
            vec![SqlValue::from("fedcba9876543210fedcba9876543210")]
        );
    }
}
