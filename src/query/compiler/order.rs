use crate::{
    model::TagCategory,
    query::{Direction, Ordering},
};

/// Result ordering requested by an `order:` meta-tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderDirective {
    Column(Ordering),
    Random,
    /// Recognized but not implemented, leaves the ordering untouched.
    Popular,
}

/// Parse an order key such as `score`, `favcount_asc` or `tagcount_artist`, `None` for unknown keys.
pub fn parse_order(key: &str) -> Option<OrderDirective> {
    let key = key.to_lowercase();
    match key.as_str() {
        "random" => return Some(OrderDirective::Random),
        "popular" => return Some(OrderDirective::Popular),
        _ => {}
    }

    let (base, direction) = if let Some(base) = key.strip_suffix("_asc") {
        (base, Some(Direction::Ascending))
    } else if let Some(base) = key.strip_suffix("_desc") {
        (base, Some(Direction::Descending))
    } else {
        (key.as_str(), None)
    };

    let (expression, default_direction) = match base {
        "id" => (String::from("id"), Direction::Ascending),
        "score" => (String::from("score"), Direction::Descending),
        "favcount" => (String::from("favorite_count"), Direction::Descending),
        "creation" => (String::from("created_at"), Direction::Descending),
        "update" => (String::from("updated_at"), Direction::Descending),
        "comment_count" => (String::from("comment_count"), Direction::Descending),
        "mpixels" => (String::from("(width * height)"), Direction::Descending),
        "width" => (String::from("width"), Direction::Descending),
        "height" => (String::from("height"), Direction::Descending),
        "filesize" => (String::from("filesize"), Direction::Descending),
        "tagcount" => (String::from("tag_count"), Direction::Descending),
        "duration" => (String::from("duration"), Direction::Descending),
        _ => {
            let category = base.strip_prefix("tagcount_")?.parse::<TagCategory>().ok()?;
            (
                format!("tag_count_{}", category.as_str()),
                Direction::Descending,
            )
        }
    };

    Some(OrderDirective::Column(Ordering {
        expression,
        direction: direction.unwrap_or(default_direction),
    }))
}

#[cfg(test)]
mod tests {
    use super::{OrderDirective, parse_order};
    use crate::query::{Direction, Ordering};

    fn column(expression: &str, direction: Direction) -> Option<OrderDirective> {
        Some(OrderDirective::Column(Ordering {
            expression: String::from(expression),
            direction,
        }))
    }

    #[test]
    fn test_default_directions() {
        assert_eq!(parse_order("id"), column("id", Direction::Ascending));
        assert_eq!(parse_order("score"), column("score", Direction::Descending));
        assert_eq!(
            parse_order("favcount"),
            column("favorite_count", Direction::Descending)
        );
    }

    #[test]
    fn test_explicit_directions() {
        assert_eq!(parse_order("id_desc"), column("id", Direction::Descending));
        assert_eq!(
            parse_order("creation_asc"),
            column("created_at", Direction::Ascending)
        );
        assert_eq!(
            parse_order("tagcount_artist_asc"),
            column("tag_count_artist", Direction::Ascending)
        );
        assert_eq!(
            parse_order("mpixels"),
            column("(width * height)", Direction::Descending)
        );
    }

    #[test]
    fn test_special_and_unknown_keys() {
        assert_eq!(parse_order("random"), Some(OrderDirective::Random));
        assert_eq!(parse_order("popular"), Some(OrderDirective::Popular));
        assert_eq!(parse_order("nonsense"), None);
        assert_eq!(parse_order("tagcount_nonsense"), None);
        assert_eq!(parse_order("score_sideways"), None);
    }
}
