use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RANGE_REGEX: Regex = Regex::new(r"^(\d+)\.\.(\d+)$").expect("Failed to compile regex");
}

/// A comparison parsed from a search token such as `>=5`, `10..20` or `foo`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operator<'a> {
    Eq(&'a str),
    Gt(&'a str),
    Gte(&'a str),
    Lt(&'a str),
    Lte(&'a str),
    Range(&'a str, &'a str),
}

impl Operator<'_> {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "=",
            Operator::Gt(_) => ">",
            Operator::Gte(_) => ">=",
            Operator::Lt(_) => "<",
            Operator::Lte(_) => "<=",
            Operator::Range(_, _) => "BETWEEN",
        }
    }
}

/// Parse a comparison token, anything that is neither prefixed nor a range is an equality match on the raw token.
pub fn parse_operator(token: &str) -> Operator<'_> {
    if let Some(value) = token.strip_prefix(">=") {
        Operator::Gte(value)
    } else if let Some(value) = token.strip_prefix("<=") {
        Operator::Lte(value)
    } else if let Some(value) = token.strip_prefix('>') {
        Operator::Gt(value)
    } else if let Some(value) = token.strip_prefix('<') {
        Operator::Lt(value)
    } else if let Some(value) = token.strip_prefix('=') {
        Operator::Eq(value)
    } else if let Some(captures) = RANGE_REGEX.captures(token) {
        match (captures.get(1), captures.get(2)) {
            (Some(low), Some(high)) => Operator::Range(low.as_str(), high.as_str()),
            _ => Operator::Eq(token),
        }
    } else {
        Operator::Eq(token)
    }
}

#[cfg(test)]
mod tests {
    use super::{Operator, parse_operator};

    #[test]
    fn test_prefixes() {
        assert_eq!(parse_operator(">=5"), Operator::Gte("5"));
        assert_eq!(parse_operator("<=5"), Operator::Lte("5"));
        assert_eq!(parse_operator(">5"), Operator::Gt("5"));
        assert_eq!(parse_operator("<5"), Operator::Lt("5"));
        assert_eq!(parse_operator("=5"), Operator::Eq("5"));
    }

    #[test]
    fn test_range() {
        assert_eq!(parse_operator("10..20"), Operator::Range("10", "20"));
        assert_eq!(parse_operator("10..20x"), Operator::Eq("10..20x"));
        assert_eq!(parse_operator("a10..20"), Operator::Eq("a10..20"));
        // open ranges are not ranges
        assert_eq!(parse_operator("..5"), Operator::Eq("..5"));
        assert_eq!(parse_operator("5.."), Operator::Eq("5.."));
    }

    #[test]
    fn test_fallback_to_equality() {
        assert_eq!(parse_operator("foo"), Operator::Eq("foo"));
        assert_eq!(parse_operator(""), Operator::Eq(""));
        assert_eq!(parse_operator("1..x"), Operator::Eq("1..x"));
    }
}
