use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::{model::TagCategory, query::compiler::meta};

lazy_static! {
    static ref NON_VISIBLE_ASCII_REGEX: Regex =
        Regex::new(r"[^\x21-\x7E]").expect("Failed to compile regex");
    static ref ONLY_UNDERSCORES_REGEX: Regex = Regex::new(r"^_+$").expect("Failed to compile regex");
    static ref FORBIDDEN_CHARACTER_REGEX: Regex =
        Regex::new(r"([*,#$%\\{}|@`\[\]=])").expect("Failed to compile regex");
    static ref FORBIDDEN_START_REGEX: Regex =
        Regex::new(r"^([_~\-:+()])").expect("Failed to compile regex");
    static ref FORBIDDEN_END_REGEX: Regex = Regex::new(r"([_\-:])$").expect("Failed to compile regex");
    static ref CONSECUTIVE_REGEX: Regex =
        Regex::new(r"[_\-~]{2,}").expect("Failed to compile regex");
    static ref META_PREFIX_REGEX: Regex = Regex::new(&format!(
        r"^({}):(.+)$",
        meta::FUNCTIONAL_META_TAGS
            .iter()
            .chain(meta::SEARCH_META_TAGS.iter())
            .unique()
            .join("|")
    ))
    .expect("Failed to compile regex");
    static ref CATEGORY_PREFIX_REGEX: Regex = Regex::new(&format!(
        r"^({}):(.+)$",
        TagCategory::ALL.iter().map(|c| c.as_str()).join("|")
    ))
    .expect("Failed to compile regex");
}

fn character_name(c: &str) -> Option<&'static str> {
    let name = match c {
        "!" => "exclamation marks",
        "\"" => "quotation marks",
        "#" => "pound signs",
        "$" => "dollar signs",
        "%" => "percent signs",
        "&" => "ampersands",
        "'" => "apostrophes",
        "(" => "left parentheses",
        ")" => "right parentheses",
        "*" => "asterisks",
        "+" => "plus signs",
        "," => "commas",
        "-" => "hyphens",
        "." => "periods",
        "/" => "forward slashes",
        ":" => "colons",
        ";" => "semicolons",
        "<" => "less than symbols",
        "=" => "equals symbols",
        ">" => "greater than symbols",
        "?" => "question marks",
        "@" => "at symbols",
        "[" => "left square brackets",
        "\\" => "backslashes",
        "]" => "right square brackets",
        "^" => "carets",
        "_" => "underscores",
        "`" => "grave accents",
        "{" => "left curly braces",
        "|" => "vertical bars",
        "}" => "right curly braces",
        "~" => "tildes",
        _ => return None,
    };
    Some(name)
}

fn describe(matched: &str) -> String {
    match matched.chars().next().and_then(|c| character_name(&c.to_string())) {
        Some(name) => format!("{name} ({matched})"),
        None => matched.to_string(),
    }
}

/// Check a tag name, collecting every rule it breaks. An empty result means the name is valid.
pub fn validate_tag_name(name: &str) -> Vec<String> {
    let tag = name.to_lowercase();
    let mut errors = Vec::new();

    if NON_VISIBLE_ASCII_REGEX.is_match(&tag) {
        errors.push(String::from(
            "Tag names must be comprised of visible ascii characters.",
        ));
    }
    if tag.is_empty() || ONLY_UNDERSCORES_REGEX.is_match(&tag) {
        errors.push(String::from("Tag name cannot be empty."));
    }
    if let Some(m) = FORBIDDEN_CHARACTER_REGEX.find(&tag) {
        errors.push(format!("Tag names cannot contain {}", describe(m.as_str())));
    }
    if let Some(m) = FORBIDDEN_START_REGEX.find(&tag) {
        errors.push(format!("Tag names cannot start with {}", describe(m.as_str())));
    }
    if let Some(m) = FORBIDDEN_END_REGEX.find(&tag) {
        errors.push(format!("Tag names cannot end with {}", describe(m.as_str())));
    }
    if let Some(m) = CONSECUTIVE_REGEX.find(&tag) {
        errors.push(format!("Tag cannot have consecutive {}", describe(m.as_str())));
    }
    if let Some(captures) = META_PREFIX_REGEX.captures(&tag) {
        errors.push(format!("Tag name cannot start with {}:", &captures[1]));
    }
    if let Some(captures) = CATEGORY_PREFIX_REGEX.captures(&tag) {
        errors.push(format!("Tag name cannot start with {}:", &captures[1]));
    }

    errors
}

pub fn is_valid_tag_name(name: &str) -> bool {
    validate_tag_name(name).is_empty()
}

#[cfg(test)]
mod tests {
    use super::{is_valid_tag_name, validate_tag_name};

    #[test]
    fn test_valid_names() {
        assert!(is_valid_tag_name("fox"));
        assert!(is_valid_tag_name("red_fox"));
        assert!(is_valid_tag_name("Fox_(character)"));
        assert!(is_valid_tag_name("unknown:namespace"));
        assert!(is_valid_tag_name("5:4_aspect_ratio"));
    }

    #[test]
    fn test_single_violations() {
        assert_eq!(validate_tag_name(""), vec!["Tag name cannot be empty."]);
        assert!(validate_tag_name("___").contains(&String::from("Tag name cannot be empty.")));
        assert_eq!(
            validate_tag_name("f*x"),
            vec!["Tag names cannot contain asterisks (*)"]
        );
        assert_eq!(
            validate_tag_name("fox,wolf"),
            vec!["Tag names cannot contain commas (,)"]
        );
        assert_eq!(
            validate_tag_name("~fox"),
            vec!["Tag names cannot start with tildes (~)"]
        );
        assert_eq!(
            validate_tag_name("fox:"),
            vec!["Tag names cannot end with colons (:)"]
        );
        assert_eq!(
            validate_tag_name("red--fox"),
            vec!["Tag cannot have consecutive hyphens (--)"]
        );
        assert_eq!(
            validate_tag_name("rating:safe"),
            vec!["Tag name cannot start with rating:"]
        );
        assert_eq!(
            validate_tag_name("artist:someone"),
            vec!["Tag name cannot start with artist:"]
        );
        assert_eq!(
            validate_tag_name("füchse"),
            vec!["Tag names must be comprised of visible ascii characters."]
        );
    }

    #[test]
    fn test_violations_accumulate() {
        let errors = validate_tag_name("_fox__=_");
        assert_eq!(
            errors,
            vec![
                "Tag names cannot contain equals symbols (=)",
                "Tag names cannot start with underscores (_)",
                "Tag names cannot end with underscores (_)",
                "Tag cannot have consecutive underscores (__)",
            ]
        );
    }
}
