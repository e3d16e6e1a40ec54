use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // ASCII punctuation plus the curly double quotes scraped pages tend to carry.
    static ref PUNCT: Regex = Regex::new(r"[[:punct:]\u{201C}\u{201D}]").expect("valid regex");
}

/// Normalize a raw token into an index key: strip punctuation, lowercase.
///
/// This is applied identically to page text at build time and to query terms
/// at search time, so every key written into the index is reachable from a
/// query. No stemming, no stopword removal.
pub fn normalize(raw: &str) -> String {
    PUNCT.replace_all(raw, "").to_lowercase()
}

/// Whitespace-split `text` into normalized words paired with their token
/// positions. Tokens that normalize to the empty string are dropped and do
/// not occupy a position.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let mut tokens = Vec::new();
    for raw in text.split_whitespace() {
        let word = normalize(raw);
        if word.is_empty() {
            continue;
        }
        let pos = tokens.len();
        tokens.push((word, pos));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_case_folds() {
        assert_eq!(normalize("Cat!"), "cat");
        assert_eq!(normalize("don't"), "dont");
        assert_eq!(normalize("“Quoted”"), "quoted");
        assert_eq!(normalize("--"), "");
    }

    #[test]
    fn empty_tokens_occupy_no_position() {
        let tokens = tokenize("quick -- brown");
        assert_eq!(
            tokens,
            vec![("quick".to_string(), 0), ("brown".to_string(), 1)]
        );
    }

    #[test]
    fn build_and_query_sides_agree() {
        let indexed = tokenize("The CAT sat.");
        let queried: Vec<String> = "the cat SAT!"
            .split_whitespace()
            .map(normalize)
            .collect();
        let words: Vec<&str> = indexed.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, queried.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
