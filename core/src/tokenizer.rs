use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s]+").expect("valid regex");
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","also","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","even","ever","every",
            "few","for","from","further",
            "get","got",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "just","let","like","made","make","many","may","me","might","more","most","much","must","my","myself",
            "no","nor","not","now",
            "of","off","on","once","one","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","since","so","some","still","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","upon","us","use","used","using",
            "very",
            "was","way","we","well","were","what","when","where","whether","which","while","who","whom","why","will","with","within","without","would",
            "yet","you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Suffixes tried in order; the first match wins.
const SUFFIXES: &[&str] = &[
    "ational", "tional", "ation", "tion", "sion", "ment", "ness", "able", "ible", "ance", "ence",
    "ing", "ful", "ous", "ive", "ize", "ise", "ity", "ly", "ed", "er", "al", "en",
];

/// Tokens at or below this many characters are discarded.
const MIN_TOKEN_CHARS: usize = 2;
/// Only tokens longer than this are stemmed.
const STEM_MIN_CHARS: usize = 4;
/// A stripped suffix must leave at least this many characters behind.
const MIN_STEM_CHARS: usize = 3;

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Light suffix stripping. Over-stems occasionally; it only has to map
/// inflected forms of the same word onto one term most of the time.
pub fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len > STEM_MIN_CHARS {
        for suffix in SUFFIXES {
            if let Some(stem) = token.strip_suffix(suffix) {
                if stem.chars().count() >= MIN_STEM_CHARS {
                    return stem.to_string();
                }
            }
        }
    }
    if len > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Tokenize text into index terms: NFKC normalization, lowercase, punctuation
/// and digit stripping, stopword removal and suffix stemming. Terms keep the
/// order they appear in.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    let words = NON_WORD.replace_all(&normalized, " ");
    let words = DIGITS.replace_all(&words, " ");
    words
        .split_whitespace()
        .filter(|token| token.chars().count() > MIN_TOKEN_CHARS)
        .filter(|token| !is_stopword(token))
        .map(stem)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert_eq!(t, vec!["runn", "runn", "run"]);
    }

    #[test]
    fn strips_digits_and_short_tokens() {
        assert_eq!(tokenize("v2 of 2024 ok go"), Vec::<String>::new());
        assert_eq!(tokenize("area51 rocket"), vec!["area", "rocket"]);
    }

    #[test]
    fn stems_first_matching_suffix() {
        assert_eq!(stem("information"), "inform");
        assert_eq!(stem("statement"), "state");
        assert_eq!(stem("painted"), "paint");
        // stem would be too short
        assert_eq!(stem("thing"), "thing");
        assert_eq!(stem("apples"), "apple");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("bus"), "bus");
    }

    #[test]
    fn unstemmable_terms_are_a_fixed_point() {
        let first = tokenize("apple banana cherry orchard garden");
        let again = tokenize(&first.join(" "));
        assert_eq!(first, again);
    }

    #[test]
    fn stemmed_terms_can_stem_again() {
        // one suffix is stripped per pass, so a stem can expose another suffix
        assert_eq!(tokenize("hopefully runners nationally"), vec!["hopeful", "runner", "national"]);
        assert_eq!(tokenize("hopeful runner national"), vec!["hope", "runn", "nation"]);
        assert_eq!(tokenize("hope runn nation"), vec!["hope", "runn", "nation"]);
    }
}
