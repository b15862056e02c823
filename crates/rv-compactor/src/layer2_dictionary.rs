//! Layer 2: Dictionary substitution. Frequent tokens and repeated substrings
//! are replaced by short delimiter-wrapped codes.
//!
//! Tokens look like `DELIM id DELIM` with a base-36 `id`. A literal
//! [`DELIMITER`] in the input is written as `DELIM DELIM` before substitution,
//! so any input, including one made of delimiters, decodes unambiguously.
//!
//! The repeated-substring scan is O(n·L) in the scanned window (L = max
//! substring length). It is bounded by `scan_window_bytes`; a suffix-array or
//! rolling-hash scan is the replacement if that window has to grow.

use regex::{Captures, RegexBuilder};
use rv_core::config::DictionaryConfig;
use rv_core::error::{Result, RvError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Reserved token delimiter (SUB control character).
pub const DELIMITER: char = '\u{1A}';

const ESCAPED_DELIMITER: &str = "\u{1A}\u{1A}";
const REGEX_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Fixed candidates: keywords, punctuation clusters, call fragments.
const KEYWORDS: &[&str] = &[
    "function", "return", "const ", "let ", "var ", "import ", "export ", "default",
    "from ", "class ", "interface ", "extends ", "implements ", "async ", "await ",
    "public ", "private ", "protected ", "static ", "readonly ", "undefined", "null",
    "true", "false", "string", "number", "boolean", "this.", "self.", "new ",
    "typeof ", "instanceof ", "else ", "while ", "for (", "if (", "switch (",
    "case ", "break;", "continue;", "throw new Error(", "try {", "catch (",
    "console.log(", "console.error(", "require(", "module.exports", ".then(",
    ".catch(", ".map(", ".filter(", ".forEach(", ".length", ".push(", "JSON.stringify(",
    "JSON.parse(", "Promise", "=> {", " => ", " === ", " !== ", " && ", " || ",
    "() {", "});", "};", "})", "\\n", "\\\"", "def ", "pub fn ", "fn ", "impl ",
    "struct ", "enum ", "use ", "mut ", "#include", "package ", "println!(",
    "<div", "</div>", "className=", "props.", "React.", "useState(", "useEffect(",
];

/// Token → original substring. Built fresh per payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: BTreeMap<String, String>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert a phrase under `token`. Tokens must come from [`token_for`].
    pub fn insert(&mut self, token: String, phrase: String) {
        self.entries.insert(token, phrase);
    }
}

/// Base-36 rendering of a token id.
pub fn to_base36(mut n: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[n % 36]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Token string for the `id`-th dictionary entry.
pub fn token_for(id: usize) -> String {
    format!("{DELIMITER}{}{DELIMITER}", to_base36(id))
}

/// Bytes `text` takes as a JSON string body, matching serde_json's escaping.
/// The delimiter is a control character, so each one costs six bytes.
pub fn json_escaped_len(text: &str) -> usize {
    text.chars()
        .map(|c| match c {
            '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0C}' => 2,
            c if (c as u32) < 0x20 => 6,
            c => c.len_utf8(),
        })
        .sum()
}

/// Double every literal delimiter.
pub fn escape(text: &str) -> String {
    text.replace(DELIMITER, ESCAPED_DELIMITER)
}

/// Count fixed-list candidates, non-overlapping.
pub fn keyword_candidates(text: &str, min_occurrences: usize) -> Vec<String> {
    KEYWORDS
        .iter()
        .filter(|kw| text.matches(**kw).count() > min_occurrences)
        .map(|kw| kw.to_string())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Frequent substrings of the scan window, most frequent first.
///
/// Substrings start at word boundaries and span `min..=max` characters.
/// Only the top `max_substring_candidates` by count are kept, then those with
/// more than `substring_min_occurrences` occurrences are returned.
pub fn repeated_substrings(text: &str, cfg: &DictionaryConfig) -> Vec<(String, usize)> {
    let mut window = text.len().min(cfg.scan_window_bytes);
    while !text.is_char_boundary(window) {
        window -= 1;
    }
    let sample = &text[..window];
    let min_len = cfg.min_substring_len.max(1);
    let max_len = cfg.max_substring_len.max(min_len);

    let bounds: Vec<(usize, char)> = sample.char_indices().collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut prev: Option<char> = None;

    for (ci, &(start, c)) in bounds.iter().enumerate() {
        let at_boundary = match prev {
            None => true,
            Some(p) => !is_word_char(p) || !is_word_char(c),
        };
        prev = Some(c);
        if !at_boundary {
            continue;
        }
        for len in 1..=max_len {
            let last_ci = ci + len - 1;
            if last_ci >= bounds.len() || bounds[last_ci].1 == DELIMITER {
                break;
            }
            if len < min_len {
                continue;
            }
            let end = bounds.get(last_ci + 1).map_or(sample.len(), |&(i, _)| i);
            *counts.entry(&sample[start..end]).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.len().cmp(&a.0.len()))
            .then_with(|| a.0.cmp(b.0))
    });

    // A prefix with the same count as an already chosen phrase never matches
    // first, so it would only waste a slot.
    let mut chosen: Vec<(&str, usize)> = Vec::new();
    for (sub, count) in ranked {
        if chosen.len() >= cfg.max_substring_candidates {
            break;
        }
        let shadowed = chosen.iter().any(|(s, c)| *c == count && s.starts_with(sub));
        if !shadowed {
            chosen.push((sub, count));
        }
    }

    chosen
        .into_iter()
        .filter(|(_, count)| *count > cfg.substring_min_occurrences)
        .map(|(s, c)| (s.to_string(), c))
        .collect()
}

/// Assign tokens to candidates, keywords first. Phrases no longer than
/// their token, both measured as escaped JSON, are skipped without
/// consuming an id.
pub fn build_dictionary(text: &str, cfg: &DictionaryConfig) -> Dictionary {
    let mut dict = Dictionary::new();
    if text.is_empty() {
        return dict;
    }
    let mut seen: HashSet<String> = HashSet::new();
    let mut next_id = 0usize;

    let keywords = keyword_candidates(text, cfg.keyword_min_occurrences);
    let substrings = repeated_substrings(text, cfg).into_iter().map(|(s, _)| s);

    for phrase in keywords.into_iter().chain(substrings) {
        if phrase.contains(DELIMITER) || seen.contains(&phrase) {
            continue;
        }
        let token = token_for(next_id);
        if json_escaped_len(&phrase) <= json_escaped_len(&token) {
            continue;
        }
        seen.insert(phrase.clone());
        dict.insert(token, phrase);
        next_id += 1;
    }
    dict
}

/// Substitute dictionary phrases in one left-to-right pass over the escaped
/// text. Longer phrases win at the same position. Entries that never
/// matched are dropped from the returned dictionary.
pub fn substitute(text: &str, dict: Dictionary) -> (String, Dictionary) {
    let escaped = escape(text);
    if dict.is_empty() || escaped.is_empty() {
        return (escaped, Dictionary::new());
    }

    let mut phrases: Vec<(&str, &str)> = dict.iter().map(|(t, p)| (p, t)).collect();
    phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    let pattern = phrases
        .iter()
        .map(|(p, _)| regex::escape(p))
        .collect::<Vec<_>>()
        .join("|");

    let re = match RegexBuilder::new(&pattern).size_limit(REGEX_SIZE_LIMIT).build() {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(error = %e, entries = dict.len(), "dictionary regex rejected, skipping substitution");
            return (escaped, Dictionary::new());
        }
    };

    let lookup: HashMap<&str, &str> = phrases.iter().copied().collect();
    let mut used: HashSet<&str> = HashSet::new();
    let output = re
        .replace_all(&escaped, |caps: &Captures| {
            let phrase = caps.get(0).map_or("", |m| m.as_str());
            match lookup.get(phrase) {
                Some(token) => {
                    used.insert(*token);
                    token.to_string()
                }
                None => phrase.to_string(),
            }
        })
        .into_owned();

    let mut pruned = Dictionary::new();
    for (token, phrase) in dict.iter() {
        if used.contains(token) {
            pruned.insert(token.to_string(), phrase.to_string());
        }
    }
    (output, pruned)
}

/// Build a dictionary for `text` and substitute it, default parameters.
pub fn compress(text: &str) -> (String, Dictionary) {
    compress_with_config(text, &DictionaryConfig::default())
}

pub fn compress_with_config(text: &str, cfg: &DictionaryConfig) -> (String, Dictionary) {
    let dict = build_dictionary(text, cfg);
    let (output, dict) = substitute(text, dict);
    tracing::debug!(
        input_len = text.len(),
        output_len = output.len(),
        entries = dict.len(),
        "dictionary substitution"
    );
    (output, dict)
}

/// Resolve every token and unescape literal delimiters.
pub fn decompress(text: &str, dict: &Dictionary) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(DELIMITER) {
        out.push_str(&rest[..open]);
        let after = &rest[open + DELIMITER.len_utf8()..];
        let close = after
            .find(DELIMITER)
            .ok_or_else(|| RvError::corrupt("unterminated dictionary token"))?;
        if close == 0 {
            out.push(DELIMITER);
        } else {
            let token = &rest[open..open + DELIMITER.len_utf8() * 2 + close];
            let phrase = dict
                .get(token)
                .ok_or_else(|| RvError::corrupt(format!("unknown dictionary token {:?}", &after[..close])))?;
            out.push_str(phrase);
        }
        rest = &after[close + DELIMITER.len_utf8()..];
    }
    out.push_str(rest);
    Ok(out)
}
