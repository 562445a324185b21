//! Linguistic normalization for keyword detection.
//!
//! Patient questions arrive with accents, punctuation, and arbitrary casing
//! ("Está com DOR no peito?!"). Keyword policies are written in plain
//! lowercase ASCII. Everything funnels through [`normalize`] so matching is
//! insensitive to formatting, and [`contains_keyword`] applies word-boundary
//! semantics so "dor" never matches inside "adorei".

/// Fold a single character: strip Latin diacritics, lowercase.
///
/// Covers the Latin-1 Supplement and Latin Extended-A ranges that occur in
/// Portuguese clinical text. Characters outside the table pass through
/// `to_lowercase` unchanged.
fn fold_char(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        'ý' | 'ÿ' | 'Ý' => 'y',
        _ => ch.to_ascii_lowercase(),
    }
}

/// Canonicalize free text for keyword matching.
///
/// Strips diacritics, lowercases, replaces punctuation with single spaces,
/// collapses runs of whitespace, and trims. Idempotent: applying it twice
/// yields the same string. Empty input normalizes to an empty string.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        let folded = fold_char(ch);
        if folded.is_alphanumeric() || folded == '_' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            // Non-Latin alphabetics lowercase via the full Unicode mapping.
            if folded.is_uppercase() {
                out.extend(folded.to_lowercase());
            } else {
                out.push(folded);
            }
        } else {
            // Punctuation and whitespace both collapse to a single separator.
            pending_space = true;
        }
    }

    out
}

/// Does `text` contain `keyword`, under normalized word-boundary matching?
///
/// Both sides are normalized first, then the keyword must appear as a whole
/// word (or whole phrase of words): "dor no peito" matches inside "estou com
/// dor no peito hoje", but "dor" does not match inside "adorei".
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    let text = normalize(text);
    let keyword = normalize(keyword);
    if keyword.is_empty() {
        return false;
    }

    let kw_len = keyword.len();
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(&keyword) {
        let start = from + pos;
        let end = start + kw_len;
        // Normalized text is space-separated words, so boundary checks reduce
        // to inspecting the neighboring byte.
        let boundary_before = start == 0 || bytes[start - 1] == b' ';
        let boundary_after = end == text.len() || bytes[end] == b' ';
        if boundary_before && boundary_after {
            return true;
        }
        // Advance past the first char of this match (may be multi-byte).
        from = start
            + text[start..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
    }
    false
}

/// First keyword from `keywords` found in `text`, in list order.
///
/// List order is load-bearing: safety policies place the most specific
/// phrases first and callers report the matched keyword back to the patient.
pub fn find_keyword<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .find(|kw| contains_keyword(text, kw))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents_and_lowercases() {
        assert_eq!(normalize("Está com dor?"), "esta com dor");
        assert_eq!(normalize("FALTA DE AR!!!"), "falta de ar");
        assert_eq!(normalize("Você está bem?"), "voce esta bem");
    }

    #[test]
    fn collapses_punctuation_and_whitespace() {
        assert_eq!(normalize("dor...   no,, peito"), "dor no peito");
        assert_eq!(normalize("  coração — acelerado  "), "coracao acelerado");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   ...!!!   "), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for text in ["Está com DOR no peito?!", "açúcar à noite", "", "a  b\tc"] {
            let once = normalize(text);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn keyword_matches_whole_words_only() {
        assert!(contains_keyword("Estou com dor no peito", "dor no peito"));
        assert!(contains_keyword("Estou com dor", "dor"));
        // "dor" inside "adorei" must not match
        assert!(!contains_keyword("Adorei o atendimento", "dor"));
        // nor inside "dormir"
        assert!(!contains_keyword("Não consigo dormir", "dor"));
    }

    #[test]
    fn keyword_matching_ignores_accents_and_case() {
        assert!(contains_keyword("SANGRAMENTO intenso", "sangramento"));
        assert!(contains_keyword("falta de ar", "Falta de Ar"));
        assert!(contains_keyword("estou com náusea", "nausea"));
    }

    #[test]
    fn empty_keyword_never_matches() {
        assert!(!contains_keyword("qualquer texto", ""));
        assert!(!contains_keyword("", "dor"));
    }

    #[test]
    fn find_keyword_returns_first_in_list_order() {
        let keywords = vec!["falta de ar".to_string(), "dor no peito".to_string()];
        let found = find_keyword("dor no peito e falta de ar", &keywords);
        assert_eq!(found, Some("falta de ar"));
    }

    #[test]
    fn find_keyword_none_when_absent() {
        let keywords = vec!["sangramento".to_string()];
        assert_eq!(find_keyword("pergunta inofensiva", &keywords), None);
    }

    #[test]
    fn repeated_partial_matches_still_find_bounded_one() {
        // First occurrence is embedded ("adorei"), second is word-bounded.
        assert!(contains_keyword("adorei mas sinto dor agora", "dor"));
    }
}
