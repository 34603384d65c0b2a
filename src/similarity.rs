//! # Similarity Engine (§4.2)
//! Pure functions: mixed-language tokenisation, Jaccard, length-normalised
//! edit distance, category-aware thresholding, stable title hash.

use std::collections::HashSet;

/// Fold full-width ASCII forms (letters, digits, space) to half-width and
/// lowercase the half-width-folded ASCII range. Non-Latin scripts (CJK,
/// etc.) pass through unchanged except for the full-width fold.
fn fold_normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            let code = c as u32;
            // Full-width ASCII variants occupy U+FF01..U+FF5E, offset +0xFEE0
            // from their ASCII counterparts; U+3000 is the full-width space.
            if (0xFF01..=0xFF5E).contains(&code) {
                char::from_u32(code - 0xFEE0).unwrap_or(c)
            } else if code == 0x3000 {
                ' '
            } else {
                c
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Tokenise per §4.2: ASCII alphanumeric runs as word tokens, plus
/// adjacent-character bigrams (and the lone character itself for a
/// length-1 residue) over the non-ASCII remainder.
pub fn tokenize(s: &str) -> HashSet<String> {
    let folded = fold_normalize(s);
    let mut tokens = HashSet::new();

    // Word tokens: maximal runs of ASCII alphanumeric characters.
    let mut current = String::new();
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            current.push(c);
        } else {
            if !current.is_empty() {
                tokens.insert(std::mem::take(&mut current));
            }
        }
    }
    if !current.is_empty() {
        tokens.insert(current);
    }

    // Non-ASCII residue: strip ASCII alphanumerics and whitespace/punctuation
    // entirely, then bigram the remaining run of "interesting" characters.
    let residue: Vec<char> = folded
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace() && !c.is_ascii_punctuation())
        .collect();

    if residue.len() == 1 {
        tokens.insert(residue[0].to_string());
    } else {
        for w in residue.windows(2) {
            tokens.insert(format!("{}{}", w[0], w[1]));
        }
    }

    tokens
}

/// Jaccard similarity over two token sets. Two empty sets yield 1.0; exactly
/// one empty set yields 0.0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

pub fn title_jaccard(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Standard edit distance (insert/delete/substitute all cost 1) on
/// fold-normalised strings, divided by `max(|a|, |b|)` in characters.
/// Defined as 0.0 for two empty strings, 1.0 when exactly one is empty.
pub fn normalized_edit_distance(a: &str, b: &str) -> f64 {
    let a = fold_normalize(a);
    let b = fold_normalize(b);
    let a_len = a.chars().count();
    let b_len = b.chars().count();

    if a_len == 0 && b_len == 0 {
        return 0.0;
    }
    if a_len == 0 || b_len == 0 {
        return 1.0;
    }

    let distance = strsim::levenshtein(&a, &b);
    distance as f64 / a_len.max(b_len) as f64
}

/// Category used to select dedup thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category(pub String);

impl Category {
    pub fn default_category() -> Self {
        Category("default".to_string())
    }
}

/// Detect category from source id substring first, then hostname substring,
/// falling back to `default`.
pub fn detect_category(source_id: &str, url: &str) -> Category {
    let sid = source_id.to_ascii_lowercase();
    if sid.contains("arxiv") {
        return Category("arxiv".to_string());
    }
    if sid.contains("news") || sid.contains("techcrunch") {
        return Category("news".to_string());
    }
    if sid.contains("blog") || sid.contains("qiita") || sid.contains("zenn") {
        return Category("blog".to_string());
    }

    if let Some(host) = crate::url_normalize::extract_domain(url) {
        if host.contains("arxiv") {
            return Category("arxiv".to_string());
        }
        if host.contains("news") || host.contains("techcrunch") {
            return Category("news".to_string());
        }
        if host.contains("blog") || host.contains("qiita") || host.contains("zenn") {
            return Category("blog".to_string());
        }
    }

    Category::default_category()
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryThreshold {
    pub jaccard_gte: f64,
    pub levenshtein_lte: f64,
}

/// Layer-3 fuzzy duplicate rule: titles are duplicates iff Jaccard meets the
/// category floor OR normalised edit distance is at or below its ceiling.
pub fn is_layer3_duplicate(a: &str, b: &str, threshold: CategoryThreshold) -> bool {
    title_jaccard(a, b) >= threshold.jaccard_gte
        || normalized_edit_distance(a, b) <= threshold.levenshtein_lte
}

/// Layer-2 same-session near-duplicate rule: Jaccard-only against a
/// same-domain/cross-domain cutoff.
pub fn is_layer2_duplicate(a: &str, b: &str, same_domain: bool, thresholds: (f64, f64)) -> bool {
    let (same_domain_gte, cross_domain_gte) = thresholds;
    let gte = if same_domain {
        same_domain_gte
    } else {
        cross_domain_gte
    };
    title_jaccard(a, b) >= gte
}

/// djb2 over the fold-normalised, whitespace-collapsed title, seed 5381,
/// emitted as absolute-value base-16. Used only to narrow Layer-3 candidate
/// sets, never as a sole duplicate signal.
pub fn stable_title_hash(title: &str) -> String {
    let folded = fold_normalize(title);
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut h: i64 = 5381;
    for b in collapsed.bytes() {
        h = h.wrapping_shl(5).wrapping_add(h).wrapping_add(b as i64);
    }
    format!("{:x}", h.unsigned_abs())
}
