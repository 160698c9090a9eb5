//! Phrase normalization and trigger scanning.
//!
//! Every phrase goes through [`normalize`] before the engine sees it, so rules
//! can be written against lower-case text with single spaces.
//!
//! The scan then produces coarse **buckets** (`BucketMask`): cheap booleans
//! such as "contains digits" or "has Cyrillic letters". Bucketed rules are only
//! activated when the phrase carries their bucket; rules without buckets are
//! always on.
//!
//! False positives are fine here because the parser still has to match full
//! rule patterns. False negatives are not: a bucket that is missed switches a
//! rule off for good.

use super::compiled_rules::BucketMask;

/// Lower-case `input`, trim it and collapse runs of spaces and tabs to one
/// space. Other characters (including newlines inside the phrase) are kept.
pub fn normalize(input: &str) -> String {
    let lower = input.trim().to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut in_gap = false;
    for c in lower.chars() {
        if c == ' ' || c == '\t' {
            if !in_gap {
                out.push(' ');
                in_gap = true;
            }
        } else {
            out.push(c);
            in_gap = false;
        }
    }
    out
}

/// Input characteristics detected from the normalized phrase.
#[derive(Debug, Clone)]
pub struct TriggerInfo {
    pub buckets: BucketMask,
}

impl TriggerInfo {
    /// Scan `input` for coarse buckets.
    pub fn scan(input: &str) -> Self {
        let mut buckets = BucketMask::empty();

        if input.bytes().any(|b| b.is_ascii_digit()) {
            buckets |= BucketMask::HAS_DIGITS;
        }
        if input.contains("opendota.") || input.contains("://") {
            buckets |= BucketMask::HAS_URL;
        }
        if input.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c)) {
            buckets |= BucketMask::CYRILLIC;
        }
        if input.bytes().any(|b| b.is_ascii_alphabetic()) {
            buckets |= BucketMask::LATIN;
        }

        TriggerInfo { buckets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_inline_whitespace() {
        assert_eq!(normalize("  Ласт \t  Катка   В ДОТУ "), "ласт катка в доту");
        assert_eq!(normalize("LM"), "lm");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("\t\n"), "");
    }

    #[test]
    fn normalize_keeps_inner_newlines() {
        assert_eq!(normalize("lm\ndota"), "lm\ndota");
    }

    #[test]
    fn scan_detects_buckets() {
        let info = TriggerInfo::scan("привяжи https://www.opendota.com/players/55136643");
        assert!(info.buckets.contains(BucketMask::HAS_DIGITS));
        assert!(info.buckets.contains(BucketMask::HAS_URL));
        assert!(info.buckets.contains(BucketMask::CYRILLIC));
        assert!(info.buckets.contains(BucketMask::LATIN));

        let info = TriggerInfo::scan("здарова");
        assert_eq!(info.buckets, BucketMask::CYRILLIC);

        let info = TriggerInfo::scan("!lm");
        assert_eq!(info.buckets, BucketMask::LATIN);
    }
}
