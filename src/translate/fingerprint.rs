//! Content fingerprints: lowercase hex BLAKE3 digests used as cache keys.

use std::fmt;

/// 64 lowercase hex characters identifying a text string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint `text`. Pure and deterministic.
pub fn fingerprint(text: &str) -> ContentFingerprint {
    ContentFingerprint(blake3::hash(text.as_bytes()).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn deterministic_lowercase_hex() {
        let a = fingerprint("你好");
        let b = fingerprint("你好");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            fingerprint("").as_str(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn distinct_over_chat_corpus() {
        let corpus = [
            "你好", "你好 ", "您好", "哈哈哈", "哈哈哈哈", "LUL", "lul", "gg", "GG",
            "主播好", "這是什麼", "这是什么", "", " ", "1", "11", "早安", "晚安",
        ];
        let prints: HashSet<_> = corpus.iter().map(|t| fingerprint(t)).collect();
        assert_eq!(prints.len(), corpus.len());
    }
}
