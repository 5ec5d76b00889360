//! Correlation tokens.
//!
//! The gateway echoes one opaque string back on the response to a command.
//! A [`TokenContext`] packs structured `key=value` context into that string
//! so a handler can re-interpret a response without a local pending-request
//! table. Pairs are joined with `&`; keys and values are percent-encoded, so
//! any text round-trips and tokens built from unreserved characters (such as
//! `action=del-module&actor=42`) read exactly as written.

use std::{borrow::Cow, collections::BTreeMap, fmt};

const PAIR_SEPARATOR: char = '&';
const KEY_VALUE_SEPARATOR: char = '=';

/// Structured context carried in a command's echo field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenContext {
    fields: BTreeMap<String, String>,
}

impl TokenContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.fields.insert(key.into(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// True when `key` is present with exactly `expected` as its value.
    pub fn matches(&self, key: &str, expected: &str) -> bool {
        self.get(key) == Some(expected)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize into the echo string. Empty keys are dropped.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.fields.iter().filter(|(k, _)| !k.is_empty()) {
            if !out.is_empty() {
                out.push(PAIR_SEPARATOR);
            }
            out.push_str(&urlencoding::encode(key));
            out.push(KEY_VALUE_SEPARATOR);
            out.push_str(&urlencoding::encode(value));
        }
        out
    }

    /// Parse an echo string. Never fails: fragments without `=` or with an
    /// empty key are skipped, so an echo this codec did not produce decodes to
    /// an empty context.
    pub fn decode(token: &str) -> Self {
        let fields = token
            .split(PAIR_SEPARATOR)
            .filter_map(|pair| pair.split_once(KEY_VALUE_SEPARATOR))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (unescape(key), unescape(value)))
            .collect();
        Self { fields }
    }
}

fn unescape(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

impl fmt::Display for TokenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for TokenContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Self::new();
        for (key, value) in iter {
            ctx.insert(key, value);
        }
        ctx
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn plain_context_round_trips() {
        let ctx = TokenContext::new()
            .with("action", "del-module")
            .with("actor", 42)
            .with("group", "123456");
        assert_eq!(TokenContext::decode(&ctx.encode()), ctx);
    }

    #[test]
    fn unreserved_tokens_are_unchanged() {
        let ctx = TokenContext::new()
            .with("action", "del-module")
            .with("actor", 42);
        assert_eq!(ctx.encode(), "action=del-module&actor=42");
    }

    #[test]
    fn values_containing_delimiters_round_trip() {
        let ctx = TokenContext::new().with("text", "a=b&c=d 100%");
        let decoded = TokenContext::decode(&ctx.encode());
        assert_eq!(decoded.get("text"), Some("a=b&c=d 100%"));
    }

    #[test]
    fn empty_values_survive() {
        let ctx = TokenContext::new().with("note", "");
        let decoded = TokenContext::decode(&ctx.encode());
        assert_eq!(decoded.get("note"), Some(""));
    }

    #[test]
    fn empty_context_encodes_to_empty_string() {
        assert_eq!(TokenContext::new().encode(), "");
        assert!(TokenContext::decode("").is_empty());
    }

    #[rstest]
    #[case::legacy_echo("send_group_msg_123456")]
    #[case::bare_action("get_group_list")]
    #[case::separators_only("&&&")]
    #[case::empty_keys("=1&=2")]
    #[case::json("{\"not\": \"a token\"}")]
    #[case::unicode("撤回消息")]
    fn unrelated_echoes_decode_to_nothing(#[case] echo: &str) {
        assert!(TokenContext::decode(echo).is_empty());
    }

    #[test]
    fn invalid_percent_sequences_fall_back_to_raw_text() {
        let decoded = TokenContext::decode("k=%FF%FE&ok=1");
        assert_eq!(decoded.get("k"), Some("%FF%FE"));
        assert_eq!(decoded.get("ok"), Some("1"));
    }

    #[test]
    fn fragments_without_values_are_skipped() {
        let decoded = TokenContext::decode("module=example&garbage&action=whoami");
        assert_eq!(decoded.len(), 2);
        assert!(decoded.matches("module", "example"));
        assert!(decoded.matches("action", "whoami"));
    }

    #[test]
    fn collects_from_pairs() {
        let ctx: TokenContext = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(ctx.to_string(), "a=1&b=2");
    }
}
