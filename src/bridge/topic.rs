use crate::utils::{Error, Result};

/// Location of the wildcard marker inside a topic template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wildcard {
    pub index: usize,
    /// 1 for `*`, 2 for `**`.
    pub len: usize,
}

/// A topic string with at most one recognized wildcard.
///
/// Tasks resolving to several values are published once per value, with the
/// wildcard replaced by the element index or mapping key. A `*` directly
/// followed by `;` is a literal, and anything between `[` and `]` is never
/// inspected for wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    raw: String,
    wildcard: Option<Wildcard>,
}

impl TopicTemplate {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let wildcard = find_wildcard(&raw);
        Self { raw, wildcard }
    }

    pub fn topic(&self) -> &str {
        &self.raw
    }

    pub fn wildcard(&self) -> Option<Wildcard> {
        self.wildcard
    }

    /// True when the template can fan out. A wildcard at offset 0 has no
    /// prefix and does not count.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self.wildcard, Some(w) if w.index > 0)
    }

    /// Replaces the wildcard span with `substitution`.
    pub fn expand(&self, substitution: &str) -> Result<String> {
        let Some(Wildcard { index, len }) = self.wildcard else {
            return Err(Error::MalformedTopic(self.raw.clone()));
        };
        let mut topic = String::with_capacity(self.raw.len() + substitution.len());
        topic.push_str(&self.raw[..index]);
        topic.push_str(substitution);
        topic.push_str(&self.raw[index + len..]);
        Ok(topic)
    }

    pub fn error_topic(&self) -> String {
        format!("{}/error", self.raw)
    }
}

fn find_wildcard(topic: &str) -> Option<Wildcard> {
    let bytes = topic.as_bytes();
    let mut start = 0;

    while start < bytes.len() {
        let index = start + topic[start..].find('*')?;

        if let Some(bracket) = topic[start..index].find('[') {
            let bracket = start + bracket;
            // an unterminated index expression hides the rest of the topic
            let close = topic[bracket..].find(']')?;
            start = bracket + close + 1;
            continue;
        }

        let len = if bytes.get(index + 1) == Some(&b'*') { 2 } else { 1 };
        if bytes.get(index + len) == Some(&b';') {
            start = index + len;
            continue;
        }
        return Some(Wildcard { index, len });
    }
    None
}
