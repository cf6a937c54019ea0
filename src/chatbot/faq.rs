//! Canned answers about UNISON SQUARE GARDEN.
//!
//! The table is an ordered list of (matcher, answer) pairs. Lookup scans in
//! order and the first hit wins, so overlapping entries resolve by position.

use regex::Regex;
use tracing::debug;

/// Substrings that route a message to the FAQ instead of the model.
/// Matched case-sensitively.
pub const FAQ_TRIGGERS: [&str; 2] = ["UNISON", "ユニゾン"];

pub const DEFAULT_FALLBACK: &str =
    "UNISON SQUARE GARDENについての質問がよくわからへんかったわ…別の質問をしてみてな！🎵";

const DEFAULT_ENTRIES: [(&str, &str); 5] = [
    (
        "メンバー",
        "メンバーは斎藤宏介さん（ボーカル・ギター）、田淵智也さん（ベース）、鈴木貴雄さん（ドラム）やで！",
    ),
    (
        "代表曲",
        "代表曲は『シュガーソングとビターステップ』や『オリオンをなぞる』やで！",
    ),
    (
        "デビュー",
        "UNISON SQUARE GARDENは2004年に結成され、2008年に「センチメンタルピリオド」でメジャーデビューしたんや。",
    ),
    (
        "最新アルバム",
        "最新アルバムは『SUB MACHINE, BEST MACHINE』やで！結成20周年を記念してリリースされたやつで、昔の曲たちも再録されてる素晴らしいアルバムなんや！ぜひ聴いてみてな🎵",
    ),
    (
        "ライブ",
        "公式サイトやSNSで最新のライブ情報をチェックしてな！公式サイトはこちら：https://unison-s-g.com/",
    ),
];

/// Returns true if the message should be answered from the FAQ.
pub fn is_faq_trigger(text: &str) -> bool {
    FAQ_TRIGGERS.iter().any(|t| text.contains(t))
}

/// Decides whether an entry applies to a message.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Case-insensitive substring.
    Keyword(String),
    /// Regex run against the lower-cased message. Patterns loaded from
    /// an FAQ file are built case-insensitive so upper-case literals
    /// still match.
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, lowered: &str) -> bool {
        match self {
            Matcher::Keyword(k) => lowered.contains(&k.to_lowercase()),
            Matcher::Pattern(re) => re.is_match(lowered),
        }
    }

    fn describe(&self) -> &str {
        match self {
            Matcher::Keyword(k) => k,
            Matcher::Pattern(re) => re.as_str(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaqEntry {
    pub matcher: Matcher,
    pub answer: String,
}

impl FaqEntry {
    pub fn keyword(keyword: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Keyword(keyword.into()),
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaqTable {
    entries: Vec<FaqEntry>,
    fallback: String,
}

impl FaqTable {
    pub fn new(entries: Vec<FaqEntry>, fallback: impl Into<String>) -> Self {
        Self {
            entries,
            fallback: fallback.into(),
        }
    }

    /// Answer for the first matching entry, or the fallback.
    pub fn lookup(&self, question: &str) -> &str {
        debug!("FAQ question: {question}");
        let lowered = question.to_lowercase();
        for entry in &self.entries {
            if entry.matcher.matches(&lowered) {
                debug!("FAQ matched: {}", entry.matcher.describe());
                return &entry.answer;
            }
        }
        &self.fallback
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }
}

impl Default for FaqTable {
    fn default() -> Self {
        let entries = DEFAULT_ENTRIES
            .iter()
            .map(|(k, a)| FaqEntry::keyword(*k, *a))
            .collect();
        Self::new(entries, DEFAULT_FALLBACK)
    }
}
