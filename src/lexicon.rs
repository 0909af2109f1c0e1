use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SearchError;
use crate::LabelIndex;

const BLANK_SYMBOLS: &[&str] = &["<blank>", "<blk>"];
const SENTENCE_END_SYMBOLS: &[&str] = &["</s>", "<sentence-end>"];
const SILENCE_SYMBOLS: &[&str] = &["[SILENCE]", "<sil>", "[silence]"];

/// Flat, ID-indexed token inventory.
///
/// Label `i` of the scorer corresponds to `symbols[i]`.
#[derive(Debug, Clone)]
pub struct Lexicon {
    symbols: Vec<String>,
    index: HashMap<String, LabelIndex>,
    blank: Option<LabelIndex>,
    sentence_end: Option<LabelIndex>,
    silence: Option<LabelIndex>,
}

impl Lexicon {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, s) in symbols.iter().enumerate() {
            if !s.is_empty() {
                index.entry(s.clone()).or_insert(i as LabelIndex);
            }
        }
        let find = |candidates: &[&str]| candidates.iter().find_map(|c| index.get(*c).copied());
        let blank = find(BLANK_SYMBOLS);
        let sentence_end = find(SENTENCE_END_SYMBOLS);
        let silence = find(SILENCE_SYMBOLS);

        Self {
            symbols,
            index,
            blank,
            sentence_end,
            silence,
        }
    }

    /// Loads a vocabulary file.
    ///
    /// Lines are either `symbol id` pairs or bare symbols, in which case the
    /// line number is the id. Gaps in the id range become empty symbols.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let lexicon = Self::parse(&content)?;
        log::info!(
            "Loaded lexicon with {} tokens from {}",
            lexicon.len(),
            path.as_ref().display()
        );
        Ok(lexicon)
    }

    pub fn parse(content: &str) -> Result<Self, SearchError> {
        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(symbol) = parts.next() else {
                continue;
            };
            let id = match parts.next() {
                Some(id) => id.parse::<LabelIndex>().map_err(|_| {
                    SearchError::UnknownToken(format!(
                        "invalid id '{id}' for token '{symbol}' on line {}",
                        line_no + 1
                    ))
                })? as usize,
                None => entries.len(),
            };
            entries.push((symbol.to_string(), id));
        }

        let size = entries.iter().map(|(_, i)| *i + 1).max().unwrap_or(0);
        // Gaps may at most double the inventory.
        if size > 2 * entries.len() {
            return Err(SearchError::UnknownToken(format!(
                "largest id {} is too sparse for {} tokens",
                size - 1,
                entries.len()
            )));
        }
        let mut symbols = vec![String::new(); size];
        for (symbol, id) in entries {
            symbols[id] = symbol;
        }
        Ok(Self::new(symbols))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All label indices in vocabulary order.
    pub fn labels(&self) -> Range<LabelIndex> {
        0..self.symbols.len() as LabelIndex
    }

    pub fn symbol(&self, label: LabelIndex) -> Option<&str> {
        self.symbols.get(label as usize).map(String::as_str)
    }

    pub fn index_of(&self, symbol: &str) -> Option<LabelIndex> {
        self.index.get(symbol).copied()
    }

    pub fn blank(&self) -> Option<LabelIndex> {
        self.blank
    }

    pub fn sentence_end(&self) -> Option<LabelIndex> {
        self.sentence_end
    }

    pub fn silence(&self) -> Option<LabelIndex> {
        self.silence
    }

    pub fn is_special(&self, label: LabelIndex) -> bool {
        [self.blank, self.sentence_end, self.silence].contains(&Some(label))
    }

    /// Joins the symbols of `labels` into text, skipping special tokens and
    /// turning `▁` word markers into spaces.
    pub fn decode_text<I>(&self, labels: I) -> String
    where
        I: IntoIterator<Item = LabelIndex>,
    {
        let joined: String = labels
            .into_iter()
            .filter(|l| !self.is_special(*l))
            .filter_map(|l| self.symbol(l))
            .map(|s| s.replace('\u{2581}', " "))
            .collect();
        match &*DECODE_SPACE_RE {
            Ok(re) => re
                .replace_all(&joined, |c: &regex::Captures| {
                    if c.get(1).is_some() {
                        " "
                    } else {
                        ""
                    }
                })
                .to_string(),
            Err(_) => joined.trim().to_string(),
        }
    }
}

static DECODE_SPACE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\A\s|\s\B|(\s)\b"));
