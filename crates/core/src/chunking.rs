use crate::error::ChunkingError;
use crate::extractor::PageText;
use crate::models::{Document, Unit};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_SECTION_HEADING_REGEX: &str =
    r"(?i)^\s*((?:section|article|chapter|part|rule|clause)\s+\d+[a-z]?(?:\.\d+)*|§\s*\d+[a-z]?(?:\.\d+)*)";

// A word broken by a hyphen at a line end, continued in lowercase on the next line.
const LINE_BREAK_HYPHEN_REGEX: &str = r"(\w)-[ \t]*\r?\n[ \t]*(\p{Ll})";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub unit_chars: usize,
    pub overlap_chars: usize,
    pub sentence_margin_chars: usize,
    /// A trailing unit that would add fewer new chars than this is merged
    /// into the unit before it.
    pub min_unit_chars: usize,
    pub section_heading_regex: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            unit_chars: 1_200,
            overlap_chars: 150,
            sentence_margin_chars: 120,
            min_unit_chars: 50,
            section_heading_regex: DEFAULT_SECTION_HEADING_REGEX.to_string(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.unit_chars == 0 {
            return Err(ChunkingError::InvalidConfig(
                "unit_chars must be greater than zero".to_string(),
            ));
        }
        if self.unit_chars <= self.overlap_chars {
            return Err(ChunkingError::InvalidConfig(format!(
                "unit_chars ({}) must exceed overlap_chars ({})",
                self.unit_chars, self.overlap_chars
            )));
        }
        if self.min_unit_chars >= self.unit_chars {
            return Err(ChunkingError::InvalidConfig(format!(
                "min_unit_chars ({}) must be below unit_chars ({})",
                self.min_unit_chars, self.unit_chars
            )));
        }
        Ok(())
    }

    /// Longest unit the window can produce.
    pub fn max_unit_chars(&self) -> usize {
        self.unit_chars
            .saturating_add(self.sentence_margin_chars)
            .saturating_add(self.min_unit_chars)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rejoins words hyphenated across a line break ("statu-\ntory" becomes "statutory").
pub fn rejoin_hyphenated(text: &str, hyphen_re: &Regex) -> String {
    hyphen_re.replace_all(text, "${1}${2}").into_owned()
}

/// Normalizes each line but keeps line breaks, so heading lines stay detectable.
pub fn normalize_page_text(text: &str) -> String {
    text.lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy)]
struct PageSegment {
    number: u32,
    start: usize,
}

#[derive(Debug, Clone)]
struct Heading {
    offset: usize,
    label: String,
}

/// Pages joined into one char buffer, with the offsets needed to map back to pages.
struct Concatenated {
    chars: Vec<char>,
    segments: Vec<PageSegment>,
    headings: Vec<Heading>,
}

impl Concatenated {
    fn build(pages: &[PageText], heading_re: &Regex, hyphen_re: &Regex) -> Self {
        let mut chars = Vec::new();
        let mut segments = Vec::new();
        let mut headings = Vec::new();

        for page in pages.iter().filter(|page| !page.is_blank()) {
            let normalized = normalize_page_text(&rejoin_hyphenated(&page.text, hyphen_re));
            if normalized.is_empty() {
                continue;
            }
            if !chars.is_empty() {
                chars.push('\n');
            }

            let start = chars.len();
            segments.push(PageSegment {
                number: page.number,
                start,
            });

            let mut line_offset = start;
            for line in normalized.split('\n') {
                if let Some(label) = heading_re.captures(line).and_then(|capture| capture.get(1)) {
                    headings.push(Heading {
                        offset: line_offset,
                        label: normalize_whitespace(label.as_str()),
                    });
                }
                line_offset += line.chars().count() + 1;
            }

            chars.extend(normalized.chars());
        }

        Self {
            chars,
            segments,
            headings,
        }
    }

    fn segment_at(&self, offset: usize) -> PageSegment {
        let index = self
            .segments
            .partition_point(|segment| segment.start <= offset)
            .saturating_sub(1);
        self.segments[index]
    }

    fn section_for(&self, start: usize, end: usize) -> Option<String> {
        let preceding = self
            .headings
            .iter()
            .take_while(|heading| heading.offset <= start)
            .last();
        preceding
            .or_else(|| {
                self.headings
                    .iter()
                    .find(|heading| heading.offset > start && heading.offset < end)
            })
            .map(|heading| heading.label.clone())
    }
}

/// Splits page text into overlapping units.
///
/// This is a pure function of the document identity, the pages and the config:
/// re-running it on the same input yields the same units and unit ids.
pub fn chunk_pages(
    document: &Document,
    pages: &[PageText],
    config: &ChunkingConfig,
) -> Result<Vec<Unit>, ChunkingError> {
    config.validate()?;
    let heading_re = Regex::new(&config.section_heading_regex)?;
    let hyphen_re = Regex::new(LINE_BREAK_HYPHEN_REGEX)?;

    let text = Concatenated::build(pages, &heading_re, &hyphen_re);
    if text.chars.is_empty() {
        return Err(ChunkingError::EmptyInput);
    }

    let mut units = Vec::new();
    for (ordinal, (start, end)) in window_bounds(&text.chars, config).into_iter().enumerate() {
        let first = text.segment_at(start);
        let last = text.segment_at(end - 1);
        let raw: String = text.chars[start..end].iter().collect();
        let ordinal = ordinal as u64;

        units.push(Unit {
            unit_id: make_unit_id(&document.id, ordinal, &raw),
            document_id: document.id.clone(),
            document_name: document.name.clone(),
            ordinal,
            page_start: first.number,
            page_end: last.number,
            section: text.section_for(start, end),
            char_start: start - first.start,
            char_end: end - last.start,
            text: raw,
        });
    }

    Ok(units)
}

/// Char ranges of each window. Consecutive ranges share `overlap_chars`.
/// Windows never end on whitespace, so a unit never ends on a page separator.
fn window_bounds(chars: &[char], config: &ChunkingConfig) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0usize;

    loop {
        let target = start.saturating_add(config.unit_chars).min(chars.len());
        let mut end = if target == chars.len() {
            target
        } else {
            extend_to_boundary(chars, target, config.sentence_margin_chars)
        };

        if chars.len() - end < config.min_unit_chars {
            end = chars.len();
        } else {
            // Keep end > start + overlap so the next window still advances.
            let floor = start.saturating_add(config.overlap_chars).saturating_add(1);
            while end > floor && chars[end - 1].is_whitespace() {
                end -= 1;
            }
        }
        bounds.push((start, end));

        if end == chars.len() {
            break;
        }
        start = end - config.overlap_chars;
    }

    bounds
}

fn extend_to_boundary(chars: &[char], target: usize, margin: usize) -> usize {
    let limit = target.saturating_add(margin).min(chars.len());

    let sentence_end = (target..=limit).find(|&index| {
        let at = chars[index - 1];
        let next_is_space = chars.get(index).map_or(true, |c| c.is_whitespace());
        at == '\n' || (matches!(at, '.' | '!' | '?' | ';') && next_is_space)
    });
    if let Some(end) = sentence_end {
        return end;
    }

    (target..=limit)
        .find(|&index| chars[index - 1].is_whitespace())
        .unwrap_or(target)
}

fn make_unit_id(document_id: &str, ordinal: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Document {
        Document::with_id("doc-1", "Penal Code.pdf")
    }

    fn config(unit_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            unit_chars,
            overlap_chars,
            sentence_margin_chars: 20,
            ..ChunkingConfig::default()
        }
    }

    fn long_page(number: u32, heading: &str, sentences: usize) -> PageText {
        let body = (0..sentences)
            .map(|index| format!("Clause text number {index} applies here."))
            .collect::<Vec<_>>()
            .join(" ");
        PageText::new(number, format!("{heading}\n{body}"))
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
        assert_eq!(normalize_page_text("  Section 1 \n\n  body   text "), "Section 1\nbody text");
    }

    #[test]
    fn overlap_not_smaller_than_unit_is_rejected() {
        let pages = vec![PageText::new(1, "Some text.")];
        let result = chunk_pages(&document(), &pages, &config(100, 100));
        assert!(matches!(result, Err(ChunkingError::InvalidConfig(_))));
    }

    #[test]
    fn blank_input_is_rejected() {
        let pages = vec![PageText::new(1, "   "), PageText::new(2, "")];
        let result = chunk_pages(&document(), &pages, &ChunkingConfig::default());
        assert!(matches!(result, Err(ChunkingError::EmptyInput)));
    }

    #[test]
    fn units_cover_the_text_with_configured_overlap() {
        let pages = vec![
            long_page(1, "Section 1 Definitions", 20),
            PageText::new(2, ""),
            long_page(3, "Section 2 Offences", 20),
        ];
        let cfg = config(200, 40);
        let units = chunk_pages(&document(), &pages, &cfg).expect("chunking succeeds");
        assert!(units.len() > 2);

        let text = Concatenated::build(
            &pages,
            &Regex::new(&cfg.section_heading_regex).unwrap(),
            &Regex::new(LINE_BREAK_HYPHEN_REGEX).unwrap(),
        );
        let bounds = window_bounds(&text.chars, &cfg);
        assert_eq!(bounds.len(), units.len());
        assert_eq!(bounds[0].0, 0);
        assert_eq!(bounds.last().map(|bound| bound.1), Some(text.chars.len()));
        for pair in bounds.windows(2) {
            assert_eq!(pair[0].1 - pair[1].0, cfg.overlap_chars);
        }
        for ((start, end), unit) in bounds.iter().zip(&units) {
            assert!(end - start <= cfg.max_unit_chars());
            assert_eq!(unit.text.chars().count(), end - start);
        }

        for (index, unit) in units.iter().enumerate() {
            assert_eq!(unit.ordinal, index as u64);
            assert_ne!(unit.page_start, 2);
        }
    }

    #[test]
    fn units_carry_page_and_nearest_section() {
        let pages = vec![
            long_page(11, "Section 44 Contracts", 12),
            long_page(12, "Section 45 Penalty for trespass", 12),
        ];
        let units = chunk_pages(&document(), &pages, &config(150, 20)).expect("chunking succeeds");

        let first = &units[0];
        assert_eq!(first.page_start, 11);
        assert_eq!(first.section.as_deref(), Some("Section 44"));
        assert_eq!(first.char_start, 0);

        let last = units.last().expect("at least one unit");
        assert_eq!(last.page_end, 12);
        assert_eq!(last.section.as_deref(), Some("Section 45"));
    }

    #[test]
    fn unit_boundaries_prefer_sentence_ends() {
        let pages = vec![long_page(1, "Article 3", 30)];
        let cfg = ChunkingConfig {
            sentence_margin_chars: 40,
            ..config(100, 10)
        };
        let units = chunk_pages(&document(), &pages, &cfg).expect("chunking succeeds");

        for unit in &units[..units.len() - 1] {
            assert!(unit.text.ends_with('.'), "unit should end a sentence: {:?}", unit.text);
        }
    }

    #[test]
    fn sentence_end_at_the_margin_limit_is_taken() {
        let pages = vec![PageText::new(
            1,
            "aaaa bbbb cccc dddd eeee. Next sentence follows here and runs on for a while.",
        )];
        let cfg = ChunkingConfig {
            sentence_margin_chars: 5,
            min_unit_chars: 5,
            ..config(20, 0)
        };
        let units = chunk_pages(&document(), &pages, &cfg).expect("chunking succeeds");
        assert_eq!(units[0].text, "aaaa bbbb cccc dddd eeee.");
    }

    #[test]
    fn units_do_not_end_on_the_page_separator() {
        let pages = vec![
            PageText::new(1, "x".repeat(99)),
            PageText::new(2, "Section 2 Remedies\nA remedy follows every breach of the lease agreement."),
        ];
        let cfg = ChunkingConfig {
            sentence_margin_chars: 5,
            min_unit_chars: 5,
            ..config(99, 10)
        };
        let units = chunk_pages(&document(), &pages, &cfg).expect("chunking succeeds");

        let first = &units[0];
        assert_eq!(first.page_end, 1);
        assert_eq!(first.char_end, 99);
        assert!(!first.text.ends_with(char::is_whitespace));
        assert_eq!(units[1].page_start, 1);
        assert_eq!(units[1].char_start, 89);
    }

    #[test]
    fn short_tail_merges_into_the_previous_unit() {
        let pages = vec![long_page(1, "Article 3", 4)];
        let merged = ChunkingConfig {
            min_unit_chars: 50,
            ..config(100, 20)
        };
        let units = chunk_pages(&document(), &pages, &merged).expect("chunking succeeds");
        assert_eq!(units.len(), 1);
        assert!(units[0].text.ends_with("number 3 applies here."));

        let unmerged = ChunkingConfig {
            min_unit_chars: 0,
            ..merged
        };
        let units = chunk_pages(&document(), &pages, &unmerged).expect("chunking succeeds");
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn every_unit_after_the_first_adds_minimum_new_text() {
        let cfg = ChunkingConfig {
            min_unit_chars: 50,
            ..config(120, 30)
        };
        for sentences in 1..15 {
            let pages = vec![long_page(1, "Section 7 Fines", sentences)];
            let text = Concatenated::build(
                &pages,
                &Regex::new(&cfg.section_heading_regex).unwrap(),
                &Regex::new(LINE_BREAK_HYPHEN_REGEX).unwrap(),
            );
            let bounds = window_bounds(&text.chars, &cfg);
            for pair in bounds.windows(2) {
                assert!(pair[1].1 - pair[0].1 >= cfg.min_unit_chars, "{sentences} sentences: {bounds:?}");
            }
        }
    }

    #[test]
    fn min_unit_not_below_unit_is_rejected() {
        let cfg = ChunkingConfig {
            min_unit_chars: 100,
            ..config(100, 10)
        };
        assert!(matches!(cfg.validate(), Err(ChunkingError::InvalidConfig(_))));
    }

    #[test]
    fn words_hyphenated_across_lines_are_rejoined() {
        let pages = vec![PageText::new(
            12,
            "Section 45 Penalty\nWhoever commits crimi-\nnal tres-  \n  pass is liable under the non-\nFederal code.",
        )];
        let units = chunk_pages(&document(), &pages, &ChunkingConfig::default()).expect("chunking succeeds");
        assert_eq!(units.len(), 1);
        assert!(units[0].text.contains("commits criminal trespass is liable"));
        assert!(units[0].text.contains("non-\nFederal"));
        assert_eq!(units[0].section.as_deref(), Some("Section 45"));
    }

    #[test]
    fn oversized_unit_chars_do_not_overflow() {
        let pages = vec![long_page(1, "Article 9", 10)];
        let cfg = ChunkingConfig {
            unit_chars: usize::MAX,
            overlap_chars: 0,
            sentence_margin_chars: usize::MAX,
            ..ChunkingConfig::default()
        };
        let units = chunk_pages(&document(), &pages, &cfg).expect("chunking succeeds");
        assert_eq!(units.len(), 1);
        assert_eq!(cfg.max_unit_chars(), usize::MAX);
    }

    #[test]
    fn chunking_is_deterministic() {
        let pages = vec![long_page(1, "§ 12 Leases", 25)];
        let first = chunk_pages(&document(), &pages, &config(120, 30)).expect("chunking succeeds");
        let second = chunk_pages(&document(), &pages, &config(120, 30)).expect("chunking succeeds");
        assert_eq!(first, second);
        assert_eq!(first[0].section.as_deref(), Some("§ 12"));
    }
}
