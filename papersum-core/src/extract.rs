//! Structured response extraction.
//!
//! Turns the model's free-form answer into the six summary fields. Each field
//! is located with an ordered ladder of header rules, most restrictive first:
//!
//! 1. a line-anchored `HEADER:` through the next line-anchored header (or end
//!    of text);
//! 2. the header anywhere, colon optional, through the next header anywhere;
//! 3. the rest of the header's line.
//!
//! The first rule whose trimmed capture reaches [`MIN_FIELD_CHARS`] wins.
//! Headers match case-insensitively, accept `_`, space or `-` between words
//! and tolerate markdown decoration (`**`, `#`, `-`, `>`).
//!
//! `intermediate_overview` is the field models most often mangle, so it gets a
//! second tier: alternative header spellings, then a positional split of the
//! text between the beginner overview and the beginner summary.

use crate::types::{MIN_FIELD_CHARS, SummaryField, SynthesisResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, error, trace};

/// Alternative spellings accepted for `INTERMEDIATE_OVERVIEW`.
pub const INTERMEDIATE_OVERVIEW_ALIASES: [&str; 4] = [
    "ADVANCED_OVERVIEW",
    "TECHNICAL_OVERVIEW",
    "INTERMEDIATE_DESCRIPTION",
    "EXPERT_OVERVIEW",
];

/// Leading markdown decoration allowed before a header.
const DECORATION: &str = r"(?:[#>*-]+[ \t]*)*";

static PATTERNS: LazyLock<Result<HeaderPatterns, regex::Error>> =
    LazyLock::new(HeaderPatterns::compile);

/// Extract all six fields from a model response.
///
/// Returns `None` if any field cannot be recovered or fails the final
/// length check.
pub fn extract(text: &str) -> Option<SynthesisResult> {
    match PATTERNS.as_ref() {
        Ok(patterns) => patterns.extract(text),
        Err(e) => {
            error!(error = %e, "Header patterns failed to compile");
            None
        }
    }
}

/// Render a result in the canonical `HEADER: value` layout the prompt asks for.
pub fn render_sections(result: &SynthesisResult) -> String {
    SummaryField::ALL
        .iter()
        .map(|field| format!("{}: {}", field.header(), result.get(*field)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Which ladder rule produced a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    LineHeader,
    LooseHeader,
    RestOfLine,
}

/// A field value and where its header started.
#[derive(Debug)]
struct Found {
    value: String,
    header_pos: usize,
}

/// Header regexes for one field (or one set of alias spellings).
struct FieldPatterns {
    line: Regex,
    loose: Regex,
}

impl FieldPatterns {
    fn compile(headers: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            line: Regex::new(&line_header_pattern(headers))?,
            loose: Regex::new(&loose_header_pattern(headers))?,
        })
    }

    /// Run the rule ladder starting at byte offset `from`.
    fn ladder(&self, text: &str, from: usize, terms: &Terminators) -> Option<Found> {
        [Rule::LineHeader, Rule::LooseHeader, Rule::RestOfLine]
            .into_iter()
            .find_map(|rule| {
                let found = self.apply(rule, text, from, terms)?;
                trace!(?rule, chars = found.value.chars().count(), "Rule matched");
                is_content(&found.value).then_some(found)
            })
    }

    fn apply(&self, rule: Rule, text: &str, from: usize, terms: &Terminators) -> Option<Found> {
        let (header, end) = match rule {
            Rule::LineHeader => {
                let m = self.line.find_at(text, from)?;
                let end = terms
                    .line
                    .find_at(text, m.end())
                    .map_or(text.len(), |t| t.start());
                (m, end)
            }
            Rule::LooseHeader => {
                let m = self.loose.find_at(text, from)?;
                let end = terms
                    .loose
                    .find_at(text, m.end())
                    .map_or(text.len(), |t| t.start());
                (m, end)
            }
            Rule::RestOfLine => {
                let m = self.loose.find_at(text, from)?;
                let end = text[m.end()..]
                    .find('\n')
                    .map_or(text.len(), |offset| m.end() + offset);
                (m, end)
            }
        };
        Some(Found {
            value: clean(&text[header.end()..end], &terms.trailing_rule),
            header_pos: header.start(),
        })
    }
}

/// Patterns that end a capture: any known header.
struct Terminators {
    line: Regex,
    loose: Regex,
    trailing_rule: Regex,
}

struct HeaderPatterns {
    /// Indexed by [`SummaryField::index`].
    fields: Vec<FieldPatterns>,
    aliases: FieldPatterns,
    terms: Terminators,
    paragraph_break: Regex,
    stray_header: Regex,
}

impl HeaderPatterns {
    fn compile() -> Result<Self, regex::Error> {
        let fields = SummaryField::ALL
            .iter()
            .map(|field| FieldPatterns::compile(&[field.header()]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut every_header: Vec<&str> = SummaryField::ALL.iter().map(|f| f.header()).collect();
        every_header.extend(INTERMEDIATE_OVERVIEW_ALIASES);

        Ok(Self {
            fields,
            aliases: FieldPatterns::compile(&INTERMEDIATE_OVERVIEW_ALIASES)?,
            terms: Terminators {
                line: Regex::new(&line_header_pattern(&every_header))?,
                loose: Regex::new(&loose_header_pattern(&every_header))?,
                trailing_rule: Regex::new(r"(?:\n[ \t]*[-*_=]{3,}[ \t]*)+\s*\z")?,
            },
            paragraph_break: Regex::new(r"\n[ \t]*\n")?,
            stray_header: Regex::new(&format!(
                r"\A[ \t]*{DECORATION}(?:[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+|(?i:(?:intermediate|advanced|technical|expert)[ \t_-]+(?:overview|description)))\**[ \t]*(?::\**)?\s*"
            ))?,
        })
    }

    fn extract(&self, text: &str) -> Option<SynthesisResult> {
        let mut fields: HashMap<SummaryField, String> = HashMap::new();
        let mut boundary = 0;

        for field in SummaryField::ALL {
            let found = match self.locate(&self.fields[field.index()], text, boundary) {
                Some(found) => found,
                None if field == SummaryField::IntermediateOverview => {
                    let recovered = self.recover_intermediate_overview(text, boundary)?;
                    if let Some(beginner) = recovered.beginner_overview {
                        fields.insert(SummaryField::BeginnerOverview, beginner);
                    }
                    recovered.found
                }
                None => {
                    debug!(field = field.key(), "Field could not be recovered");
                    return None;
                }
            };
            boundary = found.header_pos;
            fields.insert(field, found.value);
        }

        let result = SynthesisResult::from_fields(&fields);
        if result.is_none() {
            debug!("Extracted fields failed final validation");
        }
        result
    }

    /// Run the ladder from the left boundary, then over the whole text.
    fn locate(&self, patterns: &FieldPatterns, text: &str, boundary: usize) -> Option<Found> {
        patterns.ladder(text, boundary, &self.terms).or_else(|| {
            if boundary > 0 {
                patterns.ladder(text, 0, &self.terms)
            } else {
                None
            }
        })
    }

    fn recover_intermediate_overview(&self, text: &str, boundary: usize) -> Option<Recovered> {
        if let Some(found) = self.locate(&self.aliases, text, boundary) {
            if let Some(value) = self.strip_stray_header(&found.value) {
                debug!("Recovered intermediate overview from alternative header");
                return Some(Recovered {
                    found: Found {
                        value,
                        header_pos: found.header_pos,
                    },
                    beginner_overview: None,
                });
            }
        }

        let recovered = self.split_beginner_overview(text);
        if recovered.is_some() {
            debug!("Recovered intermediate overview from overview region");
        } else {
            debug!(
                field = SummaryField::IntermediateOverview.key(),
                "Field could not be recovered"
            );
        }
        recovered
    }

    /// Split the region between the beginner-overview and beginner-summary
    /// headers into a beginner paragraph and an intermediate remainder.
    fn split_beginner_overview(&self, text: &str) -> Option<Recovered> {
        let overview = &self.fields[SummaryField::BeginnerOverview.index()];
        let summary = &self.fields[SummaryField::BeginnerSummary.index()];

        let start = overview.line.find(text).or_else(|| overview.loose.find(text))?;
        let end = summary
            .line
            .find_at(text, start.end())
            .or_else(|| summary.loose.find_at(text, start.end()))?;

        let region = &text[start.end()..end.start()];
        let mut paragraphs: Vec<&str> = self
            .paragraph_break
            .split(region)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.len() < 2 {
            // No blank line between the two parts; fall back to line breaks.
            paragraphs = region
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
        }
        if paragraphs.len() < 2 {
            return None;
        }

        let value = self.strip_stray_header(&paragraphs[1..].join("\n\n"))?;
        Some(Recovered {
            found: Found {
                value,
                header_pos: start.start(),
            },
            beginner_overview: Some(paragraphs[0].to_string()),
        })
    }

    /// Drop a leading header-like token and re-check the length.
    fn strip_stray_header(&self, value: &str) -> Option<String> {
        let stripped = self.stray_header.replace(value, "");
        let stripped = stripped.trim();
        is_content(stripped).then(|| stripped.to_string())
    }
}

struct Recovered {
    found: Found,
    /// Replacement for the beginner overview when the region was split.
    beginner_overview: Option<String>,
}

/// Header words joined by any accepted separator, e.g. `BEGINNER[ \t_-]+TITLE`.
fn header_words(header: &str) -> String {
    header
        .split('_')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[ \t_-]+")
}

fn header_alternation(headers: &[&str]) -> String {
    headers
        .iter()
        .map(|h| header_words(h))
        .collect::<Vec<_>>()
        .join("|")
}

/// Header at the start of a line, followed by a colon. Emphasis closing
/// right after the colon (`**HEADER:**`) belongs to the header; emphasis
/// after whitespace belongs to the value.
fn line_header_pattern(headers: &[&str]) -> String {
    format!(
        r"(?im)^[ \t]*{DECORATION}(?:{})\b[ \t]*\**[ \t]*:\**[ \t]*",
        header_alternation(headers)
    )
}

/// Header anywhere, colon optional.
fn loose_header_pattern(headers: &[&str]) -> String {
    format!(
        r"(?i){DECORATION}\b(?:{})\b[ \t]*\**[ \t]*(?::\**)?[ \t]*",
        header_alternation(headers)
    )
}

fn clean(raw: &str, trailing_rule: &Regex) -> String {
    trailing_rule.replace(raw.trim(), "").trim().to_string()
}

fn is_content(value: &str) -> bool {
    value.trim().chars().count() >= MIN_FIELD_CHARS
}
