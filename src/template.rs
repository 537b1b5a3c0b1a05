//! Key and field templates with style detection.
//!
//! The configuration surface accepts three substitution styles, detected
//! once when the template is compiled and never re-sniffed per event:
//!
//! - percent: `%(asctime)s%(msecs)03d-%(rowno)02d`
//! - brace:   `{levelname} {message}`
//! - shell:   `$hostname` or `${hostname}`
//!
//! Percent-style placeholders accept a zero-padded width (`%(rowno)02d`);
//! the other styles substitute verbatim. A compiled template is a flat
//! list of literal and field segments, so rendering is a single pass with
//! no parsing at event time.

use regex::Regex;
use snafu::prelude::*;
use std::sync::LazyLock;

use crate::error::{
    EmptyTemplateSnafu, MissingFieldReferenceSnafu, TemplateError, UnclosedPlaceholderSnafu,
    UnknownFieldSnafu,
};

/// Substitution style of a template, resolved at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStyle {
    /// `%(field)s` with optional zero-padded width.
    Percent,
    /// `{field}`.
    Brace,
    /// `$field` or `${field}`.
    Shell,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field { name: String, pad: usize },
}

/// A compiled substitution template.
#[derive(Debug, Clone)]
pub struct Template {
    raw: String,
    style: TemplateStyle,
    segments: Vec<Segment>,
}

/// `%%` escape, or `%(field)` followed by an optional width and a `s`/`d`
/// conversion.
static PERCENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%\(([A-Za-z_][A-Za-z0-9_]*)\)(\d*)[sd]").expect("Invalid regex pattern")
});

/// `{{`/`}}` escapes or `{field}`.
static BRACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid regex pattern")
});

/// `$$` escape, `${field}` or `$field`.
static SHELL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("Invalid regex pattern")
});

impl Template {
    /// Compile a template, sniffing its substitution style.
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if raw.is_empty() {
            return EmptyTemplateSnafu.fail();
        }

        let style = sniff_style(raw);
        let (pattern, opening): (&Regex, &str) = match style {
            TemplateStyle::Percent => (&PERCENT_PATTERN, "%("),
            TemplateStyle::Brace => (&BRACE_PATTERN, "{"),
            TemplateStyle::Shell => (&SHELL_PATTERN, "$"),
        };

        let mut segments = Vec::new();
        let mut last = 0;
        // Opening tokens surviving in unmatched text are placeholders the
        // pattern could not close. Escape-produced literals are exempt.
        let mut dangling = false;
        for caps in pattern.captures_iter(raw) {
            let whole = caps.get(0).unwrap();
            if whole.start() > last {
                let text = &raw[last..whole.start()];
                dangling |= text.contains(opening);
                push_literal(&mut segments, text);
            }
            last = whole.end();

            let field = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| m.as_str().to_string());
            match field {
                Some(name) => {
                    let pad = match style {
                        TemplateStyle::Percent => caps
                            .get(2)
                            .map(|m| m.as_str())
                            .filter(|width| width.starts_with('0'))
                            .and_then(|width| width.parse().ok())
                            .unwrap_or(0),
                        _ => 0,
                    };
                    segments.push(Segment::Field { name, pad });
                }
                // Escape sequence: emit the literal half of the pair.
                None => push_literal(&mut segments, &whole.as_str()[..1]),
            }
        }
        if last < raw.len() {
            let text = &raw[last..];
            dangling |= text.contains(opening);
            push_literal(&mut segments, text);
        }
        if dangling {
            return UnclosedPlaceholderSnafu { template: raw }.fail();
        }

        Ok(Self {
            raw: raw.to_string(),
            style,
            segments,
        })
    }

    /// The detected substitution style.
    pub fn style(&self) -> TemplateStyle {
        self.style
    }

    /// The original template text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Field names referenced by the template, in order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// The first referenced field; this names the entity column an
    /// extra-field spec projects into.
    pub fn first_field(&self) -> Result<&str, TemplateError> {
        self.fields().next().context(MissingFieldReferenceSnafu {
            template: self.raw.clone(),
        })
    }

    /// Fail-fast check that every referenced field is resolvable.
    pub fn validate(&self, known: impl Fn(&str) -> bool) -> Result<(), TemplateError> {
        for field in self.fields() {
            ensure!(known(field), UnknownFieldSnafu { field });
        }
        Ok(())
    }

    /// Render against a field resolver.
    pub fn render(
        &self,
        resolve: impl Fn(&str) -> Option<String>,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, pad } => {
                    let value =
                        resolve(name).context(UnknownFieldSnafu { field: name.clone() })?;
                    if value.len() < *pad {
                        for _ in 0..(*pad - value.len()) {
                            out.push('0');
                        }
                    }
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) {
    if let Some(Segment::Literal(existing)) = segments.last_mut() {
        existing.push_str(text);
    } else {
        segments.push(Segment::Literal(text.to_string()));
    }
}

/// Pick a substitution style from the template text. Percent placeholders
/// are unambiguous; `$` wins over `{` so that `${field}` parses as shell
/// style. Templates with no placeholders compile to a single literal.
fn sniff_style(raw: &str) -> TemplateStyle {
    if raw.contains("%(") {
        TemplateStyle::Percent
    } else if raw.contains('$') {
        TemplateStyle::Shell
    } else if raw.contains('{') {
        TemplateStyle::Brace
    } else {
        TemplateStyle::Percent
    }
}
