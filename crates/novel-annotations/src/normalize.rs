//! Normalization passes applied to raw chapter text before scanning.
//!
//! The content generator has emitted several markup variants over time. Each
//! known variant gets its own pure pass; [`Pipeline`] runs them in order:
//!
//! 1. [`UnwrapBacktickMarkers`]: `` `{w|m}` `` → `{w|m}`
//! 2. [`CollapseRedundantBold`]: `**m** {w|m}` → `{w|m}`
//! 3. [`StripStrayBold`]: `**text**` → `text` (skipped under [`BoldPolicy::Keep`])

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::meaning::clean_meaning;

static BACKTICK_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`(\{[^|]+\|[^}]+\})`").unwrap());

// Backticks only count as a wrapper when they close on the same half.
static BOLD_THEN_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?:`\*\*(?P<tb>[^*]+)\*\*`|\*\*(?P<b>[^*]+)\*\*)\s*",
        r"(?:`(?P<tm>\{[^|]+\|(?P<tg>[^}]+)\})`|(?P<m>\{[^|]+\|(?P<g>[^}]+)\}))",
    ))
    .unwrap()
});

pub(crate) static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());

/// What happens to bold spans that are not a duplicate of the next gloss.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoldPolicy {
    /// Replace `**text**` with `text`.
    #[default]
    Strip,
    /// Keep the span so it is emitted as a `Bold` segment.
    Keep,
}

/// A single `&str -> &str` rewrite. Borrowed output means "nothing changed".
pub trait NormalizePass: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnwrapBacktickMarkers;

impl NormalizePass for UnwrapBacktickMarkers {
    fn name(&self) -> &'static str {
        "unwrap-backtick-markers"
    }

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains('`') {
            return Cow::Borrowed(input);
        }
        BACKTICK_MARKER.replace_all(input, "$1")
    }
}

/// Removes a bold span that only restates the gloss of the marker right after it.
///
/// Whitespace between the two is dropped along with the bold span, and so
/// are stray backticks around either half. The comparison accepts the raw
/// trimmed meaning or its cleaned form.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollapseRedundantBold;

impl NormalizePass for CollapseRedundantBold {
    fn name(&self) -> &'static str {
        "collapse-redundant-bold"
    }

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains("**") {
            return Cow::Borrowed(input);
        }
        BOLD_THEN_MARKER.replace_all(input, |caps: &Captures<'_>| {
            let pick = |a: &str, b: &str| caps.name(a).or_else(|| caps.name(b)).map(|m| m.as_str());
            let (Some(bold), Some(marker), Some(meaning)) =
                (pick("tb", "b"), pick("tm", "m"), pick("tg", "g"))
            else {
                return caps[0].to_string();
            };
            let (bold, meaning) = (bold.trim(), meaning.trim());
            if bold == meaning || bold == clean_meaning(meaning) {
                marker.to_string()
            } else {
                caps[0].to_string()
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StripStrayBold;

impl NormalizePass for StripStrayBold {
    fn name(&self) -> &'static str {
        "strip-stray-bold"
    }

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains("**") {
            return Cow::Borrowed(input);
        }
        BOLD.replace_all(input, "$1")
    }
}

/// Ordered list of passes.
pub struct Pipeline {
    passes: Vec<Box<dyn NormalizePass>>,
}

impl Pipeline {
    /// The current content policy: unwrap, collapse, then strip or keep bold.
    pub fn standard(policy: BoldPolicy) -> Self {
        let mut passes: Vec<Box<dyn NormalizePass>> =
            vec![Box::new(UnwrapBacktickMarkers), Box::new(CollapseRedundantBold)];
        if policy == BoldPolicy::Strip {
            passes.push(Box::new(StripStrayBold));
        }
        Self { passes }
    }

    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn then(mut self, pass: impl NormalizePass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(input);
        for pass in &self.passes {
            let next = match pass.apply(&current) {
                Cow::Borrowed(_) => None,
                Cow::Owned(changed) => Some(changed),
            };
            if let Some(changed) = next {
                tracing::trace!(pass = pass.name(), "normalization rewrote content");
                current = Cow::Owned(changed);
            }
        }
        current
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard(BoldPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_backticked_marker() {
        let pass = UnwrapBacktickMarkers;
        assert_eq!(pass.apply("`{cat|猫}`"), "{cat|猫}");
        assert_eq!(pass.apply("a `{cat|猫}` b `code`"), "a {cat|猫} b `code`");
        assert!(matches!(pass.apply("no ticks {cat|猫}"), Cow::Borrowed(_)));
    }

    #[test]
    fn collapses_bold_restating_the_gloss() {
        let pass = CollapseRedundantBold;
        assert_eq!(pass.apply("**狗** {dog|狗}"), "{dog|狗}");
        assert_eq!(pass.apply("她很**有野心的**`{ambitious|有野心的}`。"), "她很{ambitious|有野心的}。");
        assert_eq!(
            pass.apply("**精心制作的**\n{elaborate|elaborate (精心制作的)}"),
            "{elaborate|elaborate (精心制作的)}"
        );
    }

    #[test]
    fn leaves_unpaired_backticks_in_the_prose() {
        let pass = CollapseRedundantBold;
        assert_eq!(pass.apply("see `code`**狗** {dog|狗} end"), "see `code`{dog|狗} end");
        assert_eq!(pass.apply("**狗** {dog|狗}`x` end"), "{dog|狗}`x` end");
        assert_eq!(pass.apply("`**狗**` `{dog|狗}`"), "{dog|狗}");
    }

    #[test]
    fn keeps_bold_with_different_text() {
        let pass = CollapseRedundantBold;
        assert_eq!(pass.apply("**注意** {dog|狗}"), "**注意** {dog|狗}");
    }

    #[test]
    fn strips_stray_bold() {
        let pass = StripStrayBold;
        assert_eq!(pass.apply("a **b** c **d {x|y}**"), "a b c d {x|y}");
        assert_eq!(pass.apply("unterminated **bold"), "unterminated **bold");
    }

    #[test]
    fn pipeline_order_depends_on_policy() {
        assert_eq!(
            Pipeline::standard(BoldPolicy::Strip).pass_names(),
            vec!["unwrap-backtick-markers", "collapse-redundant-bold", "strip-stray-bold"]
        );
        assert_eq!(Pipeline::standard(BoldPolicy::Keep).pass_names().len(), 2);
        assert_eq!(
            Pipeline::standard(BoldPolicy::Keep).run("**hi** `{cat|猫}`"),
            "**hi** {cat|猫}"
        );
    }

    #[test]
    fn unchanged_input_stays_borrowed() {
        let pipeline = Pipeline::default();
        assert!(matches!(pipeline.run("plain prose"), Cow::Borrowed(_)));
    }
}
