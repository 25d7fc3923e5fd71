//! Built-in instruction templates and their fidelity levels.
//!
//! A template family names one semantic check ("the text is about X");
//! [`Template::instructions`] renders the literal instruction text for a
//! chosen [`Fidelity`]. Higher fidelity spends more prompt tokens on
//! criteria and edge-case guidance for the same check.
//!
//! Wording is deliberately not part of any contract and may be tuned
//! between releases. Callers that need exact prompts should pass their
//! own instruction text through
//! [`CheckOptions::new`](crate::CheckOptions::new) instead.
//!
//! Because families and fidelity levels are both closed enums, an
//! unsupported combination is unrepresentable; there is no runtime
//! "unknown variant" path to defend.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// System preamble used when a backend registers no preamble of its own.
///
/// Establishes the judge role and the structured reply shape. Backends
/// also receive the reply schema as a structured-output hint, so this
/// text is reinforcement, not the only line of defense.
pub const DEFAULT_PREAMBLE: &str = "\
You are a strict validation judge. You receive one instruction describing a \
property, then a subject text. Decide whether the subject text satisfies the \
property. Judge only the stated property; do not invent extra criteria.

Respond with a single JSON object and nothing else:
{\"verdict\": true or false, \"reason\": \"short explanation, required when verdict is false\", \"confidence\": number between 0.0 and 1.0}";

/// Fidelity level of a rendered template.
///
/// Ordered `Fast < Balanced < Accurate`: each level spends more tokens
/// on more detailed instructions for the same semantic check. The
/// ordering is a cost convention, not a behavioral guarantee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fidelity {
    /// One-line instruction; cheapest and fastest.
    Fast,

    /// Instruction plus judging criteria.
    #[default]
    Balanced,

    /// Full rubric with edge-case guidance; most expensive.
    Accurate,
}

impl Fidelity {
    /// All levels, cheapest first.
    pub const ALL: [Fidelity; 3] = [Fidelity::Fast, Fidelity::Balanced, Fidelity::Accurate];

    /// Stable lowercase name, e.g. for logs and CLI flags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Fidelity::Fast => "fast",
            Fidelity::Balanced => "balanced",
            Fidelity::Accurate => "accurate",
        }
    }
}

impl fmt::Display for Fidelity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fidelity name that matched no level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown fidelity '{0}' (expected fast, balanced, or accurate)")]
pub struct UnknownFidelity(pub String);

impl FromStr for Fidelity {
    type Err = UnknownFidelity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Fidelity::Fast),
            "balanced" => Ok(Fidelity::Balanced),
            "accurate" => Ok(Fidelity::Accurate),
            other => Err(UnknownFidelity(other.to_string())),
        }
    }
}

/// Built-in template families.
///
/// Single-argument families borrow their argument; the rendered
/// instruction text owns a copy, so the template itself never outlives
/// a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template<'a> {
    /// The subject must be about the given topic.
    OnTopic(&'a str),

    /// The subject must read in the given tone, e.g. "formal".
    Tone(&'a str),

    /// The subject must be internally coherent prose.
    Coherent,

    /// The subject must be safe to show a general audience.
    SafeForAudience,
}

impl Template<'_> {
    /// Stable family tag for logs and CLI listings.
    pub fn family(&self) -> &'static str {
        match self {
            Template::OnTopic(_) => "on-topic",
            Template::Tone(_) => "tone",
            Template::Coherent => "coherent",
            Template::SafeForAudience => "safe-for-audience",
        }
    }

    /// Render the instruction text for this family at a fidelity level.
    pub fn instructions(&self, fidelity: Fidelity) -> String {
        match (self, fidelity) {
            (Template::OnTopic(topic), Fidelity::Fast) => {
                format!("The text must be about {topic}.")
            }
            (Template::OnTopic(topic), Fidelity::Balanced) => format!(
                "Judge whether the text is about {topic}. The topic must be the \
                 subject matter of the text, not a passing mention."
            ),
            (Template::OnTopic(topic), Fidelity::Accurate) => format!(
                "Judge whether the text is about {topic}.\n\
                 Satisfied when: {topic} is the main subject matter, most of the \
                 text relates to it, and a reader would summarize the text as \
                 being about {topic}.\n\
                 Not satisfied when: {topic} appears only in passing, only as an \
                 example or comparison, or not at all.\n\
                 Ignore spelling, grammar, and writing quality; judge subject \
                 matter only."
            ),

            (Template::Tone(tone), Fidelity::Fast) => {
                format!("The text must be written in a {tone} tone.")
            }
            (Template::Tone(tone), Fidelity::Balanced) => format!(
                "Judge whether the text consistently reads in a {tone} tone. \
                 Neutral sentences are acceptable; passages contradicting that \
                 tone are not."
            ),
            (Template::Tone(tone), Fidelity::Accurate) => format!(
                "Judge whether the text is written in a {tone} tone.\n\
                 Satisfied when: word choice, phrasing, and register are {tone} \
                 throughout, allowing for neutral connective sentences.\n\
                 Not satisfied when: any passage adopts a tone that a careful \
                 reader would call incompatible with {tone}, even if the rest \
                 complies.\n\
                 Judge tone only; ignore whether the content itself is correct \
                 or complete."
            ),

            (Template::Coherent, Fidelity::Fast) => "The text must be coherent.".to_string(),
            (Template::Coherent, Fidelity::Balanced) => {
                "Judge whether the text is coherent: sentences follow from one \
                 another and no statement contradicts an earlier one."
                    .to_string()
            }
            (Template::Coherent, Fidelity::Accurate) => {
                "Judge whether the text is coherent.\n\
                 Satisfied when: the text has a discernible thread, each sentence \
                 connects to its neighbors, and no statement contradicts an \
                 earlier one.\n\
                 Not satisfied when: sentences are unrelated to each other, the \
                 text contradicts itself, or passages read as randomly assembled.\n\
                 Short texts of a single sentence are coherent unless \
                 self-contradictory."
                    .to_string()
            }

            (Template::SafeForAudience, Fidelity::Fast) => {
                "The text must be safe for a general audience.".to_string()
            }
            (Template::SafeForAudience, Fidelity::Balanced) => {
                "Judge whether the text is safe to show a general audience: no \
                 graphic violence, sexual content, slurs, or instructions for \
                 causing harm."
                    .to_string()
            }
            (Template::SafeForAudience, Fidelity::Accurate) => {
                "Judge whether the text is safe to show a general audience.\n\
                 Satisfied when: the text contains no graphic violence, no sexual \
                 content, no slurs or demeaning language about groups, and no \
                 instructions for causing harm.\n\
                 Not satisfied when: any passage fails one of those conditions, \
                 even quoted or fictional passages.\n\
                 Clinical or educational mentions of sensitive topics are \
                 acceptable; gratuitous detail is not."
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fidelity_round_trips_through_names() {
        for level in Fidelity::ALL {
            assert_eq!(level.as_str().parse::<Fidelity>().unwrap(), level);
        }
    }

    #[test]
    fn test_unknown_fidelity_name_is_rejected() {
        let err = "turbo".parse::<Fidelity>().unwrap_err();
        assert_eq!(err, UnknownFidelity("turbo".to_string()));
        assert!(err.to_string().contains("balanced"));
    }

    #[test]
    fn test_fidelity_ordering_is_cheapest_first() {
        assert!(Fidelity::Fast < Fidelity::Balanced);
        assert!(Fidelity::Balanced < Fidelity::Accurate);
    }

    #[test]
    fn test_every_family_renders_at_every_fidelity() {
        let families = [
            Template::OnTopic("dogs"),
            Template::Tone("formal"),
            Template::Coherent,
            Template::SafeForAudience,
        ];

        for family in families {
            for level in Fidelity::ALL {
                assert!(!family.instructions(level).is_empty());
            }
        }
    }

    #[test]
    fn test_fidelity_levels_render_distinct_text() {
        let template = Template::OnTopic("dogs");
        let fast = template.instructions(Fidelity::Fast);
        let balanced = template.instructions(Fidelity::Balanced);
        let accurate = template.instructions(Fidelity::Accurate);

        assert_ne!(fast, balanced);
        assert_ne!(balanced, accurate);
        assert!(fast.len() < accurate.len());
    }

    #[test]
    fn test_argument_appears_at_every_fidelity() {
        for level in Fidelity::ALL {
            assert!(Template::OnTopic("llamas").instructions(level).contains("llamas"));
            assert!(Template::Tone("playful").instructions(level).contains("playful"));
        }
    }

    #[test]
    fn test_family_tags_are_stable() {
        assert_eq!(Template::OnTopic("x").family(), "on-topic");
        assert_eq!(Template::Tone("x").family(), "tone");
        assert_eq!(Template::Coherent.family(), "coherent");
        assert_eq!(Template::SafeForAudience.family(), "safe-for-audience");
    }

    #[test]
    fn test_default_preamble_names_the_reply_shape() {
        assert!(DEFAULT_PREAMBLE.contains("verdict"));
        assert!(DEFAULT_PREAMBLE.contains("confidence"));
    }
}
