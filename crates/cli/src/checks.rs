//! Built-in battery of example questions for `codecall check`.

use std::io::Write;

use runtime::{App, LlmBackend};

/// One condition an answer must meet.
#[derive(Debug, Clone, Copy)]
pub enum Expect {
    /// Contains the text exactly.
    Contains(&'static str),
    /// Contains at least one of the texts exactly.
    AnyOf(&'static [&'static str]),
    /// Contains at least one of the texts, ignoring case.
    AnyOfIgnoreCase(&'static [&'static str]),
}

impl Expect {
    fn holds(self, answer: &str) -> bool {
        match self {
            Self::Contains(text) => answer.contains(text),
            Self::AnyOf(texts) => texts.iter().any(|t| answer.contains(t)),
            Self::AnyOfIgnoreCase(texts) => {
                let lower = answer.to_lowercase();
                texts.iter().any(|t| lower.contains(&t.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Check {
    pub name: &'static str,
    pub question: &'static str,
    pub expect: &'static [Expect],
}

impl Check {
    /// An answer passes when it is non-empty and meets every expectation.
    pub fn passes(&self, answer: &str) -> bool {
        !answer.is_empty() && self.expect.iter().all(|e| e.holds(answer))
    }
}

const LOCATION_NAMES: &[&str] = &["King County", "Washington"];

pub const CHECKS: &[Check] = &[
    Check {
        name: "knowledge",
        question: "what is the capital of Indonesia?",
        expect: &[Expect::Contains("Jakarta")],
    },
    Check {
        name: "single tool",
        question: "what state am I in?",
        expect: &[Expect::Contains("Washington")],
    },
    Check {
        name: "chained tools",
        question: "what is the temperature outside?",
        expect: &[
            Expect::Contains("°F"),
            Expect::AnyOfIgnoreCase(&["temperature", "degrees"]),
        ],
    },
    Check {
        name: "reasoning",
        question: "what should I wear today?",
        expect: &[
            Expect::AnyOf(LOCATION_NAMES),
            Expect::AnyOfIgnoreCase(&[
                "wear",
                "clothing",
                "shirt",
                "jacket",
                "temperature",
                "rain",
                "outfit",
            ]),
        ],
    },
    Check {
        name: "impossible",
        question: "what do I have in my pocket?",
        expect: &[Expect::AnyOfIgnoreCase(&[
            "don't",
            "can't",
            "unable",
            "don't have",
            "no access",
            "sorry",
        ])],
    },
    Check {
        name: "weather",
        question: "is it going to rain today?",
        expect: &[
            Expect::AnyOf(LOCATION_NAMES),
            Expect::AnyOfIgnoreCase(&["rain", "precipitation", "%"]),
        ],
    },
    Check {
        name: "location",
        question: "where am I located?",
        expect: &[Expect::Contains("King County"), Expect::Contains("Washington")],
    },
];

/// Ask every check's question and print PASS or FAIL per check.
///
/// Returns the number of failed checks.
pub fn run<B: LlmBackend>(app: &App<B>, checks: &[Check], out: &mut impl Write) -> std::io::Result<usize> {
    let mut failed = 0;
    for check in checks {
        match app.answer(check.question) {
            Ok(answer) if check.passes(&answer) => {
                writeln!(out, "PASS  {}: {answer}", check.name)?;
            }
            Ok(answer) => {
                failed += 1;
                writeln!(out, "FAIL  {}: {answer}", check.name)?;
            }
            Err(e) => {
                failed += 1;
                writeln!(out, "FAIL  {}: Error: {e}", check.name)?;
            }
        }
    }
    writeln!(out, "{} passed, {failed} failed", checks.len() - failed)?;
    Ok(failed)
}
