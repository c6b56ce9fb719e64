// SPDX-FileCopyrightText: 2026 Dealerline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instant-response classifier.
//!
//! Recognizes messages that are nothing but a greeting, a well-being
//! check-in or a thank-you, so the pipeline can answer them without an
//! agent call. Every pattern is anchored to the whole message: a greeting
//! followed by a real question is routed to the agent.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

const GREETING: &str = r"(?:oi+e?|ol[aá]|opa|eae|e a[ií]|hey|hello|salve)";
const TIME_OF_DAY: &str = r"(?:bom dia|boa tarde|boa noite)";
const WELL_BEING: &str = r"(?:tudo (?:bem|bom|certo|tranquilo|jo[ií]a|ok)|td (?:bem|bom)|tdb|como (?:vai|est[aá])(?: voc[eê])?|voc[eê] est[aá] bem|beleza|blz)";
const THANKS: &str = r"(?:(?:muito )?obrigad[oa]|valeu|vlw|agrade[cç]o)";
const SEP: &str = r"[\s,!.]+";
const TAIL: &str = r"[\s!.?,]*";

/// Part of the day named by a time-of-day greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    fn from_phrase(phrase: &str) -> Self {
        if phrase.ends_with("dia") {
            Self::Morning
        } else if phrase.ends_with("tarde") {
            Self::Afternoon
        } else {
            Self::Evening
        }
    }
}

/// The kind of trivial message recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Greeting followed by a well-being check-in ("oi, tudo bem?").
    GreetingWithWellBeing,
    Greeting,
    TimeOfDayGreeting(DayPeriod),
    WellBeing,
    Thanks,
}

impl ResponseKind {
    /// The canned reply sent for this kind.
    pub fn reply(&self) -> &'static str {
        match self {
            Self::GreetingWithWellBeing => {
                "Olá! Tudo ótimo por aqui, obrigado por perguntar. Como posso ajudar você hoje?"
            }
            Self::Greeting => "Olá! Como posso ajudar você hoje?",
            Self::TimeOfDayGreeting(DayPeriod::Morning) => "Bom dia! Como posso ajudar você hoje?",
            Self::TimeOfDayGreeting(DayPeriod::Afternoon) => {
                "Boa tarde! Como posso ajudar você hoje?"
            }
            Self::TimeOfDayGreeting(DayPeriod::Evening) => {
                "Boa noite! Como posso ajudar você hoje?"
            }
            Self::WellBeing => "Tudo ótimo por aqui, obrigado! Em que posso ajudar?",
            Self::Thanks => "Por nada! Se precisar de mais alguma coisa, é só chamar.",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GreetingWithWellBeing => write!(f, "greeting_with_well_being"),
            Self::Greeting => write!(f, "greeting"),
            Self::TimeOfDayGreeting(_) => write!(f, "time_of_day_greeting"),
            Self::WellBeing => write!(f, "well_being"),
            Self::Thanks => write!(f, "thanks"),
        }
    }
}

enum Group {
    GreetingWithWellBeing,
    Greeting,
    TimeOfDay,
    WellBeing,
    Thanks,
}

/// Ordered pattern groups; the first match wins.
static PATTERNS: LazyLock<Vec<(Group, Regex)>> = LazyLock::new(|| {
    let opener = format!("(?:{GREETING}|{TIME_OF_DAY})(?:{SEP}{GREETING})?");
    vec![
        (
            Group::GreetingWithWellBeing,
            format!("^{opener}{SEP}{WELL_BEING}{TAIL}$"),
        ),
        (
            Group::Greeting,
            format!("^{GREETING}(?:{SEP}{GREETING})*{TAIL}$"),
        ),
        (
            Group::TimeOfDay,
            format!("^(?:{GREETING}{SEP})?(?P<period>{TIME_OF_DAY}){TAIL}$"),
        ),
        (Group::WellBeing, format!("^{WELL_BEING}{TAIL}$")),
        (Group::Thanks, format!("^{THANKS}(?:{SEP}{THANKS})*{TAIL}$")),
    ]
    .into_iter()
    .map(|(group, pattern)| {
        let regex = Regex::new(&pattern).expect("classifier pattern must compile");
        (group, regex)
    })
    .collect()
});

/// Classifies `text` as a trivial message, or `None` when it needs the agent.
pub fn classify(text: &str) -> Option<ResponseKind> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    PATTERNS.iter().find_map(|(group, regex)| {
        let captures = regex.captures(&normalized)?;
        Some(match group {
            Group::GreetingWithWellBeing => ResponseKind::GreetingWithWellBeing,
            Group::Greeting => ResponseKind::Greeting,
            Group::TimeOfDay => {
                let phrase = captures.name("period").map_or("", |m| m.as_str());
                ResponseKind::TimeOfDayGreeting(DayPeriod::from_phrase(phrase))
            }
            Group::WellBeing => ResponseKind::WellBeing,
            Group::Thanks => ResponseKind::Thanks,
        })
    })
}
