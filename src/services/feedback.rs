//! Feedback composition for scored responses.
//!
//! Pure text assembly: encouragement keyed by score band, per-trick tips and
//! improvement suggestions, and a next-step line. The analysis itself comes
//! from the scoring oracle.

use serde::Serialize;

use crate::services::scoring::ResponseAnalysis;
use crate::services::trick_catalog::LanguageTrick;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub analysis: ResponseAnalysis,
    pub encouragement: String,
    pub examples: Vec<String>,
    pub tips: Vec<String>,
    pub next_steps: String,
}

pub const GENERAL_TIPS: [&str; 3] = [
    "Say the reframe out loud; spoken phrasing exposes weak spots",
    "Aim the reframe at the belief, not at the person holding it",
    "One precise sentence beats three vague ones",
];

pub fn encouragement(score: f64, attempt_number: i32, trick_name: &str) -> String {
    if attempt_number == 1 {
        return if score >= 70.0 {
            format!("Great start with '{trick_name}'!")
        } else {
            format!("First try at '{trick_name}' - keep practicing!")
        };
    }

    if score >= 80.0 {
        format!("Excellent! You handle '{trick_name}' with real skill!")
    } else if score >= 60.0 {
        format!("Good work! '{trick_name}' is getting sharper every attempt!")
    } else if score >= 40.0 {
        format!("Progress! Keep exploring '{trick_name}'!")
    } else {
        format!("Don't give up - every attempt brings '{trick_name}' closer!")
    }
}

pub fn next_steps(score: f64) -> String {
    if score >= 80.0 {
        "Move on to the next technique or try a harder statement.".to_string()
    } else if score >= 50.0 {
        String::new()
    } else {
        "Review the definition and examples, then try again.".to_string()
    }
}

pub fn trick_tip(trick_id: i32) -> &'static str {
    match trick_id {
        1 => "Focus on what the speaker actually wants or intends",
        2 => "Swap the loaded word for a synonym with a different shade",
        3 => "Point at what follows from acting - or from not acting",
        4 => "Split the sweeping claim into concrete pieces",
        5 => "Lift the claim into a broader pattern or tendency",
        6 => "Reach for a vivid comparison or metaphor",
        7 => "Cite a different viewpoint, authority, or piece of research",
        8 => "Ask where the belief comes from and how it was verified",
        9 => "Name what actually matters most in the situation",
        10 => "Stretch or shrink the time or people frame",
        11 => "Find an unexpected positive outcome of the same facts",
        12 => "Offer an exception that breaks the rule",
        13 => "Evaluate the belief itself as a belief",
        14 => "Turn the statement's own standard back on itself",
        _ => "Study the technique's reference examples",
    }
}

pub fn tips_for(trick_id: i32) -> Vec<String> {
    let mut tips = vec![trick_tip(trick_id).to_string()];
    tips.extend(GENERAL_TIPS.iter().take(2).map(|t| t.to_string()));
    tips
}

/// Up to 3 concrete improvement suggestions for a response.
pub fn suggest_improvements(response: &str, trick: &LanguageTrick) -> Vec<String> {
    let mut improvements = Vec::new();
    let response_lower = response.to_lowercase();

    if response.chars().count() < 10 {
        improvements.push("Expand the reply into a full reframing sentence".to_string());
    }

    let keyword_found = trick
        .keywords
        .iter()
        .any(|k| response_lower.contains(&k.to_lowercase()));
    if !keyword_found {
        let hint: Vec<&str> = trick.keywords.iter().take(3).map(String::as_str).collect();
        improvements.push(format!(
            "Work in keywords of this technique: {}",
            hint.join(", ")
        ));
    }

    improvements.push(trick_tip(trick.id).to_string());
    improvements.truncate(3);
    improvements
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_trick() -> LanguageTrick {
        LanguageTrick {
            id: 6,
            name: "Analogy".to_string(),
            definition: "Offer an analogy".to_string(),
            keywords: vec!["it's like".to_string(), "imagine".to_string()],
            examples: HashMap::new(),
        }
    }

    #[test]
    fn first_attempt_has_its_own_banding() {
        let high = encouragement(75.0, 1, "Analogy");
        let low = encouragement(30.0, 1, "Analogy");
        assert!(high.contains("Great start"));
        assert!(low.contains("First try"));
    }

    #[test]
    fn later_attempts_band_by_score() {
        assert!(encouragement(85.0, 3, "Analogy").contains("Excellent"));
        assert!(encouragement(65.0, 3, "Analogy").contains("Good work"));
        assert!(encouragement(45.0, 3, "Analogy").contains("Progress"));
        assert!(encouragement(10.0, 3, "Analogy").contains("Don't give up"));
    }

    #[test]
    fn next_steps_is_empty_in_the_middle_band() {
        assert!(!next_steps(85.0).is_empty());
        assert!(next_steps(60.0).is_empty());
        assert!(!next_steps(20.0).is_empty());
    }

    #[test]
    fn every_trick_has_a_specific_tip() {
        for id in 1..=14 {
            assert_ne!(trick_tip(id), trick_tip(0), "trick {id} uses the default tip");
        }
    }

    #[test]
    fn improvements_flag_missing_keywords() {
        let trick = sample_trick();
        let improvements = suggest_improvements("a long reply without the phrases", &trick);
        assert!(improvements.iter().any(|i| i.contains("keywords")));
    }

    #[test]
    fn improvements_are_capped_at_three() {
        let trick = sample_trick();
        let improvements = suggest_improvements("short", &trick);
        assert!(improvements.len() <= 3);
    }
}
