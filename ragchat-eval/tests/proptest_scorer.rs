//! Property-based tests for the quality scorer.

use proptest::prelude::*;
use ragchat_eval::scorer::{QualityScorer, ScorerConfig, conciseness_score};

fn scorer() -> QualityScorer {
    QualityScorer::new(ScorerConfig::default()).unwrap()
}

proptest! {
    #[test]
    fn scores_stay_in_unit_range(answer in ".{0,300}", query in ".{0,80}") {
        let verdict = scorer().score(&answer, &query);
        for (name, value) in verdict.sub_scores.named() {
            prop_assert!((0.0..=1.0).contains(&value), "{} = {}", name, value);
        }
        prop_assert!((0.0..=1.0).contains(&verdict.overall_score));
    }

    #[test]
    fn scoring_is_deterministic(answer in ".{0,200}", query in ".{0,60}") {
        let s = scorer();
        prop_assert_eq!(s.score(&answer, &query), s.score(&answer, &query));
    }

    #[test]
    fn whitespace_answers_always_fail(answer in "[ \t\n]{0,20}", query in ".{0,40}") {
        let verdict = scorer().score(&answer, &query);
        prop_assert!(!verdict.passes);
        prop_assert_eq!(verdict.overall_score, 0.0);
        prop_assert_eq!(verdict.reason.as_str(), "Empty response");
    }

    #[test]
    fn pass_matches_threshold(answer in "[a-z ]{1,200}", query in "[a-z ]{0,40}") {
        let verdict = scorer().score(&answer, &query);
        if !answer.trim().is_empty() {
            prop_assert_eq!(verdict.passes, verdict.overall_score >= 0.6);
        }
    }

    #[test]
    fn repeating_a_word_lowers_conciseness(word in "[a-z]{1,8}", n in 2usize..20) {
        let answer = vec![word.as_str(); n].join(" ");
        prop_assert!(conciseness_score(&answer) <= 0.5);
    }
}
