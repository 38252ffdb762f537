use oeannotator_core::filter::{find_tokens, is_incomplete, statistics};
use oeannotator_core::{
    AnnotationInput, AnnotationStore, FieldMemory, PartOfSpeech, PosFilter, Project, TokenFilter,
};

fn annotated() -> Project {
    let mut project = Project::from_text(
        "Beowulf",
        "Hwæt we Gardena in geardagum. Þeodcyninga þrym gefrunon.",
    );
    let mut store = AnnotationStore::new(FieldMemory::new());
    let sentence = &mut project.sentences[0];
    store
        .apply(
            &mut sentence.tokens[0],
            &AnnotationInput::new(PartOfSpeech::Interjection),
        )
        .unwrap();
    store
        .apply(
            &mut sentence.tokens[2],
            &AnnotationInput::new(PartOfSpeech::Noun)
                .set("gender", "m")
                .set("number", "pl")
                .set("case", "gen")
                .with_confidence(90),
        )
        .unwrap();
    store
        .apply(
            &mut sentence.tokens[3],
            &AnnotationInput::new(PartOfSpeech::Preposition).with_uncertain(true),
        )
        .unwrap();
    let sentence = &mut project.sentences[1];
    store
        .apply(
            &mut sentence.tokens[2],
            &AnnotationInput::new(PartOfSpeech::Verb)
                .set("tense", "past")
                .with_todo(true)
                .with_confidence(40),
        )
        .unwrap();
    sentence.tokens[2].annotation.alternatives = Some("pres. pl.".to_string());
    project
}

fn positions(project: &Project, filter: &TokenFilter) -> Vec<(usize, usize)> {
    find_tokens(project, filter)
        .iter()
        .map(|found| (found.sentence, found.token))
        .collect()
}

#[test]
fn pos_filter_distinguishes_all_any_and_one() {
    let project = annotated();

    assert_eq!(positions(&project, &TokenFilter::default()).len(), 8);
    assert_eq!(
        positions(
            &project,
            &TokenFilter {
                pos: PosFilter::Any,
                ..TokenFilter::default()
            }
        ),
        vec![(0, 0), (0, 2), (0, 3), (1, 2)]
    );
    let nouns = find_tokens(
        &project,
        &TokenFilter {
            pos: PosFilter::Only(PartOfSpeech::Noun),
            ..TokenFilter::default()
        },
    );
    assert_eq!(nouns.len(), 1);
    assert_eq!(nouns[0].text, "Gardena");
}

#[test]
fn incomplete_uses_required_fields_per_pos() {
    let project = annotated();

    let incomplete = positions(
        &project,
        &TokenFilter {
            incomplete: true,
            ..TokenFilter::default()
        },
    );

    // The noun is complete and interjections need nothing.
    assert_eq!(incomplete, vec![(0, 3), (1, 2)]);
    assert!(!is_incomplete(&project.sentences[0].tokens[1].annotation));
}

#[test]
fn missing_field_only_matches_pos_defining_it() {
    let project = annotated();

    let missing_mood = positions(
        &project,
        &TokenFilter {
            missing_field: Some("mood".to_string()),
            ..TokenFilter::default()
        },
    );
    assert_eq!(missing_mood, vec![(1, 2)]);

    let unknown = positions(
        &project,
        &TokenFilter {
            missing_field: Some("colour".to_string()),
            ..TokenFilter::default()
        },
    );
    assert!(unknown.is_empty());
}

#[test]
fn review_flags_and_confidence_bounds_combine() {
    let project = annotated();

    let flagged = |filter: TokenFilter| positions(&project, &filter);
    assert_eq!(
        flagged(TokenFilter {
            uncertain: Some(true),
            ..TokenFilter::default()
        }),
        vec![(0, 3)]
    );
    assert_eq!(
        flagged(TokenFilter {
            todo: Some(true),
            has_alternatives: Some(true),
            ..TokenFilter::default()
        }),
        vec![(1, 2)]
    );
    // Tokens without a confidence value pass the bound.
    let confident = flagged(TokenFilter {
        pos: PosFilter::Any,
        min_confidence: Some(50),
        ..TokenFilter::default()
    });
    assert_eq!(confident, vec![(0, 0), (0, 2), (0, 3)]);
    assert_eq!(
        flagged(TokenFilter {
            pos: PosFilter::Any,
            max_confidence: Some(50),
            uncertain: Some(false),
            ..TokenFilter::default()
        }),
        vec![(0, 0), (1, 2)]
    );
}

#[test]
fn statistics_summarize_progress() {
    let stats = statistics(&annotated());

    assert_eq!(stats.total_tokens, 8);
    assert_eq!(stats.annotated_tokens, 4);
    assert_eq!(stats.unannotated_tokens, 4);
    assert_eq!(stats.pos_distribution.get("noun"), Some(&1));
    assert_eq!(stats.pos_distribution.get("verb"), Some(&1));
    assert_eq!(stats.pos_distribution.get("adverb"), None);
    assert_eq!(stats.uncertain_count, 1);
    assert_eq!(stats.incomplete_count, 2);
    assert_eq!(stats.todo_count, 1);
}
