use oeannotator_core::model::annotation::FieldPatch;
use oeannotator_core::{AnnotationInput, AnnotationStore, FieldMemory, PartOfSpeech, Token};

fn store() -> AnnotationStore {
    AnnotationStore::new(FieldMemory::new())
}

fn field<'a>(token: &'a Token, key: &str) -> Option<&'a str> {
    token
        .annotation
        .fields
        .as_ref()
        .and_then(|fields| fields.get(key).unwrap())
}

#[test]
fn sparse_apply_with_same_pos_keeps_prior_fields() {
    let mut store = store();
    let mut token = Token::new(0, "cyning");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun)
                .set("gender", "m")
                .set("number", "sg")
                .set("case", "nom"),
        )
        .unwrap();
    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun).set("case", "gen"),
        )
        .unwrap();

    assert_eq!(field(&token, "gender"), Some("m"));
    assert_eq!(field(&token, "number"), Some("sg"));
    assert_eq!(field(&token, "case"), Some("gen"));
    assert_eq!(field(&token, "declension"), None);
}

#[test]
fn explicit_clear_overwrites_prior_value() {
    let mut store = store();
    let mut token = Token::new(0, "cyning");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun)
                .set("gender", "m")
                .set("case", "nom"),
        )
        .unwrap();
    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun).clear("case"),
        )
        .unwrap();

    assert_eq!(field(&token, "gender"), Some("m"));
    assert_eq!(field(&token, "case"), None);
}

#[test]
fn pos_switch_prefills_from_memory_not_from_token() {
    let mut store = store();
    let mut earlier = Token::new(0, "wæs");
    let mut token = Token::new(1, "gōd");

    store
        .apply(
            &mut earlier,
            &AnnotationInput::new(PartOfSpeech::Adjective)
                .set("degree", "positive")
                .set("inflection", "strong"),
        )
        .unwrap();
    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun)
                .set("gender", "n")
                .set("number", "sg"),
        )
        .unwrap();

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Adjective).set("case", "nom"),
        )
        .unwrap();

    assert_eq!(token.annotation.pos(), Some(PartOfSpeech::Adjective));
    assert_eq!(field(&token, "degree"), Some("positive"));
    assert_eq!(field(&token, "inflection"), Some("strong"));
    assert_eq!(field(&token, "case"), Some("nom"));
    // Noun values of this token do not leak into the adjective field set.
    assert_eq!(field(&token, "gender"), None);
    assert_eq!(field(&token, "number"), None);
}

#[test]
fn pos_switch_without_memory_starts_empty() {
    let mut store = store();
    let mut token = Token::new(0, "him");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Noun).set("case", "dat"),
        )
        .unwrap();
    store
        .apply(&mut token, &AnnotationInput::new(PartOfSpeech::Pronoun))
        .unwrap();

    let fields = token.annotation.fields.as_ref().unwrap();
    assert_eq!(fields.pos(), PartOfSpeech::Pronoun);
    assert!(fields.is_empty());
}

#[test]
fn memory_tracks_latest_result_per_pos() {
    let mut store = store();
    let mut first = Token::new(0, "se");
    let mut second = Token::new(1, "þæt");

    store
        .apply(
            &mut first,
            &AnnotationInput::new(PartOfSpeech::Article)
                .set("gender", "m")
                .set("case", "nom"),
        )
        .unwrap();
    store
        .apply(
            &mut second,
            &AnnotationInput::new(PartOfSpeech::Article).set("gender", "n"),
        )
        .unwrap();

    let remembered = store.memory().recall(PartOfSpeech::Article).unwrap();
    assert_eq!(remembered.get("gender").unwrap(), Some("n"));
    assert_eq!(remembered.get("case").unwrap(), Some("nom"));
    assert_eq!(store.memory().len(), 1);
}

#[test]
fn unknown_field_is_rejected_without_mutation() {
    let mut store = store();
    let mut token = Token::new(0, "and");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Conjunction).set("conj_type", "coord"),
        )
        .unwrap();
    let before = token.annotation.clone();

    let err = store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Conjunction).set("tense", "past"),
        )
        .unwrap_err();

    assert_eq!(err.pos, PartOfSpeech::Conjunction);
    assert_eq!(err.field, "tense");
    assert_eq!(token.annotation, before);
}

#[test]
fn confidence_is_clamped_and_metadata_survives_pos_change() {
    let mut store = store();
    let mut token = Token::new(0, "Hwæt");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Interjection)
                .with_confidence(250)
                .with_gloss("lo")
                .with_uncertain(true),
        )
        .unwrap();
    assert_eq!(token.annotation.confidence, Some(100));

    let mut input = AnnotationInput::new(PartOfSpeech::Adverb).with_confidence(-4);
    input.alternatives = FieldPatch::Set("pronoun".to_string());
    store.apply(&mut token, &input).unwrap();

    assert_eq!(token.annotation.confidence, Some(0));
    assert_eq!(token.annotation.gloss.as_deref(), Some("lo"));
    assert!(token.annotation.uncertain);
    assert_eq!(token.annotation.alternatives.as_deref(), Some("pronoun"));
}

#[test]
fn clear_resets_token_and_keeps_memory() {
    let mut store = store();
    let mut token = Token::new(0, "cwæð");

    store
        .apply(
            &mut token,
            &AnnotationInput::new(PartOfSpeech::Verb)
                .set("tense", "past")
                .with_todo(true),
        )
        .unwrap();
    store.clear(&mut token);

    assert!(token.annotation.is_empty());
    assert!(store.memory().recall(PartOfSpeech::Verb).is_some());
}
