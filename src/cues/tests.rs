use super::*;

fn vocab() -> KeyTermVocabulary {
    KeyTermVocabulary::new(["resistance", "potential difference", "p.d."])
}

#[test]
fn extracts_formula_with_spaces() {
    let cues = extract_cues("Use resistance = voltage / current.", &KeyTermVocabulary::default());
    assert!(cues.contains(&Cue::Formula {
        text: "resistance=voltage/current".to_string()
    }));
}

#[test]
fn fence_text_is_not_a_formula() {
    let cues = extract_cues("(Total for Question 2 = 11 marks)", &KeyTermVocabulary::default());
    assert!(cues.cues.iter().all(|c| !matches!(c, Cue::Formula { .. })));
}

#[test]
fn extracts_quantities_but_not_prose_words() {
    let cues = extract_cues("A 12 V battery drives 2 A through 6 Ω in 3 of the cases", &KeyTermVocabulary::default());
    let units: Vec<_> = cues.units().collect();
    assert!(units.contains(&"V"));
    assert!(units.contains(&"A"));
    assert!(units.contains(&"Ω"));
    assert!(!units.contains(&"of"));
}

#[test]
fn marks_are_not_units() {
    let cues = extract_cues("worth 2 marks", &KeyTermVocabulary::default());
    assert_eq!(cues.units().count(), 0);
}

#[test]
fn key_terms_match_on_word_boundaries() {
    let v = vocab();
    let cues = extract_cues("The Potential Difference across the resistor", &v);
    assert!(cues.contains(&Cue::KeyTerm {
        term: "potential difference".to_string()
    }));
    // "resistor" must not match "resistance"
    assert!(!cues.contains(&Cue::KeyTerm {
        term: "resistance".to_string()
    }));

    let cues = extract_cues("the p.d. is 3 V", &v);
    assert!(cues.contains(&Cue::KeyTerm { term: "p.d.".to_string() }));
}

#[test]
fn jaccard_similarity() {
    let v = vocab();
    let a = extract_cues("resistance = voltage / current", &v);
    let b = extract_cues("resistance = voltage/current so 6 Ω", &v);
    let j = a.jaccard(&b).unwrap();
    // a: {formula, resistance}; b: {formula, resistance, 6 Ω}
    assert!((j - 2.0 / 3.0).abs() < 1e-9);

    let empty = CueSet::default();
    assert_eq!(empty.jaccard(&CueSet::default()), None);
    assert_eq!(a.jaccard(&empty), Some(0.0));
}
