use super::*;

#[test]
fn union_covers_both_boxes() {
    let a = BoundingBox::new(0, 10.0, 10.0, 20.0, 10.0);
    let b = BoundingBox::new(0, 25.0, 30.0, 20.0, 10.0);
    let u = a.union(&b).unwrap();
    assert_eq!(u.x, 10.0);
    assert_eq!(u.y, 10.0);
    assert_eq!(u.right(), 45.0);
    assert_eq!(u.bottom(), 40.0);
}

#[test]
fn union_across_pages_is_none() {
    let a = BoundingBox::new(0, 10.0, 10.0, 20.0, 10.0);
    let b = BoundingBox::new(1, 10.0, 10.0, 20.0, 10.0);
    assert!(a.union(&b).is_none());
}

#[test]
fn fragment_stream_follows_page_order() {
    let doc: SourceDocument = serde_json::from_str(
        r#"{"pages":[
            {"index":0,"fragments":[{"text":"first","x":1,"y":1},{"text":"second","x":1,"y":2}]},
            {"index":1,"low_text_density":true,"fragments":[{"text":"third","x":1,"y":1}]}
        ]}"#,
    )
    .unwrap();

    let texts: Vec<_> = doc.fragments().iter().map(|f| f.text).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert_eq!(doc.fragments()[2].page, 1);
    assert!(doc.pages[1].low_text_density);
    assert_eq!(doc.page_count(), 2);
}

#[test]
fn blank_document_detection() {
    let doc = SourceDocument::new(vec![Page {
        index: 0,
        width: None,
        height: None,
        low_text_density: false,
        fragments: vec![TextFragment {
            text: "   ".to_string(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }],
    }]);
    assert!(doc.is_blank());
    assert!(SourceDocument::default().is_blank());
}
