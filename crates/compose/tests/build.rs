//! End-to-end build scenarios driven through the public session API.

use lopdf::{dictionary, Document, Object, Stream};
use quire_compose::{ComposeError, NoProgress, Session};
use quire_model::CompressionPreset;

fn pdf_with_page_widths(widths: &[f32]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = widths
        .iter()
        .map(|&width| {
            let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), width.into(), 500.into()],
                "Contents" => Object::Reference(content_id),
            });
            Object::Reference(page_id)
        })
        .collect();

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture save should succeed");
    bytes
}

fn page_widths(bytes: &[u8]) -> Vec<f32> {
    let doc = Document::load_mem(bytes).expect("output should parse");
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let dict = doc.get_dictionary(page_id).expect("page dict expected");
            let media_box = dict.get(b"MediaBox").and_then(|obj| obj.as_array()).expect("MediaBox");
            let x0 = media_box[0].as_float().expect("number");
            let x1 = media_box[2].as_float().expect("number");
            (x1 - x0).abs()
        })
        .collect()
}

#[test]
fn interleaved_merge_of_two_sources() {
    let mut session = Session::new();
    session.load_files(vec![
        ("a.pdf".to_owned(), pdf_with_page_widths(&[101.0, 102.0, 103.0])),
        ("b.pdf".to_owned(), pdf_with_page_widths(&[201.0, 202.0])),
    ]);

    // [A1, A2, A3, B1, B2] -> [A1, B1, A2, B2, A3]
    let set = session.working_set_mut();
    let b1 = set.get(3).expect("B1 expected").id;
    set.move_to(b1, 1);
    let b2 = set.get(4).expect("B2 expected").id;
    set.move_to(b2, 3);

    let bytes = session.build_copy().expect("build should succeed");
    assert_eq!(page_widths(&bytes), vec![101.0, 201.0, 102.0, 202.0, 103.0]);
}

#[test]
fn split_by_deleting_selected_pages() {
    let mut session = Session::new();
    session.load_files(vec![(
        "a.pdf".to_owned(),
        pdf_with_page_widths(&[101.0, 102.0, 103.0, 104.0]),
    )]);

    let set = session.working_set_mut();
    let doomed = [set.get(1).expect("page 2").id, set.get(3).expect("page 4").id]
        .into_iter()
        .collect();
    set.remove_many(&doomed);

    let bytes = session.build_copy().expect("build should succeed");
    assert_eq!(page_widths(&bytes), vec![101.0, 103.0]);
}

#[test]
fn empty_working_set_produces_no_output() {
    let mut session = Session::new();
    session.load_files(vec![("a.pdf".to_owned(), pdf_with_page_widths(&[101.0]))]);
    session.working_set_mut().clear();

    assert!(matches!(session.build_copy(), Err(ComposeError::EmptyInput)));

    let mut engine = quire_engine::default_engine();
    let raster = session.build_rasterize(
        &CompressionPreset::Standard.profile(),
        &mut engine,
        &mut NoProgress,
    );
    assert!(matches!(raster, Err(ComposeError::EmptyInput)));
}

#[test]
fn rasterized_rebuild_matches_working_set_length_and_parses() {
    let mut session = Session::new();
    session.load_files(vec![
        ("a.pdf".to_owned(), pdf_with_page_widths(&[101.0, 102.0])),
        ("b.pdf".to_owned(), pdf_with_page_widths(&[201.0])),
    ]);

    let mut pages_seen = Vec::new();
    let mut progress = |done: usize, total: usize| pages_seen.push((done, total));

    let mut engine = quire_engine::default_engine();
    let bytes = session
        .build_rasterize(&CompressionPreset::Standard.profile(), &mut engine, &mut progress)
        .expect("build should succeed");

    let doc = Document::load_mem(&bytes).expect("output should parse");
    assert_eq!(doc.get_pages().len(), 3);
    assert_eq!(pages_seen, vec![(1, 3), (2, 3), (3, 3)]);
}
