use epub_pager::{parse_resource, Document};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Fragment {
    Text(String),
    Image(u8),
    Element(&'static str, Vec<Fragment>),
}

fn fragment() -> impl Strategy<Value = Fragment> {
    let leaf = prop_oneof![
        "[a-z]{1,6}( [a-z]{1,6}){0,3} ?".prop_map(Fragment::Text),
        any::<u8>().prop_map(Fragment::Image),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        (
            prop::sample::select(vec!["p", "div", "em", "span", "section"]),
            prop::collection::vec(inner, 0..6),
        )
            .prop_map(|(tag, children)| Fragment::Element(tag, children))
    })
}

fn render(fragment: &Fragment, out: &mut String) {
    match fragment {
        Fragment::Text(text) => out.push_str(text),
        Fragment::Image(n) => out.push_str(&format!("<img src=\"i{}.png\"/>", n)),
        Fragment::Element(tag, children) => {
            out.push_str(&format!("<{}>", tag));
            for child in children {
                render(child, out);
            }
            out.push_str(&format!("</{}>", tag));
        }
    }
}

fn markup() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment(), 1..6).prop_map(|fragments| {
        let mut out = String::new();
        for fragment in &fragments {
            render(fragment, &mut out);
        }
        out
    })
}

fn assert_contiguous(document: &Document) {
    for id in document.preorder() {
        let node = document.node(id);
        let children = node.children();
        let (Some(first), Some(last)) = (children.first(), children.last()) else {
            continue;
        };
        assert_eq!(document.node(*first).start(), node.start(), "{}", document.outline());
        assert_eq!(document.node(*last).end(), node.end(), "{}", document.outline());
        for pair in children.windows(2) {
            assert_eq!(
                document.node(pair[1]).start(),
                document.node(pair[0]).end() + 1,
                "{}",
                document.outline()
            );
        }
    }
}

proptest! {
    #[test]
    fn sibling_ranges_tile_their_parent(markup in markup(), entry in 0usize..10_000) {
        let document = parse_resource(&markup, entry).expect("generated markup is well formed");
        prop_assert_eq!(document.start(), entry);
        prop_assert_eq!(document.serialize(), markup);
        assert_contiguous(&document);
    }

    #[test]
    fn whitespace_search_never_regresses(markup in markup(), entry in 0usize..1_000) {
        let document = parse_resource(&markup, entry).expect("generated markup is well formed");
        for position in document.start()..=document.end() {
            let once = document.find_space_after(position);
            let twice = document.find_space_after(once);
            prop_assert!(once >= position);
            prop_assert!(twice >= once);
            prop_assert!(once <= document.end());
            let before = document.find_space_before(position);
            prop_assert!(before <= position);
            prop_assert!(before >= document.start());
        }
    }

    #[test]
    fn collapsed_images_occupy_one_position(markup in markup()) {
        let document = parse_resource(&markup, 0).expect("generated markup is well formed");
        for id in document.preorder() {
            let node = document.node(id);
            if node.tag() == "img" {
                prop_assert_eq!(node.start(), node.end());
            }
        }
    }

    #[test]
    fn copies_keep_their_positions(markup in markup(), a in 0usize..200, b in 0usize..200) {
        let document = parse_resource(&markup, 0).expect("generated markup is well formed");
        let (from, to) = (a.min(b), a.max(b));
        if let Some(copy) = document.copy(from, to) {
            prop_assert!(copy.start() >= from);
            prop_assert!(copy.end() <= to);
            assert_contiguous_within(&copy);
        }
    }
}

// Copies may drop atomic leaves, so only ordering is guaranteed.
fn assert_contiguous_within(document: &Document) {
    for id in document.preorder() {
        let node = document.node(id);
        for pair in node.children().windows(2) {
            assert!(document.node(pair[1]).start() > document.node(pair[0]).end());
        }
    }
}
