use basalt::bql::builder::BqlBuilder;
use basalt::bql::codegen::Generator;
use basalt::bql::errors::ParseError;
use basalt::bql::pipeline::parse_query;
use basalt::bql::syntax::{DirectionSyntax, FilterSyntax, SelectionSyntax};
use basalt::registry::{FieldKind, Registry};
use basalt::BasaltError;
use proptest::prelude::*;

fn registry() -> Registry {
    Registry::builder()
        .vertex("User", "users", &[("Username", FieldKind::Str)])
        .vertex("Group", "groups", &[("Name", FieldKind::Str)])
        .vertex("Node", "nodes", &[("Name", FieldKind::Str)])
        .edge("memberOf", "memberships", &[("Since", FieldKind::DateTime)])
        .edge("linkTo", "links", &[])
        .build()
        .expect("registry builds")
}

fn compile(builder: BqlBuilder) -> String {
    let registry = registry();
    let query = builder.finish().expect("query builds");
    let steps = parse_query(&query, &registry).expect("query parses");
    Generator::new(&registry)
        .generate(&steps)
        .expect("query generates")
        .text
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn membership_scenario_compiles_to_two_nested_blocks() {
    let text = compile(
        BqlBuilder::traverse("User")
            .filter(FilterSyntax::cmp("Username", "=", "alice"))
            .edge_out("memberOf")
            .vertex("Group")
            .filter(FilterSyntax::cmp("Name", "=", "admins")),
    );
    assert_eq!(count(&text, "FOR v"), 2, "one vertex block per hop:\n{text}");
    assert_eq!(count(&text, "FOR e"), 1, "one edge block per segment:\n{text}");
    // Structural join on both edge sides.
    assert_eq!(count(&text, "._to == "), 2); // edge anchor + ownership lookup
    assert_eq!(count(&text, "._id == "), 1); // parent side
    assert!(text.contains("== 'alice'"));
    assert!(text.contains("== 'admins'"));
}

#[test]
fn selection_types_map_to_their_guards() {
    let chain = |selection| {
        BqlBuilder::traverse("User")
            .edge("memberOf", DirectionSyntax::Out, selection)
            .vertex("Group")
    };
    let inclusive = compile(chain(SelectionSyntax::Inclusive));
    let exclusive = compile(chain(SelectionSyntax::Exclusive));
    let optional = compile(chain(SelectionSyntax::OptionalInclusive));

    // Each block carries exactly one structural parent guard; the selection
    // guard is the additional LENGTH filter.
    assert_eq!(count(&inclusive, "> 0"), 2);
    assert_eq!(count(&inclusive, "== 0"), 0);
    assert_eq!(count(&exclusive, "== 0"), 1);
    assert_eq!(count(&exclusive, "> 0"), 1);
    assert_eq!(count(&optional, "== 0"), 0);
    assert_eq!(count(&optional, "> 0"), 1);
}

#[test]
fn set_algebra_combines_fragments_left_to_right() {
    let text = compile(
        BqlBuilder::traverse("User")
            .union()
            .vertex("Group")
            .exclude()
            .vertex("Node"),
    );
    assert!(text.contains("MINUS(UNION_DISTINCT("), "combined set:\n{text}");
}

#[test]
fn intersection_uses_the_matching_set_function() {
    let text = compile(BqlBuilder::traverse("User").intersect().vertex("Group"));
    assert!(text.contains("INTERSECTION("));
}

#[test]
fn unsupported_operator_fails_the_whole_compile() {
    let registry = registry();
    let query = BqlBuilder::traverse("User")
        .filter(FilterSyntax::cmp("Username", "~", "alice"))
        .finish()
        .expect("builder accepts raw tokens");
    let err = parse_query(&query, &registry).expect_err("operator is rejected");
    assert_eq!(err, ParseError::UnsupportedOperator("~".into()));
}

#[test]
fn unknown_member_surfaces_at_generation() {
    let registry = registry();
    let query = BqlBuilder::traverse("User")
        .filter(FilterSyntax::cmp("Ghost", "=", "x"))
        .finish()
        .unwrap();
    // Member names bind late: parsing succeeds, generation resolves.
    let steps = parse_query(&query, &registry).expect("members are not resolved at parse");
    let err = Generator::new(&registry).generate(&steps).unwrap_err();
    assert!(matches!(
        err,
        BasaltError::Parse(ParseError::UnknownMember { .. })
    ));
}

fn chain_of(len: usize) -> BqlBuilder {
    let mut builder = BqlBuilder::traverse("Node");
    for _ in 1..len {
        builder = builder.edge_out("linkTo").vertex("Node");
    }
    builder
}

proptest! {
    #[test]
    fn chains_emit_one_vertex_block_per_hop(len in 1usize..6) {
        let text = compile(chain_of(len));
        prop_assert_eq!(count(&text, "FOR v"), len);
        prop_assert_eq!(count(&text, "FOR e"), len - 1);
        // Ownership attaches at the boundary hop only for node results.
        prop_assert_eq!(count(&text, "FOR o"), 1);
    }

    #[test]
    fn path_chains_attach_ownership_at_every_level(len in 1usize..6) {
        let text = compile(chain_of(len).return_paths());
        prop_assert_eq!(count(&text, "FOR v"), len);
        prop_assert_eq!(count(&text, "FOR o"), len);
        prop_assert!(text.ends_with("RETURN r"));
    }
}
