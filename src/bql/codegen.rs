#![forbid(unsafe_code)]

//! Query code generation.
//!
//! Walks a parsed step list and its hop chains, emitting the store's nested
//! `LET`/`FOR`/`FILTER` query text. Chains are stored leaf-first; generation
//! recurses from the leaf back to the root so the root block lands
//! innermost, and each level's `RETURN` merges in the accumulated result of
//! the level inside it. A depth counter tracks how many `[*]`-style flatten
//! operators the final `FOR` must apply to the combined set.
//!
//! Assembly goes through [`Block`]/[`Clause`], a typed clause accumulator
//! that renders to text once at the end, so indentation and clause layout
//! are decided in exactly one place. Codegen is pure text assembly: it
//! validates step-list invariants (programming errors) but never
//! database-level syntax; bad names fail earlier, in the converter, or here
//! through the renderer's member resolution.

use crate::bql::filter::{
    BqlExpression, Direction, EdgeSelection, HopId, Predicate, ReturnShape,
};
use crate::bql::pipeline::{AggregateOp, SortKey, Step};
use crate::bql::render::{render_list, render_scoped, HopContext, RenderScope};
use crate::db::transport::AqlQuery;
use crate::error::{BasaltError, Result};
use crate::registry::Registry;

/// One typed clause of a query block.
#[derive(Clone, Debug)]
pub(crate) enum Clause {
    /// `FOR var IN source`
    For {
        /// Iteration variable.
        var: String,
        /// Source collection or expression.
        source: String,
    },
    /// `FILTER expr`
    Filter(String),
    /// `LET var = expr`
    Let {
        /// Bound variable.
        var: String,
        /// Bound expression.
        value: String,
    },
    /// `LET var = ( nested block )`
    LetBlock {
        /// Bound variable.
        var: String,
        /// Nested sub-query.
        block: Block,
    },
    /// `SORT key, key, ...`
    Sort(Vec<String>),
    /// `LIMIT offset, count`
    Limit {
        /// Records to skip.
        offset: u64,
        /// Records to return.
        count: u64,
    },
    /// `RETURN expr`
    Return(String),
}

/// An ordered clause list rendering as one query block.
#[derive(Clone, Debug, Default)]
pub(crate) struct Block {
    clauses: Vec<Clause>,
}

impl Block {
    pub(crate) fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    /// Renders the block. Clauses after the first `FOR` indent one level
    /// deeper, matching the target language's conventional layout.
    pub(crate) fn render_into(&self, out: &mut String, indent: usize) {
        let mut body_indent = indent;
        for clause in &self.clauses {
            match clause {
                Clause::For { var, source } => {
                    push_line(out, body_indent, &format!("FOR {var} IN {source}"));
                    body_indent = indent + 1;
                }
                Clause::Filter(expr) => push_line(out, body_indent, &format!("FILTER {expr}")),
                Clause::Let { var, value } => {
                    push_line(out, body_indent, &format!("LET {var} = {value}"));
                }
                Clause::LetBlock { var, block } => {
                    push_line(out, body_indent, &format!("LET {var} = ("));
                    block.render_into(out, body_indent + 1);
                    push_line(out, body_indent, ")");
                }
                Clause::Sort(keys) => {
                    push_line(out, body_indent, &format!("SORT {}", keys.join(", ")));
                }
                Clause::Limit { offset, count } => {
                    push_line(out, body_indent, &format!("LIMIT {offset}, {count}"));
                }
                Clause::Return(expr) => push_line(out, body_indent, &format!("RETURN {expr}")),
            }
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }
}

fn push_line(out: &mut String, indent: usize, text: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(text);
}

/// A combined candidate set: its `LET` prelude plus the flattened
/// expression enumerating individual records.
pub(crate) struct CandidateSet {
    /// `LET` blocks, one per aggregate.
    pub(crate) lets: Vec<Clause>,
    /// Expression enumerating the combined, flattened records.
    pub(crate) expr: String,
}

struct Validated<'a> {
    aggregates: Vec<(AggregateOp, &'a BqlExpression)>,
    sort: Option<&'a [SortKey]>,
    limit: Option<(u64, u64)>,
    shape: ReturnShape,
}

/// Generates query text from step lists and IR. Variable names come from a
/// single running counter so one generator can assemble several candidate
/// sets into a single statement without collisions.
pub struct Generator<'r> {
    registry: &'r Registry,
    counter: u32,
}

impl<'r> Generator<'r> {
    /// New generator over the given registry.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            counter: 0,
        }
    }

    fn var(&mut self, prefix: &str) -> String {
        let id = self.counter;
        self.counter += 1;
        format!("{prefix}{id}")
    }

    /// Generates the full statement for a parsed step list.
    pub fn generate(&mut self, steps: &[Step]) -> Result<AqlQuery> {
        let validated = validate(steps)?;
        let set = self.combined_set(&validated)?;

        let mut statement = Block::default();
        for clause in set.lets {
            statement.push(clause);
        }
        statement.push(Clause::For {
            var: "r".into(),
            source: set.expr,
        });
        if let Some(keys) = validated.sort {
            statement.push(Clause::Sort(
                keys.iter()
                    .map(|key| {
                        format!(
                            "r.{} {}",
                            key.member,
                            if key.descending { "DESC" } else { "ASC" }
                        )
                    })
                    .collect(),
            ));
        }
        if let Some((offset, count)) = validated.limit {
            statement.push(Clause::Limit { offset, count });
        }
        statement.push(Clause::Return(match validated.shape {
            ReturnShape::Nodes => "UNSET(r, '_owner')".into(),
            ReturnShape::Paths => "r".into(),
        }));
        Ok(AqlQuery::text(statement.render()))
    }

    /// Generates a statement returning only the combined candidate count.
    pub fn generate_count(&mut self, steps: &[Step]) -> Result<AqlQuery> {
        let validated = validate(steps)?;
        let set = self.combined_set(&validated)?;
        let mut statement = Block::default();
        for clause in set.lets {
            statement.push(clause);
        }
        statement.push(Clause::Return(format!("LENGTH({})", set.expr)));
        Ok(AqlQuery::text(statement.render()))
    }

    /// Generates a single-collection list query (the plain list-predicate
    /// path; no traversal, no set algebra).
    pub fn generate_list(
        &mut self,
        type_name: &str,
        filter: Option<&Predicate>,
        sort: Option<&[SortKey]>,
        limit: Option<(u64, u64)>,
    ) -> Result<AqlQuery> {
        let descriptor = self.registry.resolve(type_name)?;
        let var = self.var("v");
        let mut block = Block::default();
        block.push(Clause::For {
            var: var.clone(),
            source: descriptor.collection.clone(),
        });
        block.push(Clause::Filter(format!("{var}.IsDeleted != true")));
        block.push(Clause::Filter(format!(
            "{var}.ModelType == '{}'",
            descriptor.type_name
        )));
        if let Some(predicate) = filter {
            block.push(Clause::Filter(render_list(predicate, &var, descriptor)?));
        }
        if let Some(keys) = sort {
            block.push(Clause::Sort(
                keys.iter()
                    .map(|key| {
                        format!(
                            "{var}.{} {}",
                            key.member,
                            if key.descending { "DESC" } else { "ASC" }
                        )
                    })
                    .collect(),
            ));
        }
        if let Some((offset, count)) = limit {
            block.push(Clause::Limit { offset, count });
        }
        block.push(Clause::Return(var));
        Ok(AqlQuery::text(block.render()))
    }

    /// Builds the `LET` prelude and flattened enumeration expression for a
    /// validated step list. Also used by the queue, which wraps candidate
    /// sets in its own annotation block.
    fn combined_set(&mut self, validated: &Validated<'_>) -> Result<CandidateSet> {
        let mut lets = Vec::new();
        let mut vars = Vec::new();
        let mut max_depth = 0usize;
        for (op, source) in &validated.aggregates {
            let chain = source.arena.chain(source.leaf);
            let depth = chain.len();
            max_depth = max_depth.max(depth);
            let block = self.hop_block(source, &chain, 0, None, validated.shape)?;
            let var = self.var("qv");
            lets.push(Clause::LetBlock {
                var: var.clone(),
                block,
            });
            vars.push((*op, var));
        }

        let mut expr = vars[0].1.clone();
        for (op, var) in &vars[1..] {
            let function = match op {
                AggregateOp::Union => "UNION_DISTINCT",
                AggregateOp::Intersect => "INTERSECTION",
                AggregateOp::Exclude => "MINUS",
            };
            expr = format!("{function}({expr}, {var})");
        }
        // Nodes accumulate one nesting level per hop; paths are emitted
        // flat, one path document per outermost match.
        let flatten_depth = match validated.shape {
            ReturnShape::Nodes => max_depth.saturating_sub(1),
            ReturnShape::Paths => 0,
        };
        if flatten_depth > 0 {
            expr = format!("{expr}[{}]", "*".repeat(flatten_depth + 1));
        }
        Ok(CandidateSet { lets, expr })
    }

    pub(crate) fn candidate_set(&mut self, steps: &[Step]) -> Result<CandidateSet> {
        let validated = validate(steps)?;
        self.combined_set(&validated)
    }

    /// Emits the block for `chain[index]`. `anchor` carries the child
    /// hop's edge variable and the field this vertex must join against.
    fn hop_block(
        &mut self,
        source: &BqlExpression,
        chain: &[HopId],
        index: usize,
        anchor: Option<(String, &'static str)>,
        shape: ReturnShape,
    ) -> Result<Block> {
        let hop = source.arena.get(chain[index]);
        let vertex = self.registry.resolve(&hop.vertex_type)?;
        let edge = hop
            .edge_type
            .as_deref()
            .map(|name| self.registry.resolve(name))
            .transpose()?;
        let context = HopContext {
            vertex: &**vertex,
            edge: edge.map(|arc| &**arc),
        };
        let outermost = index == 0;
        let is_root = index + 1 == chain.len();
        let with_owner = outermost || shape == ReturnShape::Paths;

        let v = self.var("v");
        let mut block = Block::default();
        block.push(Clause::For {
            var: v.clone(),
            source: vertex.collection.clone(),
        });
        block.push(Clause::Filter(format!("{v}.IsDeleted != true")));
        block.push(Clause::Filter(format!(
            "{v}.ModelType == '{}'",
            vertex.type_name
        )));
        if let Some(filter) = &hop.filter {
            if let Some(rendered) = render_scoped(filter, &v, RenderScope::Node, context)? {
                block.push(Clause::Filter(rendered));
            }
        }
        if let Some((edge_var, field)) = &anchor {
            block.push(Clause::Filter(format!("{v}._id == {edge_var}.{field}")));
        }

        let owner_var = if with_owner {
            let own = self.var("own");
            block.push(Clause::LetBlock {
                var: own.clone(),
                block: self.ownership_block(&v),
            });
            Some(own)
        } else {
            None
        };

        // Root hops have no connecting edge; everything below only applies
        // to hops that traverse to a parent.
        if is_root {
            block.push(Clause::Return(root_return(
                &v,
                owner_var.as_deref(),
                shape,
                outermost,
            )));
            return Ok(block);
        }

        let e = self.var("e");
        let edge_collection = match edge {
            Some(descriptor) => descriptor.collection.clone(),
            None => self.registry.any_edge_collection().to_owned(),
        };
        let mut edge_block = Block::default();
        edge_block.push(Clause::For {
            var: e.clone(),
            source: edge_collection,
        });
        edge_block.push(Clause::Filter(format!("{e}.IsDeleted != true")));
        if let Some(descriptor) = edge {
            edge_block.push(Clause::Filter(format!(
                "{e}.ModelType == '{}'",
                descriptor.type_name
            )));
        }
        if let Some(filter) = &hop.filter {
            if let Some(rendered) = render_scoped(filter, &e, RenderScope::Edge, context)? {
                edge_block.push(Clause::Filter(rendered));
            }
        }
        // The edge anchors to this vertex on one side and to the parent
        // chain on the other, depending on traversal direction.
        let (near, far) = match hop.direction {
            Direction::Out => ("_to", "_from"),
            Direction::In => ("_from", "_to"),
        };
        edge_block.push(Clause::Filter(format!("{e}.{near} == {v}._id")));

        let parent_block =
            self.hop_block(source, chain, index + 1, Some((e.clone(), far)), shape)?;
        let sq_parent = self.var("sq");
        edge_block.push(Clause::LetBlock {
            var: sq_parent.clone(),
            block: parent_block,
        });
        edge_block.push(Clause::Filter(format!("LENGTH({sq_parent}) > 0")));
        edge_block.push(Clause::Return(match shape {
            ReturnShape::Nodes => format!("APPEND({sq_parent}, [{e}])"),
            ReturnShape::Paths => format!(
                "{{ vertices: FLATTEN({sq_parent}[*].vertices), edges: APPEND(FLATTEN({sq_parent}[*].edges), [{e}]) }}"
            ),
        }));

        let sq_edge = self.var("sq");
        block.push(Clause::LetBlock {
            var: sq_edge.clone(),
            block: edge_block,
        });
        match hop.selection {
            EdgeSelection::Inclusive => {
                block.push(Clause::Filter(format!("LENGTH({sq_edge}) > 0")));
            }
            EdgeSelection::Exclusive => {
                block.push(Clause::Filter(format!("LENGTH({sq_edge}) == 0")));
            }
            EdgeSelection::OptionalInclusive => {}
        }
        block.push(Clause::Return(outer_return(
            &v,
            &sq_edge,
            owner_var.as_deref(),
            shape,
            outermost,
        )));
        Ok(block)
    }

    /// One-hop inbound lookup for the owning organizational unit.
    fn ownership_block(&mut self, vertex_var: &str) -> Block {
        let o = self.var("o");
        let mut block = Block::default();
        block.push(Clause::For {
            var: o.clone(),
            source: self.registry.ownership_collection().to_owned(),
        });
        block.push(Clause::Filter(format!("{o}.IsDeleted != true")));
        block.push(Clause::Filter(format!(
            "{o}.ModelType == '{}'",
            self.registry.ownership_edge_type()
        )));
        block.push(Clause::Filter(format!("{o}._to == {vertex_var}._id")));
        block.push(Clause::Return(format!("{o}._from")));
        block
    }
}

fn merged_vertex(var: &str, owner: Option<&str>) -> String {
    match owner {
        Some(own) => format!("MERGE({var}, {{ _owner: FIRST({own}) }})"),
        None => var.to_owned(),
    }
}

fn root_return(var: &str, owner: Option<&str>, shape: ReturnShape, outermost: bool) -> String {
    match shape {
        ReturnShape::Nodes => merged_vertex(var, owner),
        // A single-hop path is its own root document with empty pairing
        // arrays; an inner root contributes one pairing struct.
        ReturnShape::Paths if outermost => format!(
            "MERGE({var}, {{ _owner: FIRST({}), vertices: [], edges: [] }})",
            owner.unwrap_or_default()
        ),
        ReturnShape::Paths => format!(
            "{{ vertices: [{}], edges: [] }}",
            merged_vertex(var, owner)
        ),
    }
}

fn outer_return(
    var: &str,
    sq_edge: &str,
    owner: Option<&str>,
    shape: ReturnShape,
    outermost: bool,
) -> String {
    match shape {
        ReturnShape::Nodes => format!("APPEND({sq_edge}, [{}])", merged_vertex(var, owner)),
        // The outermost path document is the vertex itself with the pairing
        // arrays attached; inner levels keep accumulating pairing structs.
        ReturnShape::Paths if outermost => format!(
            "MERGE({var}, {{ _owner: FIRST({}), vertices: FLATTEN({sq_edge}[*].vertices), edges: FLATTEN({sq_edge}[*].edges) }})",
            owner.unwrap_or_default()
        ),
        ReturnShape::Paths => format!(
            "{{ vertices: APPEND(FLATTEN({sq_edge}[*].vertices), [{}]), edges: FLATTEN({sq_edge}[*].edges) }}",
            merged_vertex(var, owner)
        ),
    }
}

fn validate(steps: &[Step]) -> Result<Validated<'_>> {
    if steps.is_empty() {
        return Err(BasaltError::CodegenInvariant("empty step list"));
    }
    let mut aggregates = Vec::new();
    let mut sort = None;
    let mut limit = None;
    let mut shape = None;
    for step in steps {
        if shape.is_some() {
            return Err(BasaltError::CodegenInvariant("step after terminal return"));
        }
        match step {
            Step::Aggregate { op, source } => {
                if sort.is_some() || limit.is_some() {
                    return Err(BasaltError::CodegenInvariant("aggregate after sort or limit"));
                }
                aggregates.push((*op, source));
            }
            Step::Sort(keys) => {
                if sort.is_some() {
                    return Err(BasaltError::CodegenInvariant("duplicate sort step"));
                }
                if limit.is_some() {
                    return Err(BasaltError::CodegenInvariant("sort after limit"));
                }
                sort = Some(keys.as_slice());
            }
            Step::Limit { offset, count } => {
                if limit.is_some() {
                    return Err(BasaltError::CodegenInvariant("duplicate limit step"));
                }
                limit = Some((*offset, *count));
            }
            Step::Return(selected) => shape = Some(*selected),
        }
    }
    if aggregates.is_empty() {
        return Err(BasaltError::CodegenInvariant(
            "step list must begin with an aggregate",
        ));
    }
    let shape = shape.ok_or(BasaltError::CodegenInvariant("missing terminal return step"))?;
    Ok(Validated {
        aggregates,
        sort,
        limit,
        shape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bql::filter::{CompareOp, Literal};
    use crate::bql::pipeline::parse_query;
    use crate::bql::syntax::{
        DirectionSyntax, EdgeSyntax, FilterSyntax, LinkSyntax, QuerySyntax, QueryToken,
        SelectionSyntax, SortKeySyntax, TraversalSyntax, VertexSyntax,
    };
    use crate::registry::FieldKind;

    fn registry() -> Registry {
        Registry::builder()
            .vertex("User", "users", &[("Username", FieldKind::Str)])
            .vertex("Group", "groups", &[("Name", FieldKind::Str)])
            .edge("memberOf", "memberships", &[("Since", FieldKind::DateTime)])
            .build()
            .unwrap()
    }

    fn eq_filter(member: &str, value: &str) -> FilterSyntax {
        FilterSyntax::Compare {
            member: member.to_owned(),
            op: "=".into(),
            value: value.into(),
        }
    }

    fn member_of(selection: SelectionSyntax) -> LinkSyntax {
        LinkSyntax::Edge(EdgeSyntax {
            edge_type: Some("memberOf".into()),
            direction: DirectionSyntax::Out,
            selection,
            filter: None,
        })
    }

    fn alice_to_admins(selection: SelectionSyntax) -> TraversalSyntax {
        TraversalSyntax {
            root: VertexSyntax::new("User").with_filter(eq_filter("Username", "alice")),
            segments: vec![(
                member_of(selection),
                VertexSyntax::new("Group").with_filter(eq_filter("Name", "admins")),
            )],
        }
    }

    fn generate(tokens: Vec<QueryToken>) -> String {
        let registry = registry();
        let steps = parse_query(&QuerySyntax { tokens }, &registry).unwrap();
        Generator::new(&registry).generate(&steps).unwrap().text
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn two_hop_traversal_emits_two_nested_vertex_blocks() {
        let text = generate(vec![QueryToken::Traversal(alice_to_admins(
            SelectionSyntax::Inclusive,
        ))]);
        // One vertex block per hop, leaf outermost, root innermost.
        assert_eq!(count(&text, "FOR v"), 2);
        assert!(text.contains("FOR v0 IN groups"));
        assert!(text.contains("FOR v4 IN users"));
        // Structural join on both edge sides.
        assert!(text.contains("FILTER e3._to == v0._id"));
        assert!(text.contains("FILTER v4._id == e3._from"));
        // Hop predicates land in their own blocks.
        assert!(text.contains("FILTER LOWER(v0.Name) == 'admins'"));
        assert!(text.contains("FILTER LOWER(v4.Username) == 'alice'"));
        // Soft-delete exclusion and tag match on every block.
        assert!(text.contains("FILTER v0.ModelType == 'Group'"));
        assert!(text.contains("FILTER v4.ModelType == 'User'"));
        assert_eq!(count(&text, ".IsDeleted != true"), 4);
        // One ownership sub-block, at the boundary hop only.
        assert_eq!(count(&text, "FOR o"), 1);
        assert!(text.contains("FILTER o2._to == v0._id"));
        // One accumulated nesting level: one flatten star pair.
        assert!(text.contains("FOR r IN qv7[**]"));
        assert!(text.contains("RETURN UNSET(r, '_owner')"));
    }

    #[test]
    fn inclusive_selection_guards_positive_length() {
        let text = generate(vec![QueryToken::Traversal(alice_to_admins(
            SelectionSyntax::Inclusive,
        ))]);
        assert!(text.contains("FILTER LENGTH(sq6) > 0"));
        assert!(!text.contains("LENGTH(sq6) == 0"));
    }

    #[test]
    fn exclusive_selection_guards_zero_length() {
        let text = generate(vec![QueryToken::Traversal(alice_to_admins(
            SelectionSyntax::Exclusive,
        ))]);
        assert!(text.contains("FILTER LENGTH(sq6) == 0"));
        assert!(!text.contains("LENGTH(sq6) > 0"));
    }

    #[test]
    fn optional_selection_emits_no_guard() {
        let text = generate(vec![QueryToken::Traversal(alice_to_admins(
            SelectionSyntax::OptionalInclusive,
        ))]);
        // The structural parent join remains; the selection guard does not.
        assert!(text.contains("FILTER LENGTH(sq5) > 0"));
        assert!(!text.contains("LENGTH(sq6)"));
    }

    #[test]
    fn any_edge_segment_scans_the_catch_all_collection() {
        let text = generate(vec![QueryToken::Traversal(TraversalSyntax {
            root: VertexSyntax::new("User"),
            segments: vec![(LinkSyntax::Out, VertexSyntax::new("Group"))],
        })]);
        assert!(text.contains("FOR e3 IN relations"));
        assert!(!text.contains("e3.ModelType"));
    }

    #[test]
    fn inbound_direction_swaps_the_anchor_sides() {
        let text = generate(vec![QueryToken::Traversal(TraversalSyntax {
            root: VertexSyntax::new("User"),
            segments: vec![(LinkSyntax::In, VertexSyntax::new("Group"))],
        })]);
        assert!(text.contains("FILTER e3._from == v0._id"));
        assert!(text.contains("FILTER v4._id == e3._to"));
    }

    #[test]
    fn aggregates_combine_left_to_right() {
        let single = |name: &str| {
            QueryToken::Traversal(TraversalSyntax {
                root: VertexSyntax::new(name),
                segments: vec![],
            })
        };
        let text = generate(vec![
            single("User"),
            QueryToken::Aggregator("UNION".into()),
            single("Group"),
            QueryToken::Aggregator("EXCLUDE".into()),
            single("User"),
        ]);
        assert!(text.contains("FOR r IN MINUS(UNION_DISTINCT(qv3, qv7), qv11)"));
    }

    #[test]
    fn sort_and_limit_terminate_the_statement() {
        let text = generate(vec![
            QueryToken::Traversal(TraversalSyntax {
                root: VertexSyntax::new("User"),
                segments: vec![],
            }),
            QueryToken::Sort(vec![SortKeySyntax {
                member: "Username".into(),
                descending: true,
            }]),
            QueryToken::Limit { offset: 20, count: 10 },
        ]);
        assert!(text.contains("SORT r.Username DESC"));
        assert!(text.contains("LIMIT 20, 10"));
        // Single-hop chain needs no flatten stars.
        assert!(text.contains("FOR r IN qv3\n"));
    }

    #[test]
    fn paths_return_keeps_bookkeeping_and_pairs_per_level() {
        let text = generate(vec![
            QueryToken::Traversal(alice_to_admins(SelectionSyntax::Inclusive)),
            QueryToken::ReturnPaths(true),
        ]);
        // Ownership attaches at every level for path results.
        assert_eq!(count(&text, "FOR o"), 2);
        // The outermost path document is the vertex with pairing arrays.
        assert!(text.contains(
            "RETURN MERGE(v0, { _owner: FIRST(own1), vertices: FLATTEN(sq8[*].vertices), edges: FLATTEN(sq8[*].edges) })"
        ));
        // Inner root contributes one pairing struct.
        assert!(text.contains("RETURN { vertices: [MERGE(v4, { _owner: FIRST(own5) })], edges: [] }"));
        // Edge level appends itself to the accumulated edges.
        assert!(text.contains("edges: APPEND(FLATTEN(sq7[*].edges), [e3])"));
        // Paths come back flat and unstripped.
        assert!(text.contains("FOR r IN qv9\n"));
        assert!(text.ends_with("RETURN r"));
    }

    #[test]
    fn count_statement_wraps_the_combined_set() {
        let registry = registry();
        let steps = parse_query(
            &QuerySyntax {
                tokens: vec![QueryToken::Traversal(alice_to_admins(
                    SelectionSyntax::Inclusive,
                ))],
            },
            &registry,
        )
        .unwrap();
        let query = Generator::new(&registry).generate_count(&steps).unwrap();
        assert!(query.text.ends_with("RETURN LENGTH(qv7[**])"));
    }

    #[test]
    fn list_statement_uses_the_plain_predicate_path() {
        let registry = registry();
        let predicate = Predicate::compare(CompareOp::Eq, "Username", Literal::Str("bob".into()));
        let query = Generator::new(&registry)
            .generate_list(
                "User",
                Some(&predicate),
                Some(&[SortKey {
                    member: "Username".into(),
                    descending: false,
                }]),
                Some((0, 50)),
            )
            .unwrap();
        assert_eq!(
            query.text,
            "FOR v0 IN users\n  FILTER v0.IsDeleted != true\n  FILTER v0.ModelType == 'User'\n  FILTER LOWER(v0.Username) == 'bob'\n  SORT v0.Username ASC\n  LIMIT 0, 50\n  RETURN v0"
        );
    }

    #[test]
    fn malformed_step_lists_are_fatal() {
        let registry = registry();
        let mut generator = Generator::new(&registry);
        let err = generator.generate(&[]).unwrap_err();
        assert!(matches!(err, BasaltError::CodegenInvariant(_)));

        let steps = parse_query(
            &QuerySyntax {
                tokens: vec![QueryToken::Traversal(TraversalSyntax {
                    root: VertexSyntax::new("User"),
                    segments: vec![],
                })],
            },
            &registry,
        )
        .unwrap();
        let mut doubled = steps.clone();
        doubled.insert(1, Step::Limit { offset: 0, count: 1 });
        doubled.insert(1, Step::Limit { offset: 0, count: 1 });
        let err = generator.generate(&doubled).unwrap_err();
        assert!(matches!(
            err,
            BasaltError::CodegenInvariant("duplicate limit step")
        ));
    }
}
