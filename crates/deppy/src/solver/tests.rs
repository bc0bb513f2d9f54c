//! End-to-end solve scenarios.
//!
//! These exercise the full pipeline (builder expansion, CNF encoding,
//! preference-ordered search, minimization) against small universes with
//! known selections.

use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::cancel::CancelToken;
use crate::error::{NotSatisfiable, SolveError};
use crate::expr::{GroupByExpression, SelectorExpression, SortExpression};

fn entity(id: &str) -> Entity {
    Entity::new(id)
}

fn mandatory(subject: &str) -> ConstraintSpec {
    ConstraintSpec::Mandatory {
        subject: subject.into(),
    }
}

fn prohibited(subject: &str) -> ConstraintSpec {
    ConstraintSpec::Prohibited {
        subject: subject.into(),
    }
}

fn conflict(subject: &str, other: &str) -> ConstraintSpec {
    ConstraintSpec::Conflict {
        subject: subject.into(),
        ids: vec![other.into()],
    }
}

fn dependency(subject: &str, ids: &[&str]) -> ConstraintSpec {
    ConstraintSpec::Dependency {
        subject: Some(subject.into()),
        ids: ids.iter().map(|&id| id.into()).collect(),
    }
}

fn at_most(limit: usize, ids: &[&str]) -> ConstraintSpec {
    ConstraintSpec::AtMost {
        subject: None,
        limit: limit.to_string(),
        ids: ids.iter().map(|&id| id.into()).collect(),
    }
}

/// Solve and return the selected identifiers sorted by id.
fn solve(
    entities: Vec<Entity>,
    constraints: Vec<ConstraintSpec>,
) -> Result<Vec<String>, SolveError> {
    let mut solver = Solver::new(entities, constraints)?;
    let selection = solver.solve(&CancelToken::never())?;
    let mut ids: Vec<String> = selection
        .iter()
        .map(|e| e.id.as_str().to_string())
        .collect();
    ids.sort();
    Ok(ids)
}

fn expect_unsat(
    entities: Vec<Entity>,
    constraints: Vec<ConstraintSpec>,
) -> NotSatisfiable {
    match solve(entities, constraints) {
        Err(SolveError::NotSatisfiable(unsat)) => unsat,
        other => panic!("expected NotSatisfiable, found {other:?}"),
    }
}

#[test]
fn test_no_entities_no_constraints() {
    assert_eq!(solve(vec![], vec![]).unwrap(), Vec::<String>::new());
}

#[test]
fn test_unnecessary_entity_is_not_installed() {
    assert_eq!(solve(vec![entity("a")], vec![]).unwrap(), Vec::<String>::new());
}

#[test]
fn test_single_mandatory_entity_is_installed() {
    let selection = solve(vec![entity("a")], vec![mandatory("a")]).unwrap();
    assert_eq!(selection, ["a"]);
}

#[test]
fn test_both_mandatory_and_prohibited_produce_error() {
    let unsat = expect_unsat(
        vec![entity("a")],
        vec![mandatory("a"), prohibited("a")],
    );
    assert_eq!(
        unsat.0,
        vec![Constraint::mandatory("a"), Constraint::prohibited("a")]
    );
}

#[test]
fn test_dependency_is_installed() {
    let selection = solve(
        vec![entity("a"), entity("b")],
        vec![mandatory("b"), dependency("b", &["a"])],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b"]);
}

#[test]
fn test_transitive_dependency_is_installed() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("c")],
        vec![
            dependency("b", &["a"]),
            mandatory("c"),
            dependency("c", &["b"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "c"]);
}

#[test]
fn test_both_dependencies_are_installed() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("c")],
        vec![
            mandatory("c"),
            dependency("c", &["a"]),
            dependency("c", &["b"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "c"]);
}

#[test]
fn test_solution_with_first_dependency_is_selected() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("c")],
        vec![
            conflict("b", "a"),
            mandatory("c"),
            dependency("c", &["a", "b"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "c"]);
}

#[test]
fn test_solution_with_only_first_dependency_is_selected() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("c")],
        vec![mandatory("c"), dependency("c", &["a", "b"])],
    )
    .unwrap();
    assert_eq!(selection, ["a", "c"]);
}

#[test]
fn test_solution_with_first_dependency_is_selected_reversed() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("c")],
        vec![
            conflict("b", "a"),
            mandatory("c"),
            dependency("c", &["b", "a"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["b", "c"]);
}

#[test]
fn test_two_mandatory_but_conflicting_entities() {
    let unsat = expect_unsat(
        vec![entity("a"), entity("b")],
        vec![mandatory("a"), mandatory("b"), conflict("b", "a")],
    );
    assert_eq!(
        unsat.0,
        vec![
            Constraint::mandatory("a"),
            Constraint::mandatory("b"),
            Constraint::conflict("b", "a"),
        ]
    );
}

#[test]
fn test_irrelevant_dependencies_do_not_influence_search_order() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("x"), entity("y")],
        vec![
            dependency("a", &["x", "y"]),
            mandatory("b"),
            dependency("b", &["y", "x"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["b", "y"]);
}

#[test]
fn test_cardinality_constraint_prevents_resolution() {
    let unsat = expect_unsat(
        vec![entity("a"), entity("x"), entity("y")],
        vec![
            mandatory("a"),
            dependency("a", &["x", "y"]),
            at_most(1, &["x", "y"]),
            mandatory("x"),
            mandatory("y"),
        ],
    );
    assert_eq!(
        unsat.0,
        vec![
            Constraint::at_most(1, ["x", "y"]),
            Constraint::mandatory("x"),
            Constraint::mandatory("y"),
        ]
    );
}

#[test]
fn test_unsat_core_is_locally_minimal() {
    // Dropping any single reported constraint leaves a satisfiable rest.
    let entities = || vec![entity("a"), entity("x"), entity("y")];
    let constraints = || {
        vec![
            mandatory("a"),
            dependency("a", &["x", "y"]),
            at_most(1, &["x", "y"]),
            mandatory("x"),
            mandatory("y"),
        ]
    };
    let unsat = expect_unsat(entities(), constraints());
    assert_eq!(unsat.len(), 3);
    // The reported constraints sit at input positions 2, 3, and 4.
    for removed in [2usize, 3, 4] {
        let mut remaining = constraints();
        remaining.remove(removed);
        assert!(
            solve(entities(), remaining).is_ok(),
            "removing constraint {removed} should leave a satisfiable set"
        );
    }
}

#[test]
fn test_cardinality_constraint_forces_alternative() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("x"), entity("y")],
        vec![
            mandatory("a"),
            dependency("a", &["x", "y"]),
            at_most(1, &["x", "y"]),
            mandatory("b"),
            dependency("b", &["y"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "y"]);
}

#[test]
fn test_two_dependencies_satisfied_by_one_entity() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("x"), entity("y")],
        vec![
            mandatory("a"),
            dependency("a", &["y"]),
            mandatory("b"),
            dependency("b", &["x", "y"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "y"]);
}

#[test]
fn test_shared_entity_beats_later_candidates() {
    let selection = solve(
        vec![
            entity("a"),
            entity("b"),
            entity("x"),
            entity("y"),
            entity("z"),
            entity("m"),
        ],
        vec![
            mandatory("a"),
            dependency("a", &["y", "z", "m"]),
            mandatory("b"),
            dependency("b", &["x", "y"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "y"]);
}

#[test]
fn test_result_size_larger_than_minimum_due_to_preference() {
    let selection = solve(
        vec![entity("a"), entity("b"), entity("x"), entity("y")],
        vec![
            mandatory("a"),
            dependency("a", &["x", "y"]),
            mandatory("b"),
            dependency("b", &["y"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "b", "x", "y"]);
}

#[test]
fn test_only_the_least_preferable_choice_is_acceptable() {
    let selection = solve(
        vec![
            entity("a"),
            entity("a1"),
            entity("a2"),
            entity("b"),
            entity("b1"),
            entity("b2"),
            entity("c"),
            entity("c1"),
            entity("c2"),
        ],
        vec![
            mandatory("a"),
            dependency("a", &["a1", "a2"]),
            conflict("a1", "c1"),
            conflict("a1", "c2"),
            conflict("a2", "c1"),
            mandatory("b"),
            dependency("b", &["b1", "b2"]),
            conflict("b1", "c1"),
            conflict("b1", "c2"),
            conflict("b2", "c1"),
            mandatory("c"),
            dependency("c", &["c1", "c2"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "a2", "b", "b2", "c", "c2"]);
}

#[test]
fn test_preferences_respected_with_multiple_dependencies_per_entity() {
    let selection = solve(
        vec![
            entity("a"),
            entity("x1"),
            entity("x2"),
            entity("y1"),
            entity("y2"),
        ],
        vec![
            mandatory("a"),
            dependency("a", &["x1", "x2"]),
            dependency("a", &["y1", "y2"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["a", "x1", "y1"]);
}

#[test]
fn test_dependency_without_candidates_is_unsatisfiable_when_required() {
    let unsat = expect_unsat(
        vec![entity("a")],
        vec![mandatory("a"), dependency("a", &[])],
    );
    assert!(unsat
        .0
        .contains(&Constraint::dependency("a", Vec::<&str>::new())));
}

#[test]
fn test_virtual_subject_anchors_a_requirement() {
    // A mandatory virtual subject pulls in entities through its dependency
    // even though no entity carries that identifier.
    let selection = solve(
        vec![entity("app-1"), entity("app-2")],
        vec![
            mandatory("require-app"),
            dependency("require-app", &["app-1", "app-2"]),
        ],
    )
    .unwrap();
    assert_eq!(selection, ["app-1"]);
}

#[test]
fn test_duplicate_identifier_is_rejected() {
    let err = Solver::new(vec![entity("a"), entity("a")], vec![]).unwrap_err();
    assert_eq!(err, SolveError::DuplicateIdentifier("a".into()));
}

#[test]
fn test_solve_is_deterministic() {
    let build = || {
        (
            vec![
                entity("a"),
                entity("a1"),
                entity("a2"),
                entity("b"),
                entity("b1"),
                entity("b2"),
                entity("c"),
                entity("c1"),
                entity("c2"),
            ],
            vec![
                mandatory("a"),
                dependency("a", &["a1", "a2"]),
                conflict("a1", "c1"),
                conflict("a1", "c2"),
                conflict("a2", "c1"),
                mandatory("b"),
                dependency("b", &["b1", "b2"]),
                conflict("b1", "c1"),
                conflict("b1", "c2"),
                conflict("b2", "c1"),
                mandatory("c"),
                dependency("c", &["c1", "c2"]),
            ],
        )
    };
    let (entities, constraints) = build();
    let first = solve(entities, constraints).unwrap();
    let (entities, constraints) = build();
    let second = solve(entities, constraints).unwrap();
    assert_eq!(first, second);

    // Unsatisfiable outcomes report identical constraint lists too.
    let unsat_input = || {
        (
            vec![entity("a"), entity("x"), entity("y")],
            vec![
                mandatory("a"),
                dependency("a", &["x", "y"]),
                at_most(1, &["x", "y"]),
                mandatory("x"),
                mandatory("y"),
            ],
        )
    };
    let (entities, constraints) = unsat_input();
    let first = expect_unsat(entities, constraints);
    let (entities, constraints) = unsat_input();
    let second = expect_unsat(entities, constraints);
    assert_eq!(first, second);
}

#[test]
fn test_solution_invariants_hold() {
    // Anchor necessity, dependency closure, at-most bounds, and conflict
    // exclusion checked programmatically on one composite scenario.
    let entities = vec![
        entity("a"),
        entity("b"),
        entity("x"),
        entity("y"),
        entity("z"),
    ];
    let constraints = vec![
        mandatory("a"),
        dependency("a", &["x", "y"]),
        mandatory("b"),
        dependency("b", &["z"]),
        at_most(1, &["x", "z"]),
        conflict("x", "y"),
    ];
    let selection = solve(entities, constraints).unwrap();
    let selected = |id: &str| selection.iter().any(|s| s == id);

    assert!(selected("a"), "anchors must be selected");
    assert!(selected("b"), "anchors must be selected");
    assert!(
        selected("x") || selected("y"),
        "dependency closure must hold"
    );
    assert!(selected("z"), "dependency closure must hold");
    assert!(
        [selected("x"), selected("z")].iter().filter(|&&v| v).count() <= 1,
        "at-most bound must hold"
    );
    assert!(
        !(selected("x") && selected("y")),
        "conflicting entities must not coexist"
    );
}

#[test]
fn test_cancelled_solve_reports_no_selection() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut solver = Solver::new(
        vec![entity("a")],
        vec![mandatory("a")],
    )
    .unwrap();
    assert_eq!(solver.solve(&cancel), Err(SolveError::Cancelled));
}

/// Collects formatted trace lines behind a shared handle.
#[derive(Default, Clone)]
struct CollectingTracer {
    lines: Rc<RefCell<Vec<String>>>,
}

impl Tracer for CollectingTracer {
    fn trace(&mut self, event: &TraceEvent) {
        self.lines.borrow_mut().push(event.to_string());
    }
}

#[test]
fn test_tracer_records_branch_decisions() {
    let tracer = CollectingTracer::default();
    let lines = Rc::clone(&tracer.lines);
    let mut solver = Solver::builder()
        .with_input(
            vec![entity("a"), entity("b"), entity("c")],
            vec![
                conflict("b", "a"),
                mandatory("c"),
                dependency("c", &["a", "b"]),
            ],
        )
        .with_tracer(tracer)
        .build()
        .unwrap();
    solver.solve(&CancelToken::never()).unwrap();

    let lines = lines.borrow();
    assert!(
        lines.iter().any(|l| l.contains("(anchor;")),
        "expected an anchor decision in {lines:?}"
    );
    assert!(
        lines.iter().any(|l| l.contains("candidate 0 of c")),
        "expected a candidate decision in {lines:?}"
    );
}

#[test]
fn test_logging_tracer_reproduces_branch_order() {
    let tracer = CollectingTracer::default();
    let lines = Rc::clone(&tracer.lines);
    let build = |tracer: CollectingTracer| {
        Solver::builder()
            .with_input(
                vec![entity("a"), entity("b"), entity("x"), entity("y")],
                vec![
                    mandatory("a"),
                    dependency("a", &["x", "y"]),
                    mandatory("b"),
                    dependency("b", &["y"]),
                ],
            )
            .with_tracer(tracer)
            .build()
            .unwrap()
    };
    build(tracer).solve(&CancelToken::never()).unwrap();
    let first: Vec<String> = lines.borrow().clone();

    let tracer = CollectingTracer::default();
    let lines = Rc::clone(&tracer.lines);
    build(tracer).solve(&CancelToken::never()).unwrap();
    assert_eq!(first, *lines.borrow());
}

#[test]
fn test_builders_compose_end_to_end() {
    // A catalog-shaped universe resolved through builders only: a filter
    // dependency from a mandatory virtual subject, and per-package
    // uniqueness via group-by.
    let versioned = |id: &str, package: &str, version: &str| {
        Entity::new(id)
            .with_property("package", [package])
            .with_property("version", [version])
    };
    let entities = vec![
        versioned("app-1.0.0", "app", "1.0.0"),
        versioned("app-2.0.0", "app", "2.0.0"),
        versioned("lib-1.0.0", "lib", "1.0.0"),
    ];
    let constraints = vec![
        ConstraintSpec::Mandatory {
            subject: "require-app".into(),
        },
        ConstraintSpec::Filter {
            filter: SelectorExpression::new(
                r#"any(Entity.Properties["package"], # == "app")"#,
            ),
            sort: Some(SortExpression::new(
                r#"-1 * SemverCompare(EntityOne.Properties["version"][0], EntityTwo.Properties["version"][0])"#,
            )),
            constraint: Box::new(ConstraintSpec::Dependency {
                subject: Some("require-app".into()),
                ids: vec![],
            }),
        },
        ConstraintSpec::GroupBy {
            group_by: GroupByExpression::new(r#"Entity.Properties["package"]"#),
            sort: None,
            subject_format: Some("{}-uniqueness".to_string()),
            constraint: Box::new(ConstraintSpec::AtMost {
                subject: None,
                limit: "1".to_string(),
                ids: vec![],
            }),
        },
    ];
    let selection = solve(entities, constraints).unwrap();
    // The highest version of app is preferred; lib is not required.
    assert_eq!(selection, ["app-2.0.0"]);
}

/// Run the internal pipeline over already-expanded constraints.
fn resolve_ids(
    entities: Vec<Entity>,
    constraints: Vec<Constraint>,
) -> Result<Vec<String>, SolveError> {
    let universe = EntityUniverse::new(entities, Vec::new())?;
    let mut tracer = DefaultTracer;
    let selected = resolve(&universe, constraints, &mut tracer, &CancelToken::never())?;
    let mut ids: Vec<String> = selected
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    ids.sort();
    Ok(ids)
}

#[test]
fn test_and_combinator_requires_all_clauses() {
    let selection = resolve_ids(
        vec![entity("p"), entity("q")],
        vec![Constraint::And(vec![
            Constraint::mandatory("p"),
            Constraint::dependency("p", ["q"]),
        ])],
    )
    .unwrap();
    assert_eq!(selection, ["p", "q"]);
}

#[test]
fn test_or_combinator_requires_one_clause() {
    let selection = resolve_ids(
        vec![entity("p"), entity("q")],
        vec![Constraint::Or(vec![
            Constraint::mandatory("p"),
            Constraint::mandatory("q"),
        ])],
    )
    .unwrap();
    assert_eq!(selection.len(), 1);
}

#[test]
fn test_not_combinator_excludes_subject() {
    let selection = resolve_ids(
        vec![entity("p")],
        vec![Constraint::Not(Box::new(Constraint::mandatory("p")))],
    )
    .unwrap();
    assert_eq!(selection, Vec::<String>::new());
}
