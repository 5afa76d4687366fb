//! Coverage/import graph construction tests.

use std::path::Path;

use stexmap_core::coverage::{build_graph, CoverageMode, CyclePolicy, GraphOptions, NodeKey};
use stexmap_core::report::DiagnosticKind;
use stexmap_core::{FileId, Harvester, InMemoryProvider, Report};

fn provider(files: &[(&str, &str)]) -> InMemoryProvider {
    let mut p = InMemoryProvider::new();
    for (path, text) in files {
        p.insert(format!("/mh/{}", path), *text);
    }
    p
}

fn harvest<'p>(p: &'p InMemoryProvider, report: &mut Report) -> Harvester<'p> {
    let mut harvester = Harvester::new(p, Path::new("/mh"), report).expect("corpus discovery");
    harvester.load_all(None, report);
    harvester.compile(report);
    harvester
}

fn root_of(h: &Harvester, path: &str) -> FileId {
    h.find_loaded(Path::new(path)).expect("root document loaded")
}

const TWO_CHAPTERS: &[(&str, &str)] = &[
    ("r/.git/HEAD", ""),
    (
        "r/source/root.tex",
        "\\begin{omgroup}{Ch1}\\mhinputref{a}\\end{omgroup}\\begin{omgroup}{Ch2}\\mhinputref{b}\\end{omgroup}",
    ),
    ("r/source/a.tex", "\\covereduptohere\n"),
    ("r/source/b.tex", "\n"),
];

#[test]
fn coverage_marker_splits_covered_from_uncovered() {
    let p = provider(TWO_CHAPTERS);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);

    let ch1 = graph.node_by_label("Ch1").expect("Ch1 node");
    let ch2 = graph.node_by_label("Ch2").expect("Ch2 node");
    let a = graph.node_by_label("r/a").expect("node for file a");
    let b = graph.node_by_label("r/b").expect("node for file b");

    assert!(ch1.covered, "Ch1 is discovered before the marker fires");
    assert!(a.covered, "file a is discovered before its own marker");
    assert!(!ch2.covered, "Ch2 is discovered after the marker fired");
    assert!(!b.covered);
}

#[test]
fn covered_only_mode_stops_at_the_marker() {
    let p = provider(TWO_CHAPTERS);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(
        &h.files,
        root,
        GraphOptions {
            mode: CoverageMode::CoveredOnly,
            cycle_policy: CyclePolicy::FatalBranch,
        },
        &mut report,
    );

    // root, Ch1 and a were discovered before the stop signal; the state
    // built so far is preserved, nothing after the marker is visited
    assert!(graph.node_by_label("Ch1").is_some());
    assert!(graph.node_by_label("r/a").is_some());
    assert!(graph.node_by_label("Ch2").is_none());
    assert!(graph.node_by_label("r/b").is_none());
}

#[test]
fn self_inclusion_terminates_with_one_cycle_error() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        ("r/source/x.tex", "\\mhinputref{x}\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/x.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);

    assert_eq!(report.count_kind(DiagnosticKind::CycleError), 1);
    // the edge is still recorded
    assert_eq!(graph.edges.len(), 1);
}

#[test]
fn transitive_inclusion_cycle_is_detected_once() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        ("r/source/x.tex", "\\mhinputref{y}\n"),
        ("r/source/y.tex", "\\mhinputref{x}\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/x.tex");

    build_graph(&h.files, root, GraphOptions::default(), &mut report);
    assert_eq!(report.count_kind(DiagnosticKind::CycleError), 1);
}

#[test]
fn cycle_policy_skip_downgrades_to_silent() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        ("r/source/x.tex", "\\mhinputref{x}\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/x.tex");

    build_graph(
        &h.files,
        root,
        GraphOptions {
            mode: CoverageMode::Full,
            cycle_policy: CyclePolicy::Skip,
        },
        &mut report,
    );
    assert_eq!(report.count_kind(DiagnosticKind::CycleError), 0);
}

#[test]
fn diamond_reinclusion_is_not_a_cycle() {
    // root includes a and b; both include shared -- a diamond, no cycle
    let p = provider(&[
        ("r/.git/HEAD", ""),
        ("r/source/root.tex", "\\mhinputref{a}\\mhinputref{b}\n"),
        ("r/source/a.tex", "\\mhinputref{shared}\n"),
        ("r/source/b.tex", "\\mhinputref{shared}\n"),
        ("r/source/shared.tex", "\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);
    assert_eq!(report.count_kind(DiagnosticKind::CycleError), 0);
    // both edges into shared are recorded (edges are not deduplicated)
    let shared = h.find_loaded(Path::new("/mh/r/source/shared.tex")).unwrap();
    let shared_key = NodeKey {
        file: shared,
        node: h.files[shared.0].tree.root(),
    };
    let into_shared = graph
        .edges
        .iter()
        .filter(|e| e.target == Some(shared_key))
        .count();
    assert_eq!(into_shared, 2);
}

#[test]
fn unresolved_target_is_reported_and_dropped() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        ("r/source/root.tex", "\\mhinputref{missing}\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);
    assert_eq!(report.count_kind(DiagnosticKind::MissingFile), 1);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].target, None);
    // dropped from the rendered form
    let json = graph.to_json();
    assert_eq!(json["edges"].as_array().unwrap().len(), 0);
}

#[test]
fn single_omgroup_file_is_merged_into_its_omgroup() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        (
            "r/source/root.tex",
            "\\begin{omgroup}{Top}\\mhinputref{m}\\end{omgroup}",
        ),
        (
            "r/source/m.tex",
            "\\begin{omgroup}{Merged}\\end{omgroup}",
        ),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);

    let m = h.find_loaded(Path::new("/mh/r/source/m.tex")).unwrap();
    let m_key = NodeKey {
        file: m,
        node: h.files[m.0].tree.root(),
    };
    assert!(
        !graph.node(m_key).expect("file node exists").alive,
        "a file wrapping a single omgroup is suppressed"
    );
    let merged = graph.node_by_label("Merged").expect("omgroup node");
    assert!(merged.alive);
    // the in-edge of the file was redirected to the omgroup
    assert!(graph
        .edges
        .iter()
        .any(|e| e.target == Some(merged.key) && e.origin.is_none()));
}

#[test]
fn blind_omgroups_are_skipped() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        (
            "r/source/root.tex",
            "\\begin{blindomgroup}{Front}\\mhinputref{a}\\end{blindomgroup}\\begin{omgroup}{Ch1}\\end{omgroup}",
        ),
        ("r/source/a.tex", "\n"),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);
    assert!(graph.node_by_label("Front").is_none());
    assert!(graph.node_by_label("Ch1").is_some());
    // nothing below the blind omgroup is traversed
    assert!(graph.node_by_label("r/a").is_none());
}

#[test]
fn import_edges_have_import_style() {
    let p = provider(&[
        ("r/.git/HEAD", ""),
        (
            "r/source/root.tex",
            "\\begin{omgroup}{Ch1}\\mhinputref{doc}\\end{omgroup}",
        ),
        (
            "r/source/doc.tex",
            "\\begin{module}[id=doc]\\gimport{sig}\\end{module}",
        ),
        (
            "r/source/sig.tex",
            "\\begin{modsig}{sig}\\symi{x}\\end{modsig}",
        ),
    ]);
    let mut report = Report::new();
    let h = harvest(&p, &mut report);
    let root = root_of(&h, "/mh/r/source/root.tex");

    let graph = build_graph(&h.files, root, GraphOptions::default(), &mut report);
    let json = graph.to_json();
    let edges = json["edges"].as_array().unwrap();
    let styles: Vec<&str> = edges
        .iter()
        .map(|e| e["style"].as_str().unwrap())
        .collect();
    assert!(styles.contains(&"include"));
    assert!(styles.contains(&"import"));
}
