//! Integration tests for the document pipeline.
//!
//! Drives whole documents through grouping, execution, extraction and
//! rendering against scripted kernels.

use std::fs;
use std::path::PathBuf;

use mercury_core::payload::mime;
use mercury_core::testing::{MockKernel, MockKernelProvider, MockResponse};
use mercury_core::{
    BlockPart, CodeBlock, DocNode, Error, ExecuteConfig, MimeBundle, Payload, Pipeline, PipelineContext,
    PipelineState, RenderFragment, UnitSelector,
};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

const PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// A source tree with an output directory inside it.
struct TestSite {
    root: TempDir,
}

impl TestSite {
    fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn config(&self) -> ExecuteConfig {
        ExecuteConfig {
            output_dir: self.root.path().join("_build").join("exec"),
            ..Default::default()
        }
    }

    fn out(&self, rel: &str) -> PathBuf {
        self.root.path().join("_build").join("exec").join(rel)
    }

    fn pipeline<'a>(&self, provider: &'a MockKernelProvider) -> Pipeline<&'a MockKernelProvider> {
        Pipeline::new(provider, &self.config(), self.root.path())
    }
}

fn block(source: &str) -> DocNode {
    DocNode::Block(CodeBlock::new(source))
}

fn selector(kernel: Option<&str>, id: Option<&str>) -> DocNode {
    DocNode::Selector(UnitSelector::new(kernel, id))
}

fn python() -> MockKernel {
    MockKernel::new("python3")
}

// =============================================================================
// Grouping and naming
// =============================================================================

#[test]
fn test_document_without_selectors_is_one_notebook() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);
    let mut ctx = PipelineContext::new("guide/intro", "python3");

    let doc = pipeline
        .run(&mut ctx, vec![block("a = 1"), block("b = 2"), block("a + b")])
        .unwrap();

    assert_eq!(doc.units.len(), 1);
    assert_eq!(doc.units[0].name, "intro");
    assert_eq!(doc.units[0].blocks, 0..3);
    assert_eq!(doc.blocks.len(), 3);
    assert_eq!(provider.log().executed(), ["a = 1", "b = 2", "a + b"]);
    assert_eq!(pipeline.state(), PipelineState::Done);
}

#[test]
fn test_selectors_start_new_sessions_with_generated_names() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python()).with_kernel(MockKernel::new("julia"));
    let mut pipeline = site.pipeline(&provider);
    let mut ctx = PipelineContext::new("intro", "python3");

    let doc = pipeline
        .run(
            &mut ctx,
            vec![
                block("1"),
                selector(Some("julia"), None),
                block("2"),
                selector(None, Some("demo")),
                block("3"),
                selector(None, None),
                block("4"),
            ],
        )
        .unwrap();

    let names: Vec<_> = doc.units.iter().map(|u| (u.name.as_str(), u.kernel.as_str())).collect();
    assert_eq!(
        names,
        [("intro", "python3"), ("intro_1", "julia"), ("demo", "python3"), ("intro_2", "python3")]
    );
    assert_eq!(provider.log().started(), 4);
    assert_eq!(provider.log().shut_down(), 4);
    for name in ["intro.ipynb", "intro_1.ipynb", "demo.ipynb", "intro_2.ipynb"] {
        assert!(site.out(name).exists(), "missing {}", name);
    }
}

#[test]
fn test_empty_selector_unit_produces_nothing() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);
    let mut ctx = PipelineContext::new("doc", "python3");

    let doc = pipeline
        .run(
            &mut ctx,
            vec![selector(None, Some("demo")), selector(None, None), block("x = 1")],
        )
        .unwrap();

    assert_eq!(doc.units.len(), 1);
    assert_eq!(doc.units[0].name, "doc");
    assert!(!site.out("demo.ipynb").exists());
    assert!(!site.out("demo.py").exists());
    assert_eq!(provider.log().started(), 1);
}

#[test]
fn test_rebuild_reproduces_names_and_files() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python().on(
        "plot()",
        vec![Payload::display(MimeBundle::new().with(mime::IMAGE_PNG, PNG))],
    ));
    let nodes = || vec![block("plot()"), selector(None, None), block("plot()")];

    let mut pipeline = site.pipeline(&provider);
    let first = pipeline.run(&mut PipelineContext::new("doc", "python3"), nodes()).unwrap();
    let second = pipeline.run(&mut PipelineContext::new("doc", "python3"), nodes()).unwrap();

    assert_eq!(first, second);
    assert!(site.out("doc_0.png").exists());
    assert!(site.out("doc_1_0.png").exists());
}

#[test]
fn test_explicit_id_reusing_a_name_fails_before_anything_runs() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);

    let err = pipeline
        .run(
            &mut PipelineContext::new("doc", "python3"),
            vec![block("first"), selector(None, Some("doc")), block("second")],
        )
        .unwrap_err();

    assert!(matches!(err.root(), Error::DuplicateUnit(name) if name == "doc"), "got {:?}", err);
    assert!(err.with_hint().contains(":id:"));
    assert_eq!(provider.log().started(), 0);
    assert!(!site.out("doc.py").exists());
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn test_generated_name_steps_over_earlier_explicit_id() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(
            &mut PipelineContext::new("doc", "python3"),
            vec![selector(None, Some("doc")), block("first"), selector(None, None), block("second")],
        )
        .unwrap();

    let names: Vec<_> = doc.units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["doc", "doc_1"]);
    assert_eq!(fs::read_to_string(site.out("doc.py")).unwrap(), "first");
    assert_eq!(fs::read_to_string(site.out("doc_1.py")).unwrap(), "second");
}

// =============================================================================
// Execution semantics
// =============================================================================

#[test]
fn test_traceback_rendered_and_execution_continues() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(
        python()
            .on(
                "1/0",
                vec![Payload::error(
                    "ZeroDivisionError",
                    "division by zero",
                    vec!["\x1b[0;31mZeroDivisionError\x1b[0m: division by zero".to_string()],
                )],
            )
            .on("print('next')", vec![Payload::stdout("next\n")]),
    );
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(
            &mut PipelineContext::new("doc", "python3"),
            vec![block("1/0"), block("print('next')")],
        )
        .unwrap();

    assert_eq!(
        doc.blocks[0].outputs,
        vec![RenderFragment::Literal {
            text: "ZeroDivisionError: division by zero".to_string(),
            language: Some("ipythontb".to_string()),
        }]
    );
    assert_eq!(
        doc.blocks[1].outputs,
        vec![RenderFragment::Literal {
            text: "next\n".to_string(),
            language: None,
        }]
    );
}

#[test]
fn test_unknown_kernel_fails_before_anything_runs() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);

    let err = pipeline
        .run(
            &mut PipelineContext::new("doc", "python3"),
            vec![block("1"), selector(Some("cobol"), None), block("2")],
        )
        .unwrap_err();

    assert!(matches!(&err, Error::KernelNotFound(k) if k == "cobol"));
    assert!(err.is_build_fatal());
    assert_eq!(provider.log().started(), 0);
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn test_session_failure_aborts_remaining_notebooks() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new()
        .with_kernel(python().on_response("crash()", MockResponse::Crash("kernel died".to_string())));
    let mut pipeline = site.pipeline(&provider);

    let err = pipeline
        .run(
            &mut PipelineContext::new("doc", "python3"),
            vec![block("ok"), block("crash()"), selector(None, None), block("later")],
        )
        .unwrap_err();

    assert!(err.to_string().contains("notebook 'doc' (block 2)"));
    assert!(!err.is_build_fatal());
    assert_eq!(provider.log().executed(), ["ok", "crash()"]);
    assert_eq!(provider.log().started(), 1);
    assert_eq!(provider.log().shut_down(), 1);
    assert!(!site.out("doc.ipynb").exists());
}

// =============================================================================
// Artifacts and rendering
// =============================================================================

#[test]
fn test_script_artifact_concatenates_blocks() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python().on("x + 1", vec![Payload::stdout("2\n")]));
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(
            &mut PipelineContext::new("guide/intro", "python3"),
            vec![block("x = 1"), block("x + 1")],
        )
        .unwrap();

    let script = site.out("guide/intro.py");
    assert_eq!(fs::read_to_string(&script).unwrap(), "x = 1\n\nx + 1");
    assert_eq!(doc.units[0].artifacts.script, script);
    assert_eq!(doc.units[0].script_uri, "/_build/exec/guide/intro.py");
    assert_eq!(doc.units[0].archive_uri, "/_build/exec/guide/intro.ipynb");
}

#[test]
fn test_image_priority_and_uri() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python().on(
        "fig",
        vec![Payload::display(
            MimeBundle::new().with(mime::IMAGE_PNG, PNG).with(mime::TEXT_PLAIN, "<Figure>"),
        )],
    ));
    let mut config = site.config();
    config.data_priority = vec![mime::TEXT_HTML.into(), mime::IMAGE_PNG.into(), mime::TEXT_PLAIN.into()];
    let mut pipeline = Pipeline::new(&provider, &config, site.root.path());

    let doc = pipeline
        .run(&mut PipelineContext::new("plots", "python3"), vec![block("x = 1"), block("fig")])
        .unwrap();

    assert_eq!(
        doc.blocks[1].outputs,
        vec![RenderFragment::Image {
            uri: "/_build/exec/plots_0.png".to_string(),
            mime: mime::IMAGE_PNG.to_string(),
        }]
    );
    assert!(site.out("plots_0.png").exists());
}

#[test]
fn test_source_gets_session_lexer() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(&mut PipelineContext::new("doc", "python3"), vec![block("x = 1")])
        .unwrap();

    match doc.blocks[0].parts()[..] {
        [BlockPart::Source(source)] => assert_eq!(source.language.as_deref(), Some("ipython3")),
        ref other => panic!("unexpected parts {:?}", other),
    }
}

#[test]
fn test_widget_state_aggregated_once_per_document() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new()
        .with_kernel(MockKernel::new("widgets").with_widget_state(json!({"state": {"m1": {}}})))
        .with_kernel(MockKernel::new("more").with_widget_state(json!({"state": {"m2": {}}})));
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(
            &mut PipelineContext::new("doc", "widgets"),
            vec![block("a"), selector(Some("more"), None), block("b")],
        )
        .unwrap();

    assert_eq!(
        doc.widget_state,
        Some(RenderFragment::WidgetState {
            state: json!({"state": {"m1": {}, "m2": {}}})
        })
    );
}

#[test]
fn test_no_widget_support_means_no_widget_fragment() {
    let site = TestSite::new();
    let provider = MockKernelProvider::new().with_kernel(python());
    let mut pipeline = site.pipeline(&provider);

    let doc = pipeline
        .run(&mut PipelineContext::new("doc", "python3"), vec![block("a")])
        .unwrap();

    assert_eq!(doc.widget_state, None);
}
