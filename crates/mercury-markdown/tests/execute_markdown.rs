//! End-to-end tests: Markdown in, executed Markdown out.

use std::fs;

use mercury_core::payload::mime;
use mercury_core::testing::{MockKernel, MockKernelProvider};
use mercury_core::{ExecuteConfig, MimeBundle, Payload, Pipeline};
use mercury_markdown::{MarkdownDocument, docname_for, execute};
use serde_json::json;
use tempfile::TempDir;

fn config(root: &TempDir) -> ExecuteConfig {
    ExecuteConfig {
        output_dir: root.path().join("_build").join("exec"),
        ..Default::default()
    }
}

#[test]
fn test_outputs_replace_directives() {
    let root = TempDir::new().expect("Failed to create temp dir");
    let provider = MockKernelProvider::new().with_kernel(
        MockKernel::new("python3")
            .on("print(x)", vec![Payload::stdout("1\n")])
            .on(
                "x",
                vec![Payload::display(
                    MimeBundle::new().with(mime::TEXT_HTML, "<b>1</b>").with(mime::TEXT_PLAIN, "1"),
                )],
            ),
    );
    let mut pipeline = Pipeline::new(&provider, &config(&root), root.path());

    let source = "\
# Demo

```{execute}
x = 1
```

```{execute}
:code-below:
print(x)
```

```{execute}
:hide-code:
x
```
";
    let doc = MarkdownDocument::parse_str(source).unwrap();
    let executed = execute(&mut pipeline, &doc, "demo").unwrap();

    let expected = "\
# Demo

```ipython3
x = 1
```

```
1
```

```ipython3
print(x)
```

<b>1</b>
";
    assert_eq!(executed.markdown, expected);
}

#[test]
fn test_selectors_vanish_and_download_links_resolve() {
    let root = TempDir::new().expect("Failed to create temp dir");
    let provider = MockKernelProvider::new().with_kernel(MockKernel::new("python3"));
    let mut pipeline = Pipeline::new(&provider, &config(&root), root.path());

    fs::create_dir(root.path().join("guide")).unwrap();
    let path = root.path().join("guide").join("intro.md");
    fs::write(
        &path,
        "```{kernel} python3\n:id: setup\n```\n\n```{execute}\n:hide-code:\na = 1\n```\n\n\
         [notebook](download:notebook/setup) [script](download:script/setup) [missing](download:script/nope)\n",
    )
    .unwrap();

    let doc = MarkdownDocument::read(&path).unwrap();
    let docname = docname_for(&path, root.path()).unwrap();
    let executed = execute(&mut pipeline, &doc, &docname).unwrap();

    assert!(!executed.markdown.contains("{kernel}"));
    assert!(!executed.markdown.contains("{execute}"));
    assert!(executed.markdown.contains("[notebook](/_build/exec/guide/setup.ipynb)"));
    assert!(executed.markdown.contains("[script](/_build/exec/guide/setup.py)"));
    assert!(executed.markdown.contains("[missing](download:script/nope)"));
    assert!(root.path().join("_build/exec/guide/setup.ipynb").exists());
}

#[test]
fn test_widget_state_appended_once() {
    let root = TempDir::new().expect("Failed to create temp dir");
    let provider = MockKernelProvider::new().with_kernel(
        MockKernel::new("python3")
            .with_widget_state(json!({"state": {"m": {}}}))
            .on(
                "slider",
                vec![Payload::display(
                    MimeBundle::new()
                        .with(mime::WIDGET_VIEW, json!({"model_id": "m"}))
                        .with(mime::TEXT_PLAIN, "IntSlider()"),
                )],
            ),
    );
    let mut pipeline = Pipeline::new(&provider, &config(&root), root.path());

    let doc = MarkdownDocument::parse_str("```{execute}\nslider\n```\n\n```{kernel}\n```\n\n```{execute}\nslider\n```\n")
        .unwrap();
    let executed = execute(&mut pipeline, &doc, "widgets").unwrap();

    assert_eq!(executed.markdown.matches(mime::WIDGET_VIEW).count(), 2);
    assert_eq!(executed.markdown.matches(mime::WIDGET_STATE).count(), 1);
    assert!(executed.markdown.trim_end().ends_with("</script>"));
}
