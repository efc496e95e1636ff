use std::collections::BTreeMap;
use std::sync::Arc;

use kome_application::MessageRenderer;
use kome_domain::PublishContext;
use serde_json::Value;

/// Returns the default deterministic Markdown renderer.
///
/// Output depends only on the context, with keys in sorted order; the
/// publish idempotence relies on identical metadata rendering identically.
pub fn default_renderer() -> MessageRenderer {
    Arc::new(render)
}

fn render(context: &PublishContext) -> String {
    let mut body = format!(
        "### Build status for {} @ `{}`\n",
        context.pull_request,
        context.sha.short()
    );

    render_section(&mut body, "Commit metadata", &context.commit_metadata);
    render_section(
        &mut body,
        "Pull request metadata",
        &context.pull_request_metadata,
    );

    body
}

fn render_section(body: &mut String, title: &str, metadata: &BTreeMap<String, Value>) {
    if metadata.is_empty() {
        return;
    }

    body.push_str("\n#### ");
    body.push_str(title);
    body.push('\n');
    for (key, value) in metadata {
        body.push_str("- **");
        body.push_str(key);
        body.push_str("**: ");
        body.push_str(render_value(value).as_str());
        body.push('\n');
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kome_domain::{CommitSha, PublishContext, PullRequestRef};
    use serde_json::json;

    use super::default_renderer;

    fn context(commit_metadata: BTreeMap<String, serde_json::Value>) -> PublishContext {
        PublishContext {
            commit_metadata,
            pull_request_metadata: BTreeMap::from([(
                "head".to_owned(),
                json!("abc1234def"),
            )]),
            sha: CommitSha::new("abc1234def").unwrap_or_else(|_| unreachable!()),
            pull_request: PullRequestRef::new("octo", "kome", 7)
                .unwrap_or_else(|_| unreachable!()),
        }
    }

    #[test]
    fn identical_context_renders_identical_text() {
        let renderer = default_renderer();
        let metadata = BTreeMap::from([
            ("build".to_owned(), json!({"status": "passed"})),
            ("coverage".to_owned(), json!("93%")),
        ]);

        assert_eq!(
            renderer(&context(metadata.clone())),
            renderer(&context(metadata))
        );
    }

    #[test]
    fn sections_render_keys_in_sorted_order() {
        let renderer = default_renderer();
        let metadata = BTreeMap::from([
            ("zeta".to_owned(), json!("last")),
            ("alpha".to_owned(), json!("first")),
        ]);

        let body = renderer(&context(metadata));
        let alpha = body.find("alpha");
        let zeta = body.find("zeta");
        assert!(alpha.is_some());
        assert!(zeta.is_some());
        assert!(alpha < zeta);
        assert!(body.starts_with("### Build status for octo/kome#7 @ `abc1234`"));
    }

    #[test]
    fn empty_commit_section_is_skipped() {
        let renderer = default_renderer();
        let body = renderer(&context(BTreeMap::new()));
        assert!(!body.contains("Commit metadata"));
        assert!(body.contains("Pull request metadata"));
    }
}
