//! `<msg>` body reference rewriting (spec §4.7 step 3): per-item outputs
//! reference artifacts (screenshots, sub-logs) two levels up from their
//! own output directory; once artifacts are copied flat into the merged
//! report's directory under a `<process-prefix>-<filename>` rename
//! (spec §4.6/§4.7, `copy_output_artifacts`), every reference to one of
//! those filenames needs the same rename applied so the link still
//! resolves.

/// Rewrites every `src="..."` / `href="..."` occurrence in `text`:
/// strips one leading `../../`, then for any reference whose final path
/// segment names an artifact that was actually copied, inserts
/// `<prefix>-` immediately before that filename.
pub fn rewrite_references(text: &str, prefix: &str, copied_artifacts: &[String]) -> String {
    let stripped = text.replace("src=\"../../", "src=\"").replace("href=\"../../", "href=\"");
    if copied_artifacts.is_empty() {
        return stripped;
    }
    rewrite_attr(&rewrite_attr(&stripped, "src", prefix, copied_artifacts), "href", prefix, copied_artifacts)
}

fn rewrite_attr(text: &str, attr: &str, prefix: &str, copied_artifacts: &[String]) -> String {
    let needle = format!("{}=\"", attr);
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&needle) {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        out.push_str(&needle);
        let after_quote = &tail[needle.len()..];
        let Some(end) = after_quote.find('"') else {
            out.push_str(after_quote);
            rest = "";
            break;
        };
        let url = &after_quote[..end];
        out.push_str(&insert_prefix_if_copied(url, prefix, copied_artifacts));
        out.push('"');
        rest = &after_quote[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Renames `url`'s final path segment to `<prefix>-<segment>` when that
/// segment names a copied artifact, leaving any leading directory
/// portion and non-artifact references untouched.
fn insert_prefix_if_copied(url: &str, prefix: &str, copied_artifacts: &[String]) -> String {
    let (dir, file_name) = match url.rfind('/') {
        Some(pos) => (&url[..=pos], &url[pos + 1..]),
        None => ("", url),
    };
    if copied_artifacts.iter().any(|a| a == file_name) {
        format!("{dir}{prefix}-{file_name}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_leading_parent_escape_from_src() {
        let text = r#"<p>See <a href="../../log.html#t1">log</a></p>"#;
        let rewritten = rewrite_references(text, "3", &[]);
        assert_eq!(rewritten, r#"<p>See <a href="log.html#t1">log</a></p>"#);
    }

    #[test]
    fn inserts_prefix_before_a_copied_artifact_filename() {
        let text = r#"<img src="../screenshot.png"/>"#;
        let rewritten = rewrite_references(text, "3", &["screenshot.png".to_string()]);
        assert_eq!(rewritten, r#"<img src="../3-screenshot.png"/>"#);
    }

    #[test]
    fn leaves_references_to_uncopied_filenames_alone() {
        let text = r#"<img src="../other.png"/>"#;
        let rewritten = rewrite_references(text, "3", &["screenshot.png".to_string()]);
        assert_eq!(rewritten, text);
    }

    #[test]
    fn leaves_absolute_urls_untouched() {
        let text = r#"<a href="https://example.com/x">x</a>"#;
        assert_eq!(rewrite_references(text, "3", &["x".to_string()]), text);
    }
}
