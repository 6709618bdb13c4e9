//! The default error page.
//!
//! A two-variable template rendered for every response that falls through
//! to the default error path. The compiled form is a process-wide
//! immutable value, ready before the first I/O thread starts.

use bytes::BytesMut;
use std::sync::LazyLock;

const ERROR_PAGE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>{{short_message}}</title><style>\
body{background:#2d3a2e;color:#dfe8df;font-family:sans-serif;\
text-align:center;margin:0;padding:0}\
main{display:flex;flex-direction:column;justify-content:center;height:100vh}\
h1{font-size:30px;font-weight:700;margin:0;text-shadow:0 1px 4px rgba(0,0,0,.5)}\
p{font-size:18px;line-height:24px;color:#9db49e}\
</style></head><body><main>\
<h1>{{short_message}}</h1>\
<p>{{long_message}}</p>\
</main></body></html>";

/// A template split at its variable sites so rendering is a handful of
/// buffer appends.
pub struct ErrorTemplate {
    segments: Vec<Segment>,
}

enum Segment {
    Literal(&'static str),
    ShortMessage,
    LongMessage,
}

impl ErrorTemplate {
    /// Splits `source` at every `{{short_message}}`/`{{long_message}}`
    /// site. Returns `None` when neither variable appears.
    pub fn compile(source: &'static str) -> Option<ErrorTemplate> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut variables = 0;
        loop {
            let short = rest.find("{{short_message}}");
            let long = rest.find("{{long_message}}");
            let (at, segment, site_len) = match (short, long) {
                (Some(s), Some(l)) if s < l => (s, Segment::ShortMessage, "{{short_message}}".len()),
                (Some(s), None) => (s, Segment::ShortMessage, "{{short_message}}".len()),
                (_, Some(l)) => (l, Segment::LongMessage, "{{long_message}}".len()),
                (None, None) => break,
            };
            if at > 0 {
                segments.push(Segment::Literal(&rest[..at]));
            }
            segments.push(segment);
            variables += 1;
            rest = &rest[at + site_len..];
        }
        if variables == 0 {
            return None;
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }
        Some(ErrorTemplate { segments })
    }

    /// Renders into `out`, replacing its contents.
    pub fn render_into(&self, out: &mut BytesMut, short_message: &str, long_message: &str) {
        out.clear();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.extend_from_slice(text.as_bytes()),
                Segment::ShortMessage => out.extend_from_slice(short_message.as_bytes()),
                Segment::LongMessage => out.extend_from_slice(long_message.as_bytes()),
            }
        }
    }
}

static ERROR_TEMPLATE: LazyLock<ErrorTemplate> =
    LazyLock::new(|| ErrorTemplate::compile(ERROR_PAGE).expect("builtin error page has variables"));

pub(crate) fn error_template() -> &'static ErrorTemplate {
    &ERROR_TEMPLATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_variables() {
        let mut out = BytesMut::new();
        error_template().render_into(&mut out, "Not Found", "It is gone.");
        let page = std::str::from_utf8(&out).unwrap();
        assert!(page.contains("<h1>Not Found</h1>"));
        assert!(page.contains("<p>It is gone.</p>"));
        assert!(!page.contains("{{"));
    }

    #[test]
    fn render_replaces_previous_contents() {
        let mut out = BytesMut::from(&b"stale"[..]);
        error_template().render_into(&mut out, "a", "b");
        assert!(!out.starts_with(b"stale"));
    }

    #[test]
    fn compile_rejects_variable_free_templates() {
        assert!(ErrorTemplate::compile("<html>static</html>").is_none());
    }
}
