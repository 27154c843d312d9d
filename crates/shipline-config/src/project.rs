//! Maven project descriptor lookups.

use crate::{ConfigError, ConfigResult};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// Comments, processing instructions and CDATA sections. Only CDATA text
// (group 1) is kept.
static MARKUP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<\?.*?\?>|<!\[CDATA\[(.*?)\]\]>").unwrap()
});

// Opening, closing and self-closing element tags. Quoted attribute values may
// contain `>`. Declarations such as `<!DOCTYPE` do not match.
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z_][\w.:-]*)(?:\s(?:[^>"']|"[^"]*"|'[^']*')*?)?(/?)>"#).unwrap()
});

/// Read the project's own `<artifactId>` from a `pom.xml`.
pub fn read_artifact_id(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Project {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    artifact_id(&content).ok_or_else(|| ConfigError::Project {
        path: path.display().to_string(),
        message: "no <artifactId> directly under <project>".to_string(),
    })
}

/// The `<artifactId>` that is a direct child of the root `<project>` element.
/// Artifact ids of the parent, dependencies and plugins are nested deeper and
/// are skipped.
pub fn artifact_id(xml: &str) -> Option<String> {
    let xml = MARKUP_REGEX.replace_all(xml, |caps: &regex::Captures| {
        caps.get(1).map(|text| escape_text(text.as_str())).unwrap_or_default()
    });
    let mut depth = 0usize;
    let mut value_start = None;

    for caps in TAG_REGEX.captures_iter(&xml) {
        let Some(tag) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();
        let self_closing = !caps[3].is_empty();
        let name = local_name(&caps[2]);

        if closing {
            if depth == 2 && name == "artifactId" {
                if let Some(start) = value_start.take() {
                    let value = unescape_text(xml[start..tag.start()].trim());
                    return Some(value).filter(|v| !v.is_empty());
                }
            }
            depth = depth.saturating_sub(1);
        } else if !self_closing {
            depth += 1;
            if depth == 1 && name != "project" {
                return None;
            }
            if depth == 2 && name == "artifactId" {
                value_start = Some(tag.end());
            }
        }
    }

    None
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
