//! Image tag policies.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Timestamp layout of branch tags: `YYYY_MM_DD_HH_MM_SS`.
pub const TAG_TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Registries reject tags longer than this.
pub const MAX_TAG_LENGTH: usize = 128;

/// Length of `_YYYY_MM_DD_HH_MM_SS`.
const TIMESTAMP_SUFFIX_LENGTH: usize = 20;

/// How the publish tag is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagPolicy {
    /// `{branch}_{timestamp}` from the checked-out branch and the wall clock.
    BranchTimestamp,
    /// A fixed literal tag.
    Fixed(String),
}

impl TagPolicy {
    /// Render the tag. `branch` is only consulted for `BranchTimestamp`.
    pub fn render(&self, branch: Option<&str>, now: NaiveDateTime) -> Result<String> {
        match self {
            TagPolicy::BranchTimestamp => {
                let branch = branch
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInput("branch tag requested but no branch is known".into())
                    })?;
                Ok(branch_tag(branch, now))
            }
            TagPolicy::Fixed(tag) => {
                validate_tag(tag)?;
                Ok(tag.clone())
            }
        }
    }
}

/// Check a tag against the registry grammar `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return Err(Error::InvalidInput("tag is empty".into()));
    };
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return Err(Error::InvalidInput(format!(
            "tag {tag:?} must start with a letter, digit or underscore"
        )));
    }
    if let Some(bad) = chars.find(|c| !is_tag_char(*c)) {
        return Err(Error::InvalidInput(format!(
            "tag {tag:?} contains {bad:?}; only [A-Za-z0-9_.-] are allowed"
        )));
    }
    if tag.len() > MAX_TAG_LENGTH {
        return Err(Error::InvalidInput(format!(
            "tag is {} characters long; the limit is {MAX_TAG_LENGTH}",
            tag.len()
        )));
    }
    Ok(())
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Build `{branch}_{YYYY_MM_DD_HH_MM_SS}`. The branch part is trimmed so the
/// tag stays within [`MAX_TAG_LENGTH`] and never starts with `.` or `-`.
pub fn branch_tag(branch: &str, now: NaiveDateTime) -> String {
    let mut component = sanitize_tag_component(branch);
    component.truncate(MAX_TAG_LENGTH - TIMESTAMP_SUFFIX_LENGTH);
    if component.starts_with(['.', '-']) {
        component.replace_range(..1, "_");
    }
    format!("{}_{}", component, now.format(TAG_TIMESTAMP_FORMAT))
}

/// Registry tags only allow `[A-Za-z0-9_.-]`; anything else (e.g. the `/` in
/// `feature/login`) becomes `-`.
pub fn sanitize_tag_component(input: &str) -> String {
    input
        .chars()
        .map(|c| if is_tag_char(c) { c } else { '-' })
        .collect()
}
