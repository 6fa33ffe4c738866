use regex::Regex;
use std::sync::Arc;

use logsift_types::TextView;

/// Locator for the sections of an Android bug report
///
/// Holds the report text once; every lookup returns [`TextView`]s into it.
#[derive(Debug, Clone)]
pub struct BugReport {
    text: TextView,
}

impl BugReport {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: TextView::new(text),
        }
    }

    /// The whole report
    pub fn text(&self) -> &TextView {
        &self.text
    }

    /// Block delimited by `------ NAME ... ------` and the matching
    /// `------ ... 'NAME' ------` trailer, both lines included
    pub fn section(&self, name: &str) -> Option<TextView> {
        let name = regex::escape(name);
        let start = Regex::new(&format!(r"(?m)^-+ {name}.* -+$")).ok()?;
        let end = Regex::new(&format!(r"(?m)^-+ .*{name}.* -+$")).ok()?;

        let haystack = self.text.as_str();
        let start_match = start.find(haystack)?;
        let end_match = end.find_at(haystack, start_match.end())?;
        self.text
            .try_sub_view(start_match.start(), end_match.end())
    }

    /// Rest of the first line starting with `prefix`, trimmed
    pub fn property(&self, prefix: &str) -> Option<TextView> {
        let haystack = self.text.as_str();
        let start = if haystack.starts_with(prefix) {
            prefix.len()
        } else {
            haystack.find(&format!("\n{prefix}"))? + 1 + prefix.len()
        };
        let end = haystack[start..]
            .find('\n')
            .map_or(haystack.len(), |offset| start + offset);
        Some(self.text.try_sub_view(start, end)?.trim())
    }

    /// `[key]: [value]` pairs of the SYSTEM PROPERTIES section
    ///
    /// Keys and values keep their brackets, as `getprop` prints them.
    pub fn system_properties(&self) -> Vec<(TextView, TextView)> {
        let Some(section) = self.section("SYSTEM PROPERTIES") else {
            return Vec::new();
        };
        section
            .lines()
            .filter_map(|line| split_property(&line))
            .collect()
    }
}

fn split_property(line: &TextView) -> Option<(TextView, TextView)> {
    let text = line.as_str();
    if !text.starts_with('[') || !text.ends_with(']') {
        return None;
    }
    let colon = text.find("]:")? + 1;
    let key = line.sub_view(0, colon);
    let value = line.sub_view_from(colon + 1).trim();
    if key.len() < 3 || value.len() < 3 || !value.as_str().starts_with('[') {
        return None;
    }
    Some((key, value))
}
