use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::filter::{FilterError, FilterSpec};

/// Errors reading or writing filter files
#[derive(Debug, thiserror::Error)]
pub enum FilterFileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{group}:{line}: {source}")]
    Filter {
        group: String,
        line: usize,
        #[source]
        source: FilterError,
    },

    #[error("no filter group named {0}")]
    UnknownGroup(String),
}

/// Named, ordered list of filters, usually backed by a file
#[derive(Debug, Clone)]
pub struct FilterGroup {
    name: String,
    filters: Vec<Arc<FilterSpec>>,
    file: Option<PathBuf>,

    /// Serialized filters as of the last open or save; `None` for new groups
    saved: Option<Vec<String>>,
}

impl FilterGroup {
    fn new(name: String) -> Self {
        Self {
            name,
            filters: Vec::new(),
            file: None,
            saved: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &[Arc<FilterSpec>] {
        &self.filters
    }

    /// File the group was opened from or last saved to
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn serialized(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.to_line()).collect()
    }

    /// Whether the filters differ from what was last opened or saved
    pub fn is_changed(&self) -> bool {
        self.saved
            .as_ref()
            .is_none_or(|saved| *saved != self.serialized())
    }
}

/// Filter groups in the order they were opened or created
#[derive(Debug, Clone, Default)]
pub struct FilterGroups {
    groups: Vec<FilterGroup>,
}

impl FilterGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open each file as a group named after the file
    ///
    /// Blank lines are skipped. An error in any file stops the whole call,
    /// leaving groups opened before it in place.
    pub fn open_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), FilterFileError> {
        for path in paths {
            self.open_file(path.as_ref())?;
        }
        Ok(())
    }

    /// Open one filter file, replacing any group of the same name
    pub fn open_file(&mut self, path: &Path) -> Result<&FilterGroup, FilterFileError> {
        let text = fs::read_to_string(path).map_err(|source| FilterFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let index = self.load_group(group_name_for(path), &text)?;
        self.groups[index].file = Some(path.to_path_buf());
        Ok(&self.groups[index])
    }

    /// Open serialized filters as group `name`, replacing any group of that name
    pub fn open_str(&mut self, name: &str, text: &str) -> Result<&FilterGroup, FilterFileError> {
        let index = self.load_group(name.to_string(), text)?;
        Ok(&self.groups[index])
    }

    fn load_group(&mut self, name: String, text: &str) -> Result<usize, FilterFileError> {
        let filters = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                FilterSpec::from_line(line)
                    .map(Arc::new)
                    .map_err(|source| FilterFileError::Filter {
                        group: name.clone(),
                        line: i + 1,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(group = %name, filters = filters.len(), "Opened filter group");

        let mut group = FilterGroup::new(name);
        group.filters = filters;
        group.saved = Some(group.serialized());

        let index = match self.position(&group.name) {
            Some(index) => {
                self.groups[index] = group;
                index
            }
            None => {
                self.groups.push(group);
                self.groups.len() - 1
            }
        };
        Ok(index)
    }

    /// Write `group` to `path`, one filter per line
    ///
    /// The group then counts as unchanged and remembers `path` as its file.
    pub fn persist_group(&mut self, group: &str, path: &Path) -> Result<(), FilterFileError> {
        let index = self
            .position(group)
            .ok_or_else(|| FilterFileError::UnknownGroup(group.to_string()))?;
        let serialized = self.groups[index].serialized();

        fs::write(path, serialized.join("\n")).map_err(|source| FilterFileError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        let group = &mut self.groups[index];
        group.file = Some(path.to_path_buf());
        group.saved = Some(serialized);
        Ok(())
    }

    /// Append a filter, creating the group if needed
    pub fn add_filter(&mut self, group: &str, filter: Arc<FilterSpec>) {
        self.group_entry(group).filters.push(filter);
    }

    /// Append filters, creating the group if needed
    pub fn add_filters(&mut self, group: &str, filters: impl IntoIterator<Item = Arc<FilterSpec>>) {
        self.group_entry(group).filters.extend(filters);
    }

    /// Remove the filters at `indices`; out-of-range indices are ignored
    ///
    /// Returns the removed filters in ascending index order.
    pub fn delete_filters(&mut self, group: &str, indices: &[usize]) -> Vec<Arc<FilterSpec>> {
        let Some(index) = self.position(group) else {
            return Vec::new();
        };
        let filters = &mut self.groups[index].filters;

        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();

        // Back to front so earlier indices stay valid
        let mut deleted = Vec::with_capacity(indices.len());
        for i in indices.into_iter().rev() {
            if i < filters.len() {
                deleted.push(filters.remove(i));
            }
        }
        deleted.reverse();
        deleted
    }

    /// Move the filter at `from` so it lands before the filter now at `to`
    ///
    /// `to == len` moves it to the end.
    pub fn reorder_filters(&mut self, group: &str, from: usize, to: usize) {
        if from == to {
            return;
        }
        let Some(index) = self.position(group) else {
            return;
        };
        let filters = &mut self.groups[index].filters;
        if from >= filters.len() || to > filters.len() {
            return;
        }
        let dest = if to > from { to - 1 } else { to };
        let filter = filters.remove(from);
        filters.insert(dest, filter);
    }

    /// Create an empty group, suffixing the name with a number if taken
    ///
    /// Returns the name actually used.
    pub fn add_group(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 1;
        while self.position(&candidate).is_some() {
            candidate = format!("{name}{n}");
            n += 1;
        }
        self.groups.push(FilterGroup::new(candidate.clone()));
        candidate
    }

    pub fn delete_group(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.groups.remove(index);
                true
            }
            None => false,
        }
    }

    /// Names of groups that are new or differ from their file
    pub fn changed_groups(&self) -> Vec<String> {
        self.groups
            .iter()
            .filter(|group| group.is_changed())
            .map(|group| group.name.clone())
            .collect()
    }

    pub fn close_all(&mut self) {
        self.groups.clear();
    }

    pub fn group(&self, name: &str) -> Option<&FilterGroup> {
        self.groups.iter().find(|group| group.name == name)
    }

    pub fn groups(&self) -> &[FilterGroup] {
        &self.groups
    }

    /// Applied filters of every group, in group then list order
    ///
    /// This is the order a match pass gives precedence in.
    pub fn applied_filters(&self) -> Vec<Arc<FilterSpec>> {
        self.groups
            .iter()
            .flat_map(|group| group.filters.iter())
            .filter(|filter| filter.is_applied())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|group| group.name == name)
    }

    fn group_entry(&mut self, name: &str) -> &mut FilterGroup {
        let index = match self.position(name) {
            Some(index) => index,
            None => {
                self.groups.push(FilterGroup::new(name.to_string()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }
}

/// Group name for a filter file: its file name
pub fn group_name_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
