use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Window over a shared backing string
///
/// Bug reports are tens of megabytes; slicing them into sections and lines
/// through `TextView`s keeps a single copy of the text alive. Sub-views are
/// offset arithmetic over the same `Arc<str>`. An owned copy is only built
/// when [`TextView::to_shared`] is called, and then at most once.
///
/// Offsets are byte offsets into the view and must fall on UTF-8 character
/// boundaries, as with `str` slicing.
///
/// Equality and hashing look at the referenced characters only, so views
/// over different backing strings compare equal when their text is equal.
#[derive(Clone)]
pub struct TextView {
    backing: Arc<str>,
    start: usize,
    end: usize,
    materialized: OnceLock<Arc<str>>,
}

impl TextView {
    /// View over the whole of `text`
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let backing = text.into();
        let end = backing.len();
        Self::from_parts(backing, 0, end)
    }

    /// View over `backing[start..end]`
    ///
    /// Panics if the range is out of bounds or splits a character.
    pub fn from_parts(backing: Arc<str>, start: usize, end: usize) -> Self {
        assert!(
            start <= end && backing.get(start..end).is_some(),
            "invalid text view range {start}..{end} over {} bytes",
            backing.len()
        );
        Self {
            backing,
            start,
            end,
            materialized: OnceLock::new(),
        }
    }

    /// Length of the view in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Borrow the referenced text without copying
    pub fn as_str(&self) -> &str {
        &self.backing[self.start..self.end]
    }

    /// Character starting at byte offset `index` of this view
    pub fn char_at(&self, index: usize) -> Option<char> {
        self.as_str().get(index..)?.chars().next()
    }

    /// Sub-view `[start, end)` relative to this view
    ///
    /// Panics on an invalid range, like `str` indexing.
    pub fn sub_view(&self, start: usize, end: usize) -> TextView {
        self.try_sub_view(start, end).unwrap_or_else(|| {
            panic!(
                "sub view {start}..{end} out of bounds for view of {} bytes",
                self.len()
            )
        })
    }

    /// Sub-view from `start` to the end of this view
    pub fn sub_view_from(&self, start: usize) -> TextView {
        self.sub_view(start, self.len())
    }

    /// Checked variant of [`TextView::sub_view`]
    pub fn try_sub_view(&self, start: usize, end: usize) -> Option<TextView> {
        if start > end || end > self.len() {
            return None;
        }
        self.as_str().get(start..end)?;
        Some(Self {
            backing: Arc::clone(&self.backing),
            start: self.start + start,
            end: self.start + end,
            materialized: OnceLock::new(),
        })
    }

    /// Byte offset of the first occurrence of `needle`, relative to this view
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.as_str().find(needle)
    }

    /// Lines of this view as sub-views, without their line terminators
    pub fn lines(&self) -> impl Iterator<Item = TextView> + '_ {
        let text = self.as_str();
        let mut offset = 0;
        text.split_inclusive('\n').map(move |raw| {
            let start = offset;
            offset += raw.len();
            let line = raw.strip_suffix('\n').unwrap_or(raw);
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.sub_view(start, start + line.len())
        })
    }

    /// Sub-view with leading and trailing whitespace removed
    pub fn trim(&self) -> TextView {
        let text = self.as_str();
        let leading = text.len() - text.trim_start().len();
        let trimmed = text.trim();
        self.sub_view(leading, leading + trimmed.len())
    }

    /// Owned copy of the referenced text, built on first use and cached
    pub fn to_shared(&self) -> Arc<str> {
        Arc::clone(
            self.materialized
                .get_or_init(|| Arc::from(self.as_str())),
        )
    }

    /// Whether the owned copy has already been built
    pub fn is_materialized(&self) -> bool {
        self.materialized.get().is_some()
    }

    /// Whether this view and `other` share the same backing allocation
    pub fn shares_backing_with(&self, other: &TextView) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }
}

impl PartialEq for TextView {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for TextView {}

impl PartialEq<str> for TextView {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for TextView {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Hash for TextView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl AsRef<str> for TextView {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for TextView {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TextView {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for TextView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TextView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextView")
            .field("text", &self.as_str())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}
