use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    File,
    Directory,
    Link,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Decoded as UTF-8; bytes that are not valid UTF-8 become U+FFFD, so
    /// such a name cannot be sent back to the server as is.
    pub name: String,
    pub entry_type: EntryType,
    pub size: Option<u64>,        // None when the server gave no usable size
    pub modified_at: Option<NaiveDateTime>, // Server-local time
    pub link_target: Option<String>, // Only set for links
}

impl Entry {
    pub fn new(name: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            name: name.into(),
            entry_type,
            size: None,
            modified_at: None,
            link_target: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_link(&self) -> bool {
        self.entry_type == EntryType::Link
    }

    /// `.` and `..` never reach callers.
    pub(crate) fn is_navigation(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}
