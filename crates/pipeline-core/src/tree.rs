/// Regular, non-executable file.
pub const TREE_MODE_FILE: &str = "100644";
pub const TREE_MODE_EXECUTABLE: &str = "100755";
pub const TREE_TYPE_BLOB: &str = "blob";

/// One file of a tree built for a single commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub content: Vec<u8>,
    pub mode: String,
    pub kind: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
            mode: TREE_MODE_FILE.to_string(),
            kind: TREE_TYPE_BLOB.to_string(),
        }
    }

    pub fn executable(mut self) -> Self {
        self.mode = TREE_MODE_EXECUTABLE.to_string();
        self
    }

    /// Content as text when it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}
