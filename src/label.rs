//! The two label buckets images are sorted into.
//!
//! Every image lives in exactly one of two subdirectories of the root folder.
//! [`Label`] names the bucket, [`Buckets`] maps each label to its directory name.
//!
//! # Examples
//!
//! ```
//! use binsort::label::{Buckets, Label};
//!
//! let buckets = Buckets::default();
//! assert_eq!(buckets.dir_name(Label::Positive), "center");
//! assert_eq!(buckets.dir_name(Label::Negative), "not_center");
//! assert_eq!(Label::Positive.other(), Label::Negative);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One of the two mutually exclusive labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// The "yes" bucket (`center` by default).
    Positive,
    /// The "no" bucket (`not_center` by default).
    Negative,
}

impl Label {
    /// Both labels, positive first.
    pub const ALL: [Label; 2] = [Label::Positive, Label::Negative];

    /// Returns the opposite label.
    pub fn other(self) -> Label {
        match self {
            Label::Positive => Label::Negative,
            Label::Negative => Label::Positive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Positive => "positive",
            Label::Negative => "negative",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" | "pos" | "p" => Ok(Label::Positive),
            "negative" | "neg" | "n" => Ok(Label::Negative),
            other => Err(format!(
                "unknown label '{}': expected 'positive' or 'negative'",
                other
            )),
        }
    }
}

/// Directory names for the two buckets, relative to the root folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buckets {
    #[serde(default = "default_positive_dir")]
    pub positive: String,
    #[serde(default = "default_negative_dir")]
    pub negative: String,
}

fn default_positive_dir() -> String {
    "center".to_string()
}

fn default_negative_dir() -> String {
    "not_center".to_string()
}

impl Default for Buckets {
    fn default() -> Self {
        Self {
            positive: default_positive_dir(),
            negative: default_negative_dir(),
        }
    }
}

impl Buckets {
    /// Returns the directory name for a label.
    pub fn dir_name(&self, label: Label) -> &str {
        match label {
            Label::Positive => &self.positive,
            Label::Negative => &self.negative,
        }
    }

    /// Returns the absolute bucket directory for a label under `root`.
    pub fn dir_path(&self, root: &Path, label: Label) -> PathBuf {
        root.join(self.dir_name(label))
    }

    /// Checks that both names are usable as sibling directory names.
    pub fn validate(&self) -> Result<(), String> {
        for name in [&self.positive, &self.negative] {
            if name.is_empty() {
                return Err("bucket directory name must not be empty".to_string());
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(format!(
                    "bucket directory '{}' must be a single path component",
                    name
                ));
            }
        }
        if self.positive == self.negative {
            return Err(format!(
                "bucket directories must differ, both are '{}'",
                self.positive
            ));
        }
        Ok(())
    }
}
