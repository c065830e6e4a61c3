//! Source Locations and Module Classification
//!
//! Turns `addr2line` output into a [`SourceLocation`] and buckets a location
//! into a [`ModuleTag`] relative to the project root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// File name used when no debug information is available.
pub const UNKNOWN_FILE: &str = "unknown";

/// A resolved `(file, line)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn unknown() -> Self {
        Self {
            file: UNKNOWN_FILE.to_string(),
            line: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.file == UNKNOWN_FILE
    }

    /// `relative/path.c:line` under `project_root`, the absolute `file:line`
    /// outside it, or `??` when unknown.
    pub fn display_path(&self, project_root: &Path) -> String {
        if self.is_unknown() {
            return "??".to_string();
        }
        match relative_to_root(Path::new(&self.file), project_root) {
            Some(rel) => format!("{}:{}", rel.display(), self.line),
            None => format!("{}:{}", self.file, self.line),
        }
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Interpret the output of one `addr2line -f` invocation.
///
/// The location is taken from the last non-empty line. Missing output, a
/// missing colon, or a `??` file all give [`SourceLocation::unknown`]; a
/// non-numeric line number becomes `0`.
pub fn parse_location_output(output: &str) -> SourceLocation {
    let Some(last) = output.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
        return SourceLocation::unknown();
    };
    // e.g. "poly.c:42 (discriminator 3)"
    let last = last.split(" (discriminator").next().unwrap_or(last).trim();
    let Some((file, line)) = last.rsplit_once(':') else {
        return SourceLocation::unknown();
    };
    if file.is_empty() || file == "??" {
        return SourceLocation::unknown();
    }
    SourceLocation {
        file: file.to_string(),
        line: line.trim().parse().unwrap_or(0),
    }
}

/// Logical ownership bucket of a symbol. Serialized with the same short
/// identifiers as [`ModuleTag::id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleTag {
    #[serde(rename = "impl")]
    Implementation,
    #[serde(rename = "harness")]
    Harness,
    #[serde(rename = "common")]
    Common,
    #[serde(rename = "hal")]
    PlatformSupport,
    #[serde(rename = "project")]
    OtherProject,
    #[serde(rename = "external")]
    External,
}

impl ModuleTag {
    pub const ALL: [ModuleTag; 6] = [
        ModuleTag::Implementation,
        ModuleTag::Harness,
        ModuleTag::Common,
        ModuleTag::PlatformSupport,
        ModuleTag::OtherProject,
        ModuleTag::External,
    ];

    /// Short identifier used for DOT cluster names and the replay payload.
    pub fn id(&self) -> &'static str {
        match self {
            ModuleTag::Implementation => "impl",
            ModuleTag::Harness => "harness",
            ModuleTag::Common => "common",
            ModuleTag::PlatformSupport => "hal",
            ModuleTag::OtherProject => "project",
            ModuleTag::External => "external",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModuleTag::Implementation => "Implementation (core operations)",
            ModuleTag::Harness => "Harness / benchmarks / tests",
            ModuleTag::Common => "Common primitives",
            ModuleTag::PlatformSupport => "Platform HAL / board support",
            ModuleTag::OtherProject => "Other project code",
            ModuleTag::External => "Toolchain / libc / external",
        }
    }

    pub fn is_project(&self) -> bool {
        *self != ModuleTag::External
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Directory names that drive [`ClassificationRules::module_of`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationRules {
    /// First three path segments of the implementation directory.
    pub implementation_dirs: [String; 3],
    pub harness_dir: String,
    pub common_dir: String,
    /// Substring of a file name under `common_dir` marking platform support.
    pub platform_marker: String,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            implementation_dirs: [
                "crypto_kem".to_string(),
                "kyber768".to_string(),
                "kyber768r1".to_string(),
            ],
            harness_dir: "mupq".to_string(),
            common_dir: "common".to_string(),
            platform_marker: "hal-".to_string(),
        }
    }
}

impl ClassificationRules {
    /// Classify `location` relative to `project_root`.
    ///
    /// Rules are tried in order and the first match wins: implementation
    /// triple, harness, common (platform support when the file name carries
    /// the marker), other project code, external.
    pub fn module_of(&self, location: &SourceLocation, project_root: &Path) -> ModuleTag {
        if location.is_unknown() {
            return ModuleTag::External;
        }
        let Some(rel) = relative_to_root(Path::new(&location.file), project_root) else {
            return ModuleTag::External;
        };
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if parts.len() >= 3 && parts[..3] == self.implementation_dirs[..] {
            return ModuleTag::Implementation;
        }
        match parts.first() {
            Some(first) if *first == self.harness_dir => ModuleTag::Harness,
            Some(first) if *first == self.common_dir => {
                let file_name = parts.last().map(String::as_str).unwrap_or_default();
                if file_name.contains(self.platform_marker.as_str()) {
                    ModuleTag::PlatformSupport
                } else {
                    ModuleTag::Common
                }
            }
            _ => ModuleTag::OtherProject,
        }
    }
}

/// Lexically relativize `path` against `root`. Relative paths are taken to be
/// relative to `root`. No filesystem access, so the result is a pure function
/// of its inputs.
///
/// An absolute `path` cannot be placed under a relative `root` without the
/// working directory, so callers should pass an absolute root; with a
/// relative one, absolute paths are reported as outside.
pub fn relative_to_root(path: &Path, root: &Path) -> Option<PathBuf> {
    let root = normalize(root);
    if path.is_absolute() && !root.is_absolute() {
        return None;
    }
    let full = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };
    let rel = full.strip_prefix(&root).ok()?;
    if rel.components().next() == Some(Component::ParentDir) {
        return None;
    }
    Some(rel.to_path_buf())
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
