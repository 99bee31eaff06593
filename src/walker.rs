//! Project discovery: configuration file enumeration and classification.
//!
//! The walker makes a single pruned pass over a directory tree, groups the
//! configuration files it finds into stacks, and infers the project flavor.
//! Cache directories are pruned during descent, never filtered after the
//! fact, so a populated `.terraform` plugin cache costs nothing to skip.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::parser::{TERRAFORM_EXTENSIONS, TERRAGRUNT_FILE};
use crate::types::ProjectKind;
use crate::Result;

/// Directory names pruned from the walk unless a complete scan is requested.
pub const SKIP_DIRS: &[&str] = &[".terraform", ".terragrunt-cache", ".git"];

/// Stack key used for files living directly in the scan root.
pub const ROOT_STACK: &str = ".";

/// Everything later stages need to know about the scanned project.
///
/// Passed by value through the probe and assembler so those stay reentrant;
/// nothing in the pipeline keeps project-level mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    /// Inferred project flavor
    pub kind: ProjectKind,
    /// Canonicalized scan root
    pub root: PathBuf,
    /// Whether cache directories were included in the walk
    pub complete: bool,
}

/// One stack directory and the configuration files found in it.
///
/// A directory holding both a `terragrunt.hcl` and `.tf` files yields a
/// single stack; stack keys are unique within a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStack {
    /// Stack key: directory path relative to the scan root, [`ROOT_STACK`]
    /// for the root itself
    pub stack: String,
    /// Absolute stack directory (the probe's working directory)
    pub dir: PathBuf,
    /// Terraform/OpenTofu files in this directory, sorted by name
    pub terraform_files: Vec<PathBuf>,
    /// The stack's `terragrunt.hcl`, when present
    pub terragrunt_file: Option<PathBuf>,
}

/// Result of one walk: the project context plus its stacks in stable order.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Classification and scan parameters
    pub context: ProjectContext,
    /// Stacks sorted by stack key
    pub stacks: Vec<DiscoveredStack>,
}

/// Walks a root directory and discovers its stacks.
#[derive(Debug, Clone)]
pub struct ProjectWalker {
    exclude_patterns: Vec<Pattern>,
    complete: bool,
    max_depth: usize,
    follow_symlinks: bool,
}

impl ProjectWalker {
    /// Create a walker.
    ///
    /// `exclude` holds glob patterns matched against root-relative paths;
    /// `complete` disables the default cache-directory pruning.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValue` error when an exclude pattern is not a valid
    /// glob.
    pub fn new(exclude: &[String], complete: bool) -> Result<Self> {
        let mut exclude_patterns = Vec::with_capacity(exclude.len());
        for pattern in exclude {
            let compiled = Pattern::new(pattern).map_err(|e| {
                crate::err!(ConfigValue {
                    key: "scan.exclude".to_string(),
                    message: format!("invalid glob pattern '{pattern}': {e}"),
                })
            })?;
            exclude_patterns.push(compiled);
        }
        Ok(Self {
            exclude_patterns,
            complete,
            max_depth: 100,
            follow_symlinks: true,
        })
    }

    /// Create a walker from the scan configuration section.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValue` error when an exclude pattern is not a valid
    /// glob.
    pub fn from_config(scan: &crate::config::ScanConfig) -> Result<Self> {
        let mut walker = Self::new(&scan.exclude_patterns, scan.complete)?;
        walker.max_depth = scan.max_depth;
        walker.follow_symlinks = scan.follow_symlinks;
        Ok(walker)
    }

    /// Walk `root` and return the discovered stacks plus the project context.
    ///
    /// The walk is deterministic: stacks come back sorted by key and files
    /// sorted by name, independent of OS directory iteration order.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryNotFound` when `root` is not an existing directory,
    /// or an `Io` error when it cannot be canonicalized. Unreadable entries
    /// below the root are logged and skipped.
    pub fn walk(&self, root: &Path) -> Result<Discovery> {
        if !root.is_dir() {
            return Err(crate::err!(DirectoryNotFound {
                path: root.to_path_buf(),
            }));
        }
        let root = root.canonicalize().map_err(|e| {
            crate::err!(Io {
                path: root.to_path_buf(),
                source: e,
            })
        })?;

        let mut stacks: BTreeMap<String, DiscoveredStack> = BTreeMap::new();
        let mut found_terragrunt = false;
        let mut found_terraform = false;
        let mut root_has_version_file = false;
        let mut subdir_has_terraform = false;

        let walk = WalkDir::new(&root)
            .follow_links(self.follow_symlinks)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry.path(), &root));

        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if file_name == TERRAGRUNT_FILE {
                found_terragrunt = true;
                self.stack_for(&mut stacks, &root, path).terragrunt_file =
                    Some(path.to_path_buf());
            } else if is_terraform_file(file_name) {
                found_terraform = true;
                let in_root = path.parent() == Some(root.as_path());
                if in_root {
                    root_has_version_file |= is_version_file(file_name);
                } else {
                    subdir_has_terraform = true;
                }
                self.stack_for(&mut stacks, &root, path)
                    .terraform_files
                    .push(path.to_path_buf());
            }
        }

        let kind = classify(
            found_terragrunt,
            found_terraform,
            root_has_version_file,
            subdir_has_terraform,
        );

        let mut stacks: Vec<DiscoveredStack> = stacks.into_values().collect();
        for stack in &mut stacks {
            stack.terraform_files.sort();
        }

        tracing::debug!(
            root = %root.display(),
            kind = %kind,
            stacks = stacks.len(),
            "Project walk finished"
        );

        Ok(Discovery {
            context: ProjectContext {
                kind,
                root,
                complete: self.complete,
            },
            stacks,
        })
    }

    /// Fetch or create the stack entry for the directory containing `file`.
    fn stack_for<'a>(
        &self,
        stacks: &'a mut BTreeMap<String, DiscoveredStack>,
        root: &Path,
        file: &Path,
    ) -> &'a mut DiscoveredStack {
        let dir = file.parent().unwrap_or(root).to_path_buf();
        let key = stack_key(root, &dir);
        stacks.entry(key.clone()).or_insert_with(|| DiscoveredStack {
            stack: key,
            dir,
            terraform_files: Vec::new(),
            terragrunt_file: None,
        })
    }

    /// Whether an entry (and, for directories, its whole subtree) is skipped.
    ///
    /// Exclusion is decided on the root-relative path, so a scan rooted
    /// inside a cache directory still works.
    fn is_excluded(&self, path: &Path, root: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        if !self.complete {
            let in_skip_dir = relative
                .components()
                .any(|c| SKIP_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()));
            if in_skip_dir {
                return true;
            }
        }

        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
    }
}

/// Apply the classification rules to the walk's findings.
///
/// A tree whose only Terraform files live in the root next to a
/// `version*.tf` is a reusable module, not a deployment project.
fn classify(
    found_terragrunt: bool,
    found_terraform: bool,
    root_has_version_file: bool,
    subdir_has_terraform: bool,
) -> ProjectKind {
    if root_has_version_file && !subdir_has_terraform {
        return ProjectKind::Module;
    }
    match (found_terragrunt, found_terraform) {
        (true, true) => ProjectKind::TerraformTerragrunt,
        (true, false) => ProjectKind::Terragrunt,
        (false, _) => ProjectKind::Terraform,
    }
}

/// Relative stack key for a directory, [`ROOT_STACK`] for the root itself.
fn stack_key(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => ROOT_STACK.to_string(),
        Ok(relative) => relative.to_string_lossy().to_string(),
        Err(_) => dir.to_string_lossy().to_string(),
    }
}

/// Whether a file name carries one of the Terraform extensions.
fn is_terraform_file(file_name: &str) -> bool {
    TERRAFORM_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

/// Whether a file name matches the `version*.tf` convention.
fn is_version_file(file_name: &str) -> bool {
    file_name.starts_with("version") && file_name.ends_with(".tf")
}
