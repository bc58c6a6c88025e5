//! XML Document Transform (XDT) engine
//!
//! Descriptor elements select same-named children of whatever their parent
//! descriptor element selected, optionally narrowed by
//! `xdt:Locator="Match(attr,...)"`. An `xdt:Transform` attribute says what to
//! do with the selection. Directives that need XPath are rejected.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::document::{Document, Element, Node};
use super::{EngineError, EngineOutcome, TransformEngine};

pub const XDT_NAMESPACE: &str = "http://schemas.microsoft.com/XML-Document-Transform";

const DEFAULT_PREFIX: &str = "xdt";

/// Counts of what a descriptor did to a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Target modifications performed
    pub applied: usize,
    /// Directives that found nothing to act on
    pub skipped: usize,
}

/// Problems with the descriptor found while applying it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("{0}")]
    Malformed(String),

    #[error("unsupported transform directive '{directive}' on <{element}>")]
    Unsupported { directive: String, element: String },
}

impl DirectiveError {
    fn into_engine_error(self, descriptor: &Path) -> EngineError {
        match self {
            Self::Malformed(message) => EngineError::MalformedDescriptor {
                path: descriptor.to_path_buf(),
                message,
            },
            Self::Unsupported { directive, element } => {
                EngineError::UnsupportedDirective { directive, element }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transform {
    Replace,
    Insert,
    InsertIfMissing,
    Remove,
    RemoveAll,
    SetAttributes(Vec<String>),
    RemoveAttributes(Vec<String>),
}

#[derive(Debug, Default)]
struct Directive {
    transform: Option<Transform>,
    match_keys: Option<Vec<String>>,
}

impl Directive {
    fn selects(&self, candidate: &Element, descriptor: &Element) -> bool {
        match &self.match_keys {
            Some(keys) => keys
                .iter()
                .all(|key| candidate.attribute(key) == descriptor.attribute(key)),
            None => true,
        }
    }
}

/// Split `Name(a, b)` into its name and argument list.
fn parse_call(raw: &str) -> Result<(&str, Option<Vec<String>>), String> {
    let raw = raw.trim();
    let (name, args) = match raw.find('(') {
        Some(open) => {
            let inner = raw[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| format!("missing ')' in '{raw}'"))?;
            let args = inner
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
            (raw[..open].trim(), Some(args))
        }
        None => (raw, None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid directive '{raw}'"));
    }
    Ok((name, args))
}

/// Element paths are child indices from the document root.
type ElementPath = Vec<usize>;

fn element_at<'e>(root: &'e Element, path: &[usize]) -> Option<&'e Element> {
    path.iter()
        .try_fold(root, |element, &index| element.children.get(index)?.as_element())
}

fn element_at_mut<'e>(root: &'e mut Element, path: &[usize]) -> Option<&'e mut Element> {
    let mut current = root;
    for &index in path {
        current = current.children.get_mut(index)?.as_element_mut()?;
    }
    Some(current)
}

fn remove_at(root: &mut Element, path: &[usize]) -> usize {
    let Some((&index, parent_path)) = path.split_last() else {
        return 0;
    };
    element_at_mut(root, parent_path)
        .and_then(|parent| parent.remove_child(index))
        .map_or(0, |_| 1)
}

struct Applier {
    transform_attr: String,
    locator_attr: String,
    attr_prefix: String,
    namespace_attr: String,
    report: TransformReport,
}

impl Applier {
    fn new(prefix: &str) -> Self {
        Self {
            transform_attr: format!("{prefix}:Transform"),
            locator_attr: format!("{prefix}:Locator"),
            attr_prefix: format!("{prefix}:"),
            namespace_attr: format!("xmlns:{prefix}"),
            report: TransformReport::default(),
        }
    }

    fn is_xdt_attribute(&self, name: &str) -> bool {
        name.starts_with(&self.attr_prefix) || name == self.namespace_attr
    }

    fn directive_for(&self, element: &Element) -> Result<Directive, DirectiveError> {
        let mut directive = Directive::default();

        if let Some(raw) = element.attribute(&self.transform_attr) {
            let (name, args) = parse_call(raw).map_err(DirectiveError::Malformed)?;
            let no_args = |transform: Transform| match &args {
                Some(a) if !a.is_empty() => Err(DirectiveError::Malformed(format!(
                    "{name} on <{}> takes no arguments",
                    element.name
                ))),
                _ => Ok(transform),
            };

            directive.transform = Some(match name {
                "Replace" => no_args(Transform::Replace)?,
                "Insert" => no_args(Transform::Insert)?,
                "InsertIfMissing" => no_args(Transform::InsertIfMissing)?,
                "Remove" => no_args(Transform::Remove)?,
                "RemoveAll" => no_args(Transform::RemoveAll)?,
                "SetAttributes" => Transform::SetAttributes(args.clone().unwrap_or_default()),
                "RemoveAttributes" => match &args {
                    Some(a) if !a.is_empty() => Transform::RemoveAttributes(a.clone()),
                    _ => {
                        return Err(DirectiveError::Malformed(format!(
                            "RemoveAttributes on <{}> needs an attribute list",
                            element.name
                        )))
                    }
                },
                other => {
                    return Err(DirectiveError::Unsupported {
                        directive: other.to_string(),
                        element: element.name.clone(),
                    })
                }
            });
        }

        if let Some(raw) = element.attribute(&self.locator_attr) {
            let (name, args) = parse_call(raw).map_err(DirectiveError::Malformed)?;
            if name != "Match" {
                return Err(DirectiveError::Unsupported {
                    directive: name.to_string(),
                    element: element.name.clone(),
                });
            }

            let keys = args.unwrap_or_default();
            if keys.is_empty() {
                return Err(DirectiveError::Malformed(format!(
                    "Match locator on <{}> needs at least one attribute",
                    element.name
                )));
            }
            if let Some(missing) = keys.iter().find(|k| element.attribute(k).is_none()) {
                return Err(DirectiveError::Malformed(format!(
                    "Match locator on <{}> references attribute '{missing}' which the element does not carry",
                    element.name
                )));
            }
            directive.match_keys = Some(keys);
        }

        Ok(directive)
    }

    /// Copy of a descriptor element with every xdt attribute stripped
    fn clean_clone(&self, element: &Element) -> Element {
        let mut clean = element.clone();
        self.strip(&mut clean);
        clean
    }

    fn strip(&self, element: &mut Element) {
        element.attributes.retain(|a| !self.is_xdt_attribute(&a.name));
        for child in element.children.iter_mut().filter_map(Node::as_element_mut) {
            self.strip(child);
        }
    }

    fn apply_children(
        &mut self,
        root: &mut Element,
        targets: &[ElementPath],
        descriptor: &Element,
    ) -> Result<(), DirectiveError> {
        for child in descriptor.child_elements() {
            self.apply_element(root, targets, child)?;
        }
        Ok(())
    }

    fn apply_element(
        &mut self,
        root: &mut Element,
        parents: &[ElementPath],
        descriptor: &Element,
    ) -> Result<(), DirectiveError> {
        let directive = self.directive_for(descriptor)?;

        let mut matched: Vec<ElementPath> = Vec::new();
        let mut unmatched_parents: Vec<ElementPath> = Vec::new();
        for parent_path in parents {
            let Some(parent) = element_at(root, parent_path) else {
                continue;
            };
            let before = matched.len();
            for (index, node) in parent.children.iter().enumerate() {
                if let Node::Element(candidate) = node {
                    if candidate.name == descriptor.name && directive.selects(candidate, descriptor)
                    {
                        let mut path = parent_path.clone();
                        path.push(index);
                        matched.push(path);
                    }
                }
            }
            if matched.len() == before {
                unmatched_parents.push(parent_path.clone());
            }
        }

        let Some(transform) = &directive.transform else {
            return self.apply_children(root, &matched, descriptor);
        };

        let changed = match transform {
            Transform::Insert => self.insert_under(root, parents, descriptor),
            Transform::InsertIfMissing => self.insert_under(root, &unmatched_parents, descriptor),
            Transform::Replace => {
                let replacement = self.clean_clone(descriptor);
                matched
                    .first()
                    .and_then(|path| element_at_mut(root, path))
                    .map_or(0, |target| {
                        *target = replacement;
                        1
                    })
            }
            Transform::Remove => matched.first().map_or(0, |path| remove_at(root, path)),
            Transform::RemoveAll => {
                let mut paths = matched.clone();
                // Later siblings first so earlier indices stay valid.
                paths.sort_by(|a, b| b.cmp(a));
                paths.iter().map(|path| remove_at(root, path)).sum()
            }
            Transform::SetAttributes(names) => {
                let values = self.attributes_to_set(descriptor, names);
                self.for_each_target(root, &matched, |target| {
                    for (name, value) in &values {
                        target.set_attribute(name, value);
                    }
                })
            }
            Transform::RemoveAttributes(names) => self.for_each_target(root, &matched, |target| {
                for name in names {
                    target.remove_attribute(name);
                }
            }),
        };

        if changed == 0 {
            warn!(
                "No element matched <{}> for {:?}; directive skipped",
                descriptor.name, transform
            );
            self.report.skipped += 1;
        } else {
            debug!(
                "Applied {:?} to {} <{}> element(s)",
                transform, changed, descriptor.name
            );
            self.report.applied += changed;
        }

        if matches!(
            transform,
            Transform::SetAttributes(_) | Transform::RemoveAttributes(_)
        ) {
            self.apply_children(root, &matched, descriptor)?;
        }
        Ok(())
    }

    fn insert_under(
        &self,
        root: &mut Element,
        parents: &[ElementPath],
        descriptor: &Element,
    ) -> usize {
        let mut inserted = 0;
        for parent_path in parents {
            if let Some(parent) = element_at_mut(root, parent_path) {
                parent.append_element(self.clean_clone(descriptor));
                inserted += 1;
            }
        }
        inserted
    }

    fn for_each_target(
        &self,
        root: &mut Element,
        targets: &[ElementPath],
        mut apply: impl FnMut(&mut Element),
    ) -> usize {
        let mut touched = 0;
        for path in targets {
            if let Some(target) = element_at_mut(root, path) {
                apply(target);
                touched += 1;
            }
        }
        touched
    }

    fn attributes_to_set(&self, descriptor: &Element, names: &[String]) -> Vec<(String, String)> {
        if names.is_empty() {
            return descriptor
                .attributes
                .iter()
                .filter(|a| !self.is_xdt_attribute(&a.name))
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect();
        }

        names
            .iter()
            .filter_map(|name| match descriptor.attribute(name) {
                Some(value) => Some((name.clone(), value.to_string())),
                None => {
                    warn!(
                        "SetAttributes on <{}> names '{}' but the element does not carry it",
                        descriptor.name, name
                    );
                    None
                }
            })
            .collect()
    }
}

/// Prefix bound to the XDT namespace on the descriptor root
fn xdt_prefix(descriptor_root: &Element) -> String {
    descriptor_root
        .attributes
        .iter()
        .find_map(|a| {
            a.name
                .strip_prefix("xmlns:")
                .filter(|_| a.value == XDT_NAMESPACE)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
}

/// Apply `descriptor` to `document` in memory.
pub fn apply_transform(
    document: &mut Document,
    descriptor: &Document,
) -> Result<TransformReport, DirectiveError> {
    let descriptor_root = descriptor.root();
    let mut applier = Applier::new(&xdt_prefix(descriptor_root));

    let roots: Vec<ElementPath> = if document.root().name == descriptor_root.name {
        vec![Vec::new()]
    } else {
        warn!(
            "Descriptor root <{}> does not match document root <{}>",
            descriptor_root.name,
            document.root().name
        );
        Vec::new()
    };

    applier.apply_children(document.root_mut(), &roots, descriptor_root)?;
    Ok(applier.report)
}

/// Write `contents` next to `destination` and move it into place.
fn write_atomically(destination: &Path, contents: &str) -> Result<(), EngineError> {
    let directory = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = NamedTempFile::new_in(&directory).map_err(EngineError::io(destination))?;
    temp.write_all(contents.as_bytes())
        .map_err(EngineError::io(destination))?;
    temp.as_file()
        .sync_all()
        .map_err(EngineError::io(destination))?;

    if let Ok(metadata) = fs::metadata(destination) {
        fs::set_permissions(temp.path(), metadata.permissions())
            .map_err(EngineError::io(destination))?;
    }

    temp.persist(destination).map_err(|e| EngineError::Io {
        path: destination.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// File-backed XDT engine
#[derive(Debug, Clone, Copy, Default)]
pub struct XdtEngine;

impl XdtEngine {
    pub fn new() -> Self {
        Self
    }
}

impl TransformEngine for XdtEngine {
    fn transform(
        &self,
        source: &Path,
        descriptor: &Path,
        destination: &Path,
    ) -> Result<EngineOutcome, EngineError> {
        for input in [source, descriptor] {
            if !input.is_file() {
                return Err(EngineError::MissingInput {
                    path: input.to_path_buf(),
                });
            }
        }

        let source_text = fs::read_to_string(source).map_err(EngineError::io(source))?;
        let descriptor_text =
            fs::read_to_string(descriptor).map_err(EngineError::io(descriptor))?;

        let mut document =
            Document::parse(&source_text).map_err(|e| EngineError::MalformedDocument {
                path: source.to_path_buf(),
                source: e,
            })?;
        let descriptor_doc =
            Document::parse(&descriptor_text).map_err(|e| EngineError::MalformedDescriptor {
                path: descriptor.to_path_buf(),
                message: e.to_string(),
            })?;

        let report = apply_transform(&mut document, &descriptor_doc)
            .map_err(|e| e.into_engine_error(descriptor))?;

        if report.applied == 0 {
            info!(
                "Transform {} matched nothing in {}",
                descriptor.display(),
                source.display()
            );
            return Ok(EngineOutcome::NotApplied(report));
        }

        write_atomically(destination, &document.to_xml_string())?;
        info!(
            "Wrote {} ({} change(s), {} skipped)",
            destination.display(),
            report.applied,
            report.skipped
        );
        Ok(EngineOutcome::Applied(report))
    }
}
