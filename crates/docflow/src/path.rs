//! Name/index paths.
//!
//! Grammar: an optional `$`, then an anchor (`#<id>`, `/` for the document
//! root, or a name looked up from the origin), then `.`-separated segments
//! `name[i][j]` with 1-based indices.
//!
//! Resolution forces expansion of every composite it passes through.
//! Indices address the flattened, non-blank replacements of a composite,
//! so a composite wrapped inside another composite is transparent.

use crate::address::ComponentId;
use crate::component::Attribute;
use crate::diagnostics::Diagnostic;
use crate::document::Document;
use crate::error::PathError;
use crate::expand::ExpansionState;
use crate::graph::{EdgeKind, Source};
use chumsky::prelude::*;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathAnchor {
    /// First segment is a name looked up from the origin outward.
    Relative,
    Root,
    Id(ComponentId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// `None` for a bare index step such as the `[2]` of `#4[2]`.
    pub name: Option<Arc<str>>,
    /// 1-based.
    pub indices: Vec<usize>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            f.write_str(name)?;
        }
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub anchor: PathAnchor,
    pub segments: Vec<PathSegment>,
}

impl PathExpr {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        parser().parse(source).into_result().map_err(|errors| PathError::Syntax {
            path: source.to_string(),
            message: errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}

/// Where resolution stopped and what it could not consume.
#[derive(Debug, Clone, PartialEq)]
pub struct PathResolution {
    pub component: ComponentId,
    /// Segments left over, typically a property name.
    pub remaining: Vec<PathSegment>,
}

impl PathResolution {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Name of the first remaining segment when it carries no indices.
    pub fn property(&self) -> Option<&Arc<str>> {
        match self.remaining.as_slice() {
            [PathSegment {
                name: Some(name),
                indices,
            }] if indices.is_empty() => Some(name),
            _ => None,
        }
    }
}

fn parser<'src>() -> impl Parser<'src, &'src str, PathExpr, extra::Err<Rich<'src, char>>> {
    let number = text::int(10)
        .to_slice()
        .try_map(|digits: &str, span| {
            digits
                .parse::<usize>()
                .map_err(|err| Rich::custom(span, err.to_string()))
        });

    let identifier = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .repeated(),
        )
        .to_slice();

    let indices = number
        .clone()
        .delimited_by(just('['), just(']'))
        .repeated()
        .collect::<Vec<usize>>();

    let segment = identifier
        .then(indices.clone())
        .map(|(name, indices): (&str, Vec<usize>)| PathSegment {
            name: Some(name.into()),
            indices,
        });

    let anchored_id = just('#')
        .ignore_then(number)
        .then(indices)
        .try_map(|(id, indices): (usize, Vec<usize>), span| {
            let id = u32::try_from(id).map_err(|err| Rich::custom(span, err.to_string()))?;
            let segments = if indices.is_empty() {
                Vec::new()
            } else {
                vec![PathSegment {
                    name: None,
                    indices,
                }]
            };
            Ok((PathAnchor::Id(ComponentId(id)), segments))
        });

    let rooted = just('/')
        .ignore_then(segment.clone().or_not())
        .map(|first| (PathAnchor::Root, first.into_iter().collect::<Vec<_>>()));

    let relative = segment.clone().map(|first| (PathAnchor::Relative, vec![first]));

    let rest = just('.').ignore_then(segment).repeated().collect::<Vec<_>>();

    just('$')
        .or_not()
        .ignore_then(choice((anchored_id, rooted, relative)))
        .then(rest)
        .then_ignore(end())
        .map(|((anchor, mut segments), rest)| {
            segments.extend(rest);
            PathExpr { anchor, segments }
        })
}

/// Result of a breadth-first name search.
struct Search {
    found: Option<ComponentId>,
    /// A composite in the middle of its own expansion was skipped.
    blocked: bool,
}

impl Document {
    /// Resolve `path` relative to `origin`.
    pub fn resolve_path(&mut self, origin: ComponentId, path: &str) -> Result<PathResolution, PathError> {
        self.flush();
        self.resolve_path_from(origin, path)
    }

    /// Id addressed by `path`, only when the whole path resolved.
    pub fn resolve_path_to_id(&mut self, path: &str, origin: ComponentId) -> Option<ComponentId> {
        match self.resolve_path(origin, path) {
            Ok(resolution) if resolution.is_complete() => Some(resolution.component),
            Ok(_) | Err(_) => None,
        }
    }

    pub(crate) fn resolve_path_from(&mut self, origin: ComponentId, path: &str) -> Result<PathResolution, PathError> {
        if !self.arena.is_live(origin) {
            return Err(PathError::Retired(origin));
        }
        let key: (ComponentId, Arc<str>) = (origin, path.into());
        if self.resolving_paths.contains(&key) {
            return Err(PathError::SelfReferential {
                path: path.to_string(),
            });
        }
        let expr = PathExpr::parse(path)?;

        self.resolving_paths.push(key);
        let result = self.resolve_expr(origin, path, &expr);
        self.resolving_paths.pop();

        match &result {
            Ok(resolution) => log::trace!(
                "`{path}` from {origin} -> {} ({} remaining)",
                resolution.component,
                resolution.remaining.len()
            ),
            Err(err) => {
                log::debug!("`{path}` from {origin}: {err}");
                self.diagnostics.push(Diagnostic::unresolved(origin, err));
            }
        }
        result
    }

    fn resolve_expr(&mut self, origin: ComponentId, path: &str, expr: &PathExpr) -> Result<PathResolution, PathError> {
        let mut segments = expr.segments.iter();
        let (mut current, mut segment) = match &expr.anchor {
            PathAnchor::Id(id) => {
                if !self.arena.is_live(*id) {
                    return Err(PathError::Unresolved {
                        path: path.to_string(),
                        segment: id.to_string(),
                    });
                }
                (*id, segments.next().cloned())
            }
            PathAnchor::Root => (self.root, segments.next().cloned()),
            PathAnchor::Relative => {
                let Some(first) = segments.next() else {
                    return Err(PathError::Syntax {
                        path: path.to_string(),
                        message: "empty path".into(),
                    });
                };
                let name = first.name.clone().unwrap_or_else(|| "".into());
                let search = self.find_in_scopes(origin, &name);
                let Some(found) = search.found else {
                    return Err(if search.blocked {
                        PathError::SelfReferential {
                            path: path.to_string(),
                        }
                    } else {
                        PathError::Unresolved {
                            path: path.to_string(),
                            segment: name.to_string(),
                        }
                    });
                };
                let indices_only = PathSegment {
                    name: None,
                    indices: first.indices.clone(),
                };
                (found, Some(indices_only))
            }
        };

        while let Some(step) = segment.take() {
            match self.resolve_segment(current, &step) {
                Ok(next) => current = next,
                Err((stopped, unconsumed)) => {
                    let mut remaining = vec![unconsumed];
                    remaining.extend(segments.cloned());
                    return Ok(PathResolution {
                        component: stopped,
                        remaining,
                    });
                }
            }
            segment = segments.next().cloned();
        }
        Ok(PathResolution {
            component: current,
            remaining: Vec::new(),
        })
    }

    /// Apply one segment to `current`. On failure returns where resolution
    /// stopped and the unconsumed part of the segment.
    fn resolve_segment(
        &mut self,
        current: ComponentId,
        segment: &PathSegment,
    ) -> Result<ComponentId, (ComponentId, PathSegment)> {
        let mut at = current;
        if let Some(name) = &segment.name {
            match self.find_descendant(at, name).found {
                Some(found) => at = found,
                None => return Err((at, segment.clone())),
            }
        }
        for (position, &index) in segment.indices.iter().enumerate() {
            let stuck = |at| {
                (
                    at,
                    PathSegment {
                        name: None,
                        indices: segment.indices[position..].to_vec(),
                    },
                )
            };
            if !self.is_composite(at) {
                return Err(stuck(at));
            }
            let replacements = match self.meaningful_replacements(at) {
                Ok(replacements) => replacements,
                Err(_) => return Err(stuck(at)),
            };
            match index.checked_sub(1).and_then(|i| replacements.get(i)) {
                Some(&next) => at = next,
                None => return Err(stuck(at)),
            }
        }
        Ok(at)
    }

    /// Look `name` up from `origin` outward, one namespace at a time.
    fn find_in_scopes(&mut self, origin: ComponentId, name: &str) -> Search {
        let mut blocked = false;
        let mut scope = Some(self.namespace_of(origin));
        while let Some(root) = scope {
            if self.arena.get(root).and_then(|c| c.name.as_deref()) == Some(name) {
                return Search {
                    found: Some(root),
                    blocked,
                };
            }
            let search = self.find_descendant(root, name);
            blocked |= search.blocked;
            if search.found.is_some() {
                return Search {
                    found: search.found,
                    blocked,
                };
            }
            scope = self.container_of(root).map(|parent| self.namespace_of(parent));
        }
        Search {
            found: None,
            blocked,
        }
    }

    /// Nearest ancestor-or-self that opens a namespace, or the top.
    fn namespace_of(&self, id: ComponentId) -> ComponentId {
        let mut current = id;
        loop {
            let Some(component) = self.arena.get(current) else {
                return current;
            };
            if component.new_namespace {
                return current;
            }
            match component.replacement_of.or(component.parent) {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Replacements belong to their composite's scope, not to the parent
    /// they were attached under.
    fn container_of(&self, id: ComponentId) -> Option<ComponentId> {
        let component = self.arena.get(id)?;
        component.replacement_of.or(component.parent)
    }

    /// Breadth-first search below `start` that does not enter nested
    /// namespaces and expands composites on the way.
    fn find_descendant(&mut self, start: ComponentId, name: &str) -> Search {
        let mut blocked = false;
        let mut queue = VecDeque::new();
        self.enqueue_children(start, &mut queue, &mut blocked);

        while let Some(id) = queue.pop_front() {
            let Some(component) = self.arena.get(id) else {
                continue;
            };
            if component.name.as_deref() == Some(name) {
                return Search {
                    found: Some(id),
                    blocked,
                };
            }
            if !component.new_namespace {
                self.enqueue_children(id, &mut queue, &mut blocked);
            }
        }
        Search {
            found: None,
            blocked,
        }
    }

    fn enqueue_children(&mut self, id: ComponentId, queue: &mut VecDeque<ComponentId>, blocked: &mut bool) {
        self.graph.record(Source::Children(id), EdgeKind::Value);
        let Some(component) = self.arena.get(id) else {
            return;
        };
        queue.extend(component.children.iter().copied());
        queue.extend(component.attributes.values().filter_map(|attribute| match attribute {
            Attribute::Component(id) => Some(*id),
            Attribute::Literal(_) => None,
        }));
        let Some(record) = &component.expansion else {
            return;
        };
        if record.state == ExpansionState::Expanding {
            *blocked = true;
            return;
        }
        match self.ensure_expanded(id) {
            Ok(_) => queue.extend(self.replacements(id)),
            Err(err) => log::debug!("path search skips {id}: {err}"),
        }
        if let Some(parent) = self.arena.parent(id) {
            self.graph.record(Source::Children(parent), EdgeKind::Value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(name: &str, indices: &[usize]) -> PathSegment {
        PathSegment {
            name: Some(name.into()),
            indices: indices.to_vec(),
        }
    }

    #[test]
    fn parses_relative_names_and_indices() {
        let expr = PathExpr::parse("$grid[2][1].x").unwrap();
        assert_eq!(expr.anchor, PathAnchor::Relative);
        assert_eq!(expr.segments, vec![segment("grid", &[2, 1]), segment("x", &[])]);
    }

    #[test]
    fn parses_anchors() {
        let expr = PathExpr::parse("#12[3]").unwrap();
        assert_eq!(expr.anchor, PathAnchor::Id(ComponentId(12)));
        assert_eq!(
            expr.segments,
            vec![PathSegment {
                name: None,
                indices: vec![3]
            }]
        );

        let expr = PathExpr::parse("/section1.p_2").unwrap();
        assert_eq!(expr.anchor, PathAnchor::Root);
        assert_eq!(expr.segments, vec![segment("section1", &[]), segment("p_2", &[])]);
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "a..b", "a[", "a[x]", "1abc", "a b"] {
            assert!(
                matches!(PathExpr::parse(bad), Err(PathError::Syntax { .. })),
                "`{bad}` should not parse"
            );
        }
    }

    #[test]
    fn property_is_single_plain_segment() {
        let resolution = PathResolution {
            component: ComponentId(1),
            remaining: vec![segment("x", &[])],
        };
        assert_eq!(resolution.property().map(|p| &**p), Some("x"));
        let resolution = PathResolution {
            component: ComponentId(1),
            remaining: vec![segment("x", &[1])],
        };
        assert!(resolution.property().is_none());
    }
}
