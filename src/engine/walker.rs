//! Leaf discovery over a test element tree
//!
//! A traversal first walks the whole tree depth-first and collects every
//! leaf (an element without children) in pre-order. Only then are leaves
//! handed to the visitor, one per call to `next()`. A visitor that flips
//! `enabled` flags therefore always works on a complete, stable leaf list.

use std::vec;

use crate::common::{Error, Result};
use crate::remote::{ElementRef, TestElement, TestUnit};

/// Applied to every leaf of a traversal
pub trait Visitor {
    type Output;

    fn visit(&mut self, leaf: &dyn TestElement) -> Result<Self::Output>;
}

impl<F, T> Visitor for F
where
    F: FnMut(&dyn TestElement) -> Result<T>,
{
    type Output = T;

    fn visit(&mut self, leaf: &dyn TestElement) -> Result<T> {
        self(leaf)
    }
}

/// Yields the caption of each leaf
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptionVisitor;

impl Visitor for CaptionVisitor {
    type Output = String;

    fn visit(&mut self, leaf: &dyn TestElement) -> Result<String> {
        leaf.caption()
    }
}

/// Enables leaves captioned `target` and disables every other leaf
///
/// Non-matching leaves are disabled unconditionally, so a previous
/// selection never survives a new one.
#[derive(Debug, Clone)]
pub struct SelectionVisitor {
    target: String,
    matched: usize,
}

impl SelectionVisitor {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            matched: 0,
        }
    }

    /// Number of leaves enabled so far
    pub fn matched(&self) -> usize {
        self.matched
    }
}

impl Visitor for SelectionVisitor {
    /// Whether this leaf was enabled
    type Output = bool;

    fn visit(&mut self, leaf: &dyn TestElement) -> Result<bool> {
        let hit = leaf.caption()? == self.target;
        leaf.set_enabled(hit)?;
        if hit {
            self.matched += 1;
        }
        Ok(hit)
    }
}

/// Collects the captions of enabled leaves without changing anything
#[derive(Debug, Default, Clone)]
pub struct EnabledVisitor {
    captions: Vec<String>,
}

impl EnabledVisitor {
    pub fn captions(&self) -> &[String] {
        &self.captions
    }
}

impl Visitor for EnabledVisitor {
    /// Whether this leaf is enabled
    type Output = bool;

    fn visit(&mut self, leaf: &dyn TestElement) -> Result<bool> {
        let enabled = leaf.is_enabled()?;
        if enabled {
            self.captions.push(leaf.caption()?);
        }
        Ok(enabled)
    }
}

/// Lazy application of a visitor over a pre-discovered leaf list
///
/// Dropping a traversal before it is exhausted leaves the remaining leaves
/// unvisited.
pub struct Traversal<V> {
    leaves: vec::IntoIter<ElementRef>,
    visitor: V,
}

impl<V: Visitor> Traversal<V> {
    /// Leaves not yet visited
    pub fn remaining(&self) -> usize {
        self.leaves.len()
    }

    /// Visit every remaining leaf, stopping at the first error
    pub fn drain(mut self) -> Result<V> {
        for result in self.by_ref() {
            result?;
        }
        Ok(self.visitor)
    }

    /// Give back the visitor, e.g. to read a counter after draining
    pub fn into_visitor(self) -> V {
        self.visitor
    }
}

impl<V: Visitor> Iterator for Traversal<V> {
    type Item = Result<V::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.leaves.next()?;
        Some(self.visitor.visit(leaf.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.leaves.size_hint()
    }
}

impl<V: Visitor> ExactSizeIterator for Traversal<V> {}

/// Traverse the leaves under a test unit
pub fn traverse<V: Visitor>(unit: &dyn TestUnit, visitor: V) -> Result<Traversal<V>> {
    traverse_elements(unit.elements()?, visitor)
}

/// Traverse the leaves under a list of top-level elements
pub fn traverse_elements<V: Visitor>(elements: Vec<ElementRef>, visitor: V) -> Result<Traversal<V>> {
    if elements.is_empty() {
        return Err(Error::EmptyTree);
    }

    let leaves = discover(elements)?;
    tracing::trace!(leaves = leaves.len(), "Discovered test tree leaves");

    Ok(Traversal {
        leaves: leaves.into_iter(),
        visitor,
    })
}

/// Collect every leaf below `elements` in pre-order
pub fn discover(elements: Vec<ElementRef>) -> Result<Vec<ElementRef>> {
    let mut leaves = Vec::new();
    for element in elements {
        collect_leaves(element, &mut leaves)?;
    }
    Ok(leaves)
}

fn collect_leaves(element: ElementRef, leaves: &mut Vec<ElementRef>) -> Result<()> {
    let children = element.children()?;
    if children.is_empty() {
        leaves.push(element);
        return Ok(());
    }

    for child in children {
        collect_leaves(child, leaves)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{ConfigurationSpec, ElementSpec, MemoryTool, Snapshot, UnitSpec};
    use crate::remote::Application;

    fn tool_with(elements: Vec<ElementSpec>) -> MemoryTool {
        MemoryTool::new(Snapshot {
            test_configurations: vec![ConfigurationSpec::new(
                "Test_Configuration_1",
                vec![UnitSpec {
                    name: "unit".to_string(),
                    elements,
                    ..UnitSpec::default()
                }],
            )],
            ..Snapshot::default()
        })
    }

    fn unit_of(tool: &MemoryTool) -> Box<dyn TestUnit> {
        tool.configuration()
            .unwrap()
            .test_configurations()
            .unwrap()
            .item(0)
            .unwrap()
            .units()
            .unwrap()
            .item(0)
            .unwrap()
    }

    fn scenario_tree() -> Vec<ElementSpec> {
        vec![ElementSpec::group(
            "Root",
            vec![
                ElementSpec::group(
                    "GroupA",
                    vec![ElementSpec::leaf("TC1"), ElementSpec::leaf("TC2")],
                ),
                ElementSpec::leaf("TC3"),
            ],
        )]
    }

    fn captions(unit: &dyn TestUnit) -> Vec<String> {
        traverse(unit, CaptionVisitor)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_leaves_in_pre_order() {
        let tool = tool_with(scenario_tree());
        assert_eq!(captions(unit_of(&tool).as_ref()), vec!["TC1", "TC2", "TC3"]);
    }

    #[test]
    fn test_uneven_depth() {
        let tool = tool_with(vec![
            ElementSpec::leaf("A"),
            ElementSpec::group(
                "G1",
                vec![ElementSpec::group(
                    "G2",
                    vec![ElementSpec::group("G3", vec![ElementSpec::leaf("B")])],
                )],
            ),
            ElementSpec::group("G4", vec![ElementSpec::leaf("C"), ElementSpec::leaf("D")]),
            ElementSpec::leaf("E"),
        ]);
        assert_eq!(captions(unit_of(&tool).as_ref()), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_empty_unit_fails() {
        let tool = tool_with(Vec::new());
        let err = traverse(unit_of(&tool).as_ref(), CaptionVisitor).err().unwrap();
        assert!(matches!(err, Error::EmptyTree));
    }

    #[test]
    fn test_traversal_is_restartable() {
        let tool = tool_with(scenario_tree());
        let unit = unit_of(&tool);
        let first = captions(unit.as_ref());
        let second = captions(unit.as_ref());
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_consumption_leaves_rest_unvisited() {
        let tool = tool_with(vec![
            ElementSpec::leaf("TC1").enabled(),
            ElementSpec::leaf("TC2").enabled(),
            ElementSpec::leaf("TC3").enabled(),
        ]);
        let mut traversal = traverse(unit_of(&tool).as_ref(), SelectionVisitor::new("TC1")).unwrap();
        assert_eq!(traversal.remaining(), 3);
        assert!(traversal.next().unwrap().unwrap());
        assert_eq!(traversal.remaining(), 2);
        drop(traversal);

        assert_eq!(
            tool.unit_leaves(),
            vec![
                ("TC1".to_string(), true),
                ("TC2".to_string(), true),
                ("TC3".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_selection_resets_previous_choice() {
        let tool = tool_with(scenario_tree());
        let unit = unit_of(&tool);

        let first = traverse(unit.as_ref(), SelectionVisitor::new("TC1"))
            .unwrap()
            .drain()
            .unwrap();
        assert_eq!(first.matched(), 1);

        let second = traverse(unit.as_ref(), SelectionVisitor::new("TC3"))
            .unwrap()
            .drain()
            .unwrap();
        assert_eq!(second.matched(), 1);
        assert_eq!(
            tool.unit_leaves(),
            vec![
                ("TC1".to_string(), false),
                ("TC2".to_string(), false),
                ("TC3".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_enabled_visitor_after_partial_walk() {
        let tool = tool_with(vec![
            ElementSpec::leaf("TC1").enabled(),
            ElementSpec::leaf("TC2"),
            ElementSpec::leaf("TC3").enabled(),
        ]);
        let mut traversal = traverse(unit_of(&tool).as_ref(), EnabledVisitor::default()).unwrap();
        assert!(traversal.next().unwrap().unwrap());
        assert!(!traversal.next().unwrap().unwrap());

        let visitor = traversal.into_visitor();
        assert_eq!(visitor.captions(), ["TC1".to_string()]);
        assert_eq!(
            tool.unit_leaves(),
            vec![
                ("TC1".to_string(), true),
                ("TC2".to_string(), false),
                ("TC3".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_groups_are_never_visited() {
        let tool = tool_with(scenario_tree());
        let mut seen = Vec::new();
        let visitor = |leaf: &dyn TestElement| -> Result<()> {
            seen.push(leaf.caption()?);
            Ok(())
        };
        traverse(unit_of(&tool).as_ref(), visitor).unwrap().drain().unwrap();
        assert!(!seen.iter().any(|c| c == "Root" || c == "GroupA"));
        assert_eq!(seen.len(), 3);
    }
}
