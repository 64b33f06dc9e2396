use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, FleetResult};

/// Parent value marking the root row.
pub const ROOT_SENTINEL: &str = "None";

/// Index of a node inside an [`AssemblyTree`].
pub type NodeId = usize;

/// One slot in the bill of materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyNode {
    /// Unique slot id.
    pub place: String,
    /// Part type that fills this slot.
    pub part_type: String,
    /// Child slots in attachment order.
    pub children: Vec<NodeId>,
}

/// Flat `(place, part_type, parent_place)` row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssemblyRow {
    /// Slot id.
    pub place: String,
    /// Part type for the slot.
    pub part_type: String,
    /// Parent slot, or `None` for the root.
    #[serde(default)]
    pub parent_place: Option<String>,
}

impl AssemblyRow {
    /// Convenience constructor; pass `"None"` as parent for the root.
    #[must_use]
    pub fn new(place: &str, part_type: &str, parent_place: &str) -> Self {
        Self {
            place: place.into(),
            part_type: part_type.into(),
            parent_place: Some(parent_place.into()),
        }
    }

    fn is_root(&self) -> bool {
        self.parent_place
            .as_deref()
            .map_or(true, |parent| parent.trim().is_empty() || parent == ROOT_SENTINEL)
    }
}

/// Read-only assembly hierarchy shared by every vehicle. Node 0 is the root.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyTree {
    nodes: Vec<AssemblyNode>,
}

impl AssemblyTree {
    /// Builds the tree, attaching rows in passes until every row has a parent.
    ///
    /// A pass that attaches nothing while rows remain means a cycle or orphan.
    pub fn from_rows(rows: &[AssemblyRow]) -> FleetResult<Self> {
        let root_row = rows
            .iter()
            .position(AssemblyRow::is_root)
            .ok_or(FleetError::MissingRoot)?;

        let mut nodes = vec![AssemblyNode {
            place: rows[root_row].place.clone(),
            part_type: rows[root_row].part_type.clone(),
            children: Vec::new(),
        }];
        let mut placed: HashMap<String, NodeId> = HashMap::new();
        placed.insert(rows[root_row].place.clone(), 0);
        let mut attached = vec![false; rows.len()];
        attached[root_row] = true;

        loop {
            let mut progress = false;
            for (idx, row) in rows.iter().enumerate() {
                if attached[idx] || placed.contains_key(&row.place) {
                    continue;
                }
                let Some(&parent) = row
                    .parent_place
                    .as_ref()
                    .and_then(|parent| placed.get(parent))
                else {
                    continue;
                };
                let id = nodes.len();
                nodes.push(AssemblyNode {
                    place: row.place.clone(),
                    part_type: row.part_type.clone(),
                    children: Vec::new(),
                });
                nodes[parent].children.push(id);
                placed.insert(row.place.clone(), id);
                attached[idx] = true;
                progress = true;
            }
            if attached.iter().all(|done| *done) {
                break;
            }
            if !progress {
                let unresolved = rows
                    .iter()
                    .zip(&attached)
                    .filter(|(_, done)| !**done)
                    .map(|(row, _)| row.place.clone())
                    .collect();
                return Err(FleetError::StructuralError { unresolved });
            }
        }
        Ok(Self { nodes })
    }

    /// Reads a headed `place,part_type,parent_place` CSV.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading assembly {}", path.display()))?;
        Self::parse_csv(&raw).with_context(|| format!("parsing assembly {}", path.display()))
    }

    /// Parses headed CSV text.
    pub fn parse_csv(raw: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());
        let mut rows = Vec::new();
        for row in reader.deserialize::<AssemblyRow>() {
            rows.push(row?);
        }
        Ok(Self::from_rows(&rows)?)
    }

    /// Root node id.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &AssemblyNode {
        &self.nodes[id]
    }

    /// Number of slots per vehicle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true for a constructed tree; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order walk from the root using an explicit stack.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_with_depth()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    fn preorder_with_depth(&self) -> Vec<(NodeId, usize)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root(), 0)];
        while let Some((id, depth)) = stack.pop() {
            order.push((id, depth));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        order
    }

    /// Units of each part type needed by one vehicle, in pre-order of first appearance.
    #[must_use]
    pub fn part_quantities(&self) -> IndexMap<String, u32> {
        let mut quantities = IndexMap::new();
        for id in self.preorder() {
            *quantities
                .entry(self.nodes[id].part_type.clone())
                .or_insert(0) += 1;
        }
        quantities
    }

    /// Indented, one line per node.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, depth) in self.preorder_with_depth() {
            let node = &self.nodes[id];
            out.push_str(&"\t".repeat(depth));
            out.push_str(&format!(
                "Place: {}, Part Type: {}\n",
                node.place, node.part_type
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car_rows() -> Vec<AssemblyRow> {
        vec![
            AssemblyRow::new("wheel_fl", "Wheel", "axle_f"),
            AssemblyRow::new("car", "Car", "None"),
            AssemblyRow::new("axle_f", "Axle", "car"),
            AssemblyRow::new("wheel_fr", "Wheel", "axle_f"),
            AssemblyRow::new("engine", "Engine", "car"),
        ]
    }

    #[test]
    fn builds_out_of_order_rows() {
        let tree = AssemblyTree::from_rows(&car_rows()).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.node(tree.root()).place, "car");
        let places: Vec<_> = tree
            .preorder()
            .into_iter()
            .map(|id| tree.node(id).place.as_str())
            .collect();
        // Children keep attachment-pass order; first-fit fill walks it.
        assert_eq!(places, ["car", "axle_f", "wheel_fr", "wheel_fl", "engine"]);
    }

    #[test]
    fn counts_part_quantities() {
        let tree = AssemblyTree::from_rows(&car_rows()).unwrap();
        let quantities = tree.part_quantities();
        assert_eq!(quantities["Wheel"], 2);
        assert_eq!(quantities["Car"], 1);
        assert_eq!(
            quantities.keys().map(String::as_str).collect::<Vec<_>>(),
            ["Car", "Axle", "Wheel", "Engine"]
        );
    }

    #[test]
    fn missing_root_is_reported() {
        let rows = vec![AssemblyRow::new("a", "A", "b"), AssemblyRow::new("b", "B", "a")];
        assert_eq!(AssemblyTree::from_rows(&rows).unwrap_err(), FleetError::MissingRoot);
    }

    #[test]
    fn cycles_and_orphans_stop_without_looping() {
        let rows = vec![
            AssemblyRow::new("car", "Car", "None"),
            AssemblyRow::new("a", "A", "b"),
            AssemblyRow::new("b", "B", "a"),
            AssemblyRow::new("c", "C", "ghost"),
        ];
        match AssemblyTree::from_rows(&rows) {
            Err(FleetError::StructuralError { unresolved }) => {
                assert_eq!(unresolved, ["a", "b", "c"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_places_are_structural_errors() {
        let rows = vec![
            AssemblyRow::new("car", "Car", "None"),
            AssemblyRow::new("car", "Wheel", "car"),
        ];
        assert!(matches!(
            AssemblyTree::from_rows(&rows),
            Err(FleetError::StructuralError { .. })
        ));
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut rows = vec![AssemblyRow::new("n0", "Link", "None")];
        for i in 1..20_000 {
            rows.push(AssemblyRow::new(&format!("n{i}"), "Link", &format!("n{}", i - 1)));
        }
        let tree = AssemblyTree::from_rows(&rows).unwrap();
        assert_eq!(tree.part_quantities()["Link"], 20_000);
    }

    #[test]
    fn parses_csv_with_blank_root_parent() {
        let raw = "place,part_type,parent_place\ncar,Car,\nwheel,Wheel,car\n";
        let tree = AssemblyTree::parse_csv(raw).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.render().contains("\tPlace: wheel, Part Type: Wheel"));
    }
}
