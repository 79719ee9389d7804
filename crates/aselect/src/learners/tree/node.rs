//! Structure-of-arrays tree storage.

use ndarray::ArrayView1;

/// Node index within a [`Tree`].
pub type NodeId = u32;

/// Immutable regression tree with vector-valued leaves.
///
/// Nodes are stored in SoA layout. Node 0 is the root. A sample goes left
/// when `value < threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_feature: Vec<u32>,
    threshold: Vec<f64>,
    left: Vec<NodeId>,
    right: Vec<NodeId>,
    is_leaf: Vec<bool>,
    /// `[n_nodes * n_outputs]`, meaningful for leaves only.
    leaf_values: Vec<f64>,
    n_outputs: usize,
}

impl Tree {
    pub(crate) fn with_outputs(n_outputs: usize) -> Self {
        Self {
            split_feature: Vec::new(),
            threshold: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            is_leaf: Vec::new(),
            leaf_values: Vec::new(),
            n_outputs,
        }
    }

    /// Append a placeholder node and return its id.
    pub(crate) fn push_node(&mut self) -> NodeId {
        let id = self.is_leaf.len() as NodeId;
        self.split_feature.push(0);
        self.threshold.push(0.0);
        self.left.push(0);
        self.right.push(0);
        self.is_leaf.push(true);
        self.leaf_values
            .extend(std::iter::repeat_n(0.0, self.n_outputs));
        id
    }

    pub(crate) fn set_leaf(&mut self, node: NodeId, values: &[f64]) {
        debug_assert_eq!(values.len(), self.n_outputs);
        let n = node as usize;
        self.is_leaf[n] = true;
        let start = n * self.n_outputs;
        self.leaf_values[start..start + self.n_outputs].copy_from_slice(values);
    }

    pub(crate) fn set_split(
        &mut self,
        node: NodeId,
        feature: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    ) {
        let n = node as usize;
        self.is_leaf[n] = false;
        self.split_feature[n] = feature as u32;
        self.threshold[n] = threshold;
        self.left[n] = left;
        self.right[n] = right;
    }

    pub fn n_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    pub fn n_outputs(&self) -> usize {
        self.n_outputs
    }

    /// Leaf reached by `row`.
    #[inline]
    pub fn traverse_to_leaf(&self, row: ArrayView1<'_, f64>) -> NodeId {
        let mut node = 0usize;
        while !self.is_leaf[node] {
            let value = row[self.split_feature[node] as usize];
            node = if value < self.threshold[node] {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        node as NodeId
    }

    /// Leaf values of a leaf node.
    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> &[f64] {
        let start = node as usize * self.n_outputs;
        &self.leaf_values[start..start + self.n_outputs]
    }

    /// Add `scale × leaf(row)` into `out`.
    #[inline]
    pub fn accumulate(&self, row: ArrayView1<'_, f64>, scale: f64, out: &mut [f64]) {
        let leaf = self.leaf_value(self.traverse_to_leaf(row));
        for (o, &v) in out.iter_mut().zip(leaf) {
            *o += scale * v;
        }
    }

    /// Feature indices used by any split.
    pub fn used_features(&self) -> Vec<usize> {
        let mut used: Vec<usize> = (0..self.n_nodes())
            .filter(|&n| !self.is_leaf[n])
            .map(|n| self.split_feature[n] as usize)
            .collect();
        used.sort_unstable();
        used.dedup();
        used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn stump() -> Tree {
        let mut tree = Tree::with_outputs(2);
        let root = tree.push_node();
        let left = tree.push_node();
        let right = tree.push_node();
        tree.set_split(root, 1, 0.5, left, right);
        tree.set_leaf(left, &[1.0, 0.0]);
        tree.set_leaf(right, &[0.0, 1.0]);
        tree
    }

    #[test]
    fn traverse_uses_strict_less_than() {
        let tree = stump();
        assert_eq!(tree.traverse_to_leaf(array![9.0, 0.4].view()), 1);
        assert_eq!(tree.traverse_to_leaf(array![9.0, 0.5].view()), 2);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.used_features(), vec![1]);
    }

    #[test]
    fn accumulate_scales_leaf() {
        let tree = stump();
        let mut out = [1.0, 1.0];
        tree.accumulate(array![0.0, 1.0].view(), 0.5, &mut out);
        assert_eq!(out, [1.0, 1.5]);
    }
}
