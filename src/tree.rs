//! Step tree operations
//!
//! A test case's `recordedSteps` is an ordered array of steps and conditional
//! blocks; every block owns two more such arrays. Searches are explicit
//! recursive functions that report what they found through their return
//! value. The place where new steps go is computed as an [`InsertionPoint`]
//! (a path of block indices) and resolved against the tree afterwards.

use crate::error::{RecorderError, Result};
use crate::step::{Branch, Step, StepId, StepNode};
use serde_json::{Map, Value};

/// Recording flags that decide where new steps land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingCursor {
    pub in_conditional_block: bool,
    pub context: Branch,
}

/// Path from the root array to the array new steps are appended to.
///
/// Each hop is `(index of a conditional block, branch to descend into)`.
/// An empty path is the root array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionPoint {
    pub hops: Vec<(usize, Branch)>,
}

impl InsertionPoint {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.hops.is_empty()
    }
}

/// Locate the array that new steps must be appended to.
///
/// Outside a conditional block this is the root. Inside one it is the
/// then/else branch (by `cursor.context`) of the innermost unfinalized block,
/// found by scanning siblings last-first and descending into else before then.
pub fn locate_insertion_point(steps: &[StepNode], cursor: RecordingCursor) -> InsertionPoint {
    if !cursor.in_conditional_block {
        return InsertionPoint::root();
    }
    match open_block_path(steps) {
        Some(mut hops) => {
            if let Some(last) = hops.last_mut() {
                last.1 = cursor.context;
            }
            InsertionPoint { hops }
        }
        None => {
            log::warn!("Recording inside a conditional block but no open block found, using root");
            InsertionPoint::root()
        }
    }
}

/// Hops to the innermost open block; the branch of the final hop is a placeholder
fn open_block_path(steps: &[StepNode]) -> Option<Vec<(usize, Branch)>> {
    for (index, node) in steps.iter().enumerate().rev() {
        let StepNode::Conditional(block) = node else {
            continue;
        };
        if block.is_finalized {
            continue;
        }
        for branch in [Branch::Else, Branch::Then] {
            if let Some(inner) = open_block_path(block.branch(branch)) {
                let mut hops = Vec::with_capacity(inner.len() + 1);
                hops.push((index, branch));
                hops.extend(inner);
                return Some(hops);
            }
        }
        return Some(vec![(index, Branch::Then)]);
    }
    None
}

/// Resolve an insertion point for reading
pub fn branch<'a>(steps: &'a [StepNode], point: &InsertionPoint) -> Option<&'a [StepNode]> {
    point
        .hops
        .iter()
        .try_fold(steps, |current, &(index, branch)| match current.get(index) {
            Some(StepNode::Conditional(block)) => Some(block.branch(branch).as_slice()),
            _ => None,
        })
}

/// Resolve an insertion point for mutation
pub fn branch_mut<'a>(
    steps: &'a mut Vec<StepNode>,
    point: &InsertionPoint,
) -> Option<&'a mut Vec<StepNode>> {
    point
        .hops
        .iter()
        .try_fold(steps, |current, &(index, branch)| match current.get_mut(index) {
            Some(StepNode::Conditional(block)) => Some(block.branch_mut(branch)),
            _ => None,
        })
}

/// Append nodes at the insertion point, falling back to the root if the
/// point no longer resolves
pub fn append<I>(steps: &mut Vec<StepNode>, point: &InsertionPoint, nodes: I)
where
    I: IntoIterator<Item = StepNode>,
{
    match branch_mut(steps, point) {
        Some(target) => target.extend(nodes),
        None => steps.extend(nodes),
    }
}

/// Pre-order search (then before else); conditions are not searched
pub fn find_by_id(steps: &[StepNode], id: StepId) -> Option<&StepNode> {
    for node in steps {
        if node.id() == id {
            return Some(node);
        }
        if let StepNode::Conditional(block) = node {
            if let Some(found) = find_by_id(&block.then_steps, id) {
                return Some(found);
            }
            if let Some(found) = find_by_id(&block.else_steps, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Mutable lookup of a leaf step at any nesting level
pub fn find_step_mut(steps: &mut [StepNode], id: StepId) -> Option<&mut Step> {
    for node in steps.iter_mut() {
        match node {
            StepNode::Step(step) if step.id == id => return Some(step),
            StepNode::Step(_) => {}
            StepNode::Conditional(block) => {
                if let Some(found) = find_step_mut(&mut block.then_steps, id) {
                    return Some(found);
                }
                if let Some(found) = find_step_mut(&mut block.else_steps, id) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Remove the first node with `id`: this level first, then each block's
/// then/else. Removing a block removes its whole sub-tree.
pub fn delete_by_id(steps: &mut Vec<StepNode>, id: StepId) -> bool {
    if let Some(position) = steps.iter().position(|node| node.id() == id) {
        steps.remove(position);
        return true;
    }
    steps.iter_mut().any(|node| match node {
        StepNode::Conditional(block) => {
            delete_by_id(&mut block.then_steps, id) || delete_by_id(&mut block.else_steps, id)
        }
        StepNode::Step(_) => false,
    })
}

/// Shallow-merge `patch` onto the step with `id`.
///
/// This level is searched first, then each block's then/else. Returns whether
/// a step was updated. Derived fields (`code`) are not touched here.
pub fn update_by_id(steps: &mut Vec<StepNode>, id: StepId, patch: &Map<String, Value>) -> Result<bool> {
    let position = steps
        .iter()
        .position(|node| matches!(node, StepNode::Step(step) if step.id == id));
    if let Some(position) = position {
        if let StepNode::Step(step) = &mut steps[position] {
            *step = merge_patch(step, patch)?;
        }
        return Ok(true);
    }
    for node in steps.iter_mut() {
        if let StepNode::Conditional(block) = node {
            if update_by_id(&mut block.then_steps, id, patch)?
                || update_by_id(&mut block.else_steps, id, patch)?
            {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn merge_patch(step: &Step, patch: &Map<String, Value>) -> Result<Step> {
    let mut value = serde_json::to_value(step)?;
    if let Value::Object(fields) = &mut value {
        for (key, patched) in patch {
            if key != "id" {
                fields.insert(key.clone(), patched.clone());
            }
        }
    }
    let mut merged: Step =
        serde_json::from_value(value).map_err(|e| RecorderError::InvalidPatch(e.to_string()))?;

    if merged.is_parameterized() {
        merged.data.value = None;
        merged.action.clear_literal_expectations();
    } else if merged.action.is_input() {
        match patch.get("value") {
            Some(Value::String(text)) => merged.data.value = Some(text.clone()),
            Some(Value::Null) | None => {}
            Some(other) => merged.data.value = Some(other.to_string()),
        }
    }
    Ok(merged)
}

/// Rebuild the top level in the given order.
///
/// Unknown ids are skipped, ids left out are dropped, a repeated id only
/// takes the node once. Nested arrays are not reordered.
pub fn reorder_top_level(steps: &mut Vec<StepNode>, order: &[StepId]) {
    let mut pool: Vec<Option<StepNode>> = std::mem::take(steps).into_iter().map(Some).collect();
    for id in order {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|node| node.id() == *id));
        match slot.and_then(Option::take) {
            Some(node) => steps.push(node),
            None => log::debug!("Reorder skipped unknown step id {}", id),
        }
    }
}

/// Finalize the innermost (deepest, most recent) open block
pub fn finalize_innermost_open_block(steps: &mut [StepNode]) -> bool {
    for node in steps.iter_mut().rev() {
        let StepNode::Conditional(block) = node else {
            continue;
        };
        if block.is_finalized {
            continue;
        }
        if finalize_innermost_open_block(&mut block.else_steps)
            || finalize_innermost_open_block(&mut block.then_steps)
        {
            return true;
        }
        block.is_finalized = true;
        return true;
    }
    false
}

/// Finalize every open block; returns how many were closed
pub fn finalize_all_open_blocks(steps: &mut [StepNode]) -> usize {
    let mut closed = 0;
    while finalize_innermost_open_block(steps) {
        closed += 1;
    }
    closed
}

/// Whether any block, at any depth, is still open
pub fn has_open_blocks(steps: &[StepNode]) -> bool {
    steps.iter().any(|node| match node {
        StepNode::Conditional(block) => {
            !block.is_finalized
                || has_open_blocks(&block.then_steps)
                || has_open_blocks(&block.else_steps)
        }
        StepNode::Step(_) => false,
    })
}

/// Visit every leaf step, including block conditions
pub fn for_each_step_mut<F>(steps: &mut [StepNode], f: &mut F)
where
    F: FnMut(&mut Step),
{
    for node in steps.iter_mut() {
        match node {
            StepNode::Step(step) => f(step),
            StepNode::Conditional(block) => {
                f(&mut block.condition);
                for_each_step_mut(&mut block.then_steps, f);
                for_each_step_mut(&mut block.else_steps, f);
            }
        }
    }
}

/// Last `input` step of `steps` (this level only) typed into the element at `xpath`
pub fn last_input_for(steps: &[StepNode], xpath: &str) -> Option<StepId> {
    steps.iter().rev().find_map(|node| match node {
        StepNode::Step(step) if step.action.is_input() && step.data.full_xpath() == Some(xpath) => {
            Some(step.id)
        }
        _ => None,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::step::StepAction;
    use serde_json::json;

    fn inside(context: Branch) -> RecordingCursor {
        RecordingCursor {
            in_conditional_block: true,
            context,
        }
    }

    fn ids(steps: &[StepNode]) -> Vec<f64> {
        steps.iter().map(|node| node.id().0).collect()
    }

    #[test]
    fn test_insertion_point_outside_block_is_root() {
        let steps = vec![click(1.0), block(2.0, vec![], vec![], false)];
        let cursor = RecordingCursor {
            in_conditional_block: false,
            context: Branch::Then,
        };
        assert!(locate_insertion_point(&steps, cursor).is_root());
    }

    #[test]
    fn test_insertion_point_prefers_innermost_open_block() {
        // outer open block whose else branch holds an open inner block
        let inner = block(20.0, vec![click(21.0)], vec![], false);
        let mut steps = vec![
            click(1.0),
            block(10.0, vec![click(11.0)], vec![inner], false),
        ];

        let point = locate_insertion_point(&steps, inside(Branch::Then));
        assert_eq!(point.hops, vec![(1, Branch::Else), (0, Branch::Then)]);

        append(&mut steps, &point, [click(22.0)]);
        let StepNode::Conditional(outer) = &steps[1] else { panic!("expected block") };
        let StepNode::Conditional(inner) = &outer.else_steps[0] else { panic!("expected block") };
        assert_eq!(ids(&inner.then_steps), vec![21.0, 22.0]);
    }

    #[test]
    fn test_insertion_point_skips_finalized_blocks() {
        let steps = vec![
            block(10.0, vec![], vec![], false),
            block(20.0, vec![], vec![], true),
        ];
        let point = locate_insertion_point(&steps, inside(Branch::Else));
        assert_eq!(point.hops, vec![(0, Branch::Else)]);
    }

    #[test]
    fn test_insertion_point_falls_back_to_root() {
        let mut steps = vec![block(10.0, vec![], vec![], true)];
        let point = locate_insertion_point(&steps, inside(Branch::Then));
        assert!(point.is_root());
        append(&mut steps, &point, [click(2.0)]);
        assert_eq!(ids(&steps), vec![10.0, 2.0]);
    }

    #[test]
    fn test_stale_point_appends_to_root() {
        let mut steps = vec![click(1.0)];
        let point = InsertionPoint {
            hops: vec![(0, Branch::Then)],
        };
        assert!(branch(&steps, &point).is_none());
        append(&mut steps, &point, [click(2.0)]);
        assert_eq!(ids(&steps), vec![1.0, 2.0]);
    }

    #[test]
    fn test_find_by_id_searches_then_before_else() {
        let steps = vec![block(
            10.0,
            vec![block(11.0, vec![click(12.0)], vec![], true)],
            vec![click(13.0)],
            true,
        )];
        assert_eq!(find_by_id(&steps, StepId(12.0)).map(StepNode::id), Some(StepId(12.0)));
        assert_eq!(find_by_id(&steps, StepId(13.0)).map(StepNode::id), Some(StepId(13.0)));
        assert!(find_by_id(&steps, StepId(11.0)).and_then(StepNode::as_block).is_some());
        // conditions are not searched
        assert!(find_by_id(&steps, StepId(10.5)).is_none());
    }

    #[test]
    fn test_delete_by_id_nested_and_missing() {
        let mut steps = vec![
            click(1.0),
            block(10.0, vec![click(11.0)], vec![click(12.0)], true),
        ];
        assert!(delete_by_id(&mut steps, StepId(12.0)));
        assert!(!delete_by_id(&mut steps, StepId(99.0)));
        let StepNode::Conditional(b) = &steps[1] else { panic!("expected block") };
        assert!(b.else_steps.is_empty());
        assert_eq!(ids(&b.then_steps), vec![11.0]);

        assert!(delete_by_id(&mut steps, StepId(10.0)));
        assert_eq!(ids(&steps), vec![1.0]);
    }

    #[test]
    fn test_update_variable_supersedes_literal() {
        let mut assertion = step(
            3.0,
            StepAction::from_parts(
                "assert",
                Some("assertTextEquals"),
                &crate::step::ElementDescriptor {
                    text: Some("Hello".to_string()),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        assertion.data.value = Some("old".to_string());
        let mut steps = vec![block(10.0, vec![], vec![StepNode::Step(assertion)], true)];

        let patch = json!({"id": 999.0, "variableForValue": "GREETING"});
        let updated = update_by_id(&mut steps, StepId(3.0), patch.as_object().unwrap()).unwrap();
        assert!(updated);

        let Some(StepNode::Step(step)) = find_by_id(&steps, StepId(3.0)) else {
            panic!("step should keep its id")
        };
        assert_eq!(step.variable_for_value.as_deref(), Some("GREETING"));
        assert_eq!(step.data.value, None);
        assert_eq!(step.action.expected_text(), None);
    }

    #[test]
    fn test_update_input_value() {
        let mut steps = vec![StepNode::Step(step(1.0, StepAction::Input))];
        let patch = json!({"value": "secret", "allureStep": "Type password"});
        assert!(update_by_id(&mut steps, StepId(1.0), patch.as_object().unwrap()).unwrap());
        let step = steps[0].as_step().unwrap();
        assert_eq!(step.data.value.as_deref(), Some("secret"));
        assert_eq!(step.allure_step, "Type password");

        let null_patch = json!({"value": null});
        update_by_id(&mut steps, StepId(1.0), null_patch.as_object().unwrap()).unwrap();
        assert_eq!(steps[0].as_step().unwrap().data.value.as_deref(), Some("secret"));
    }

    #[test]
    fn test_update_rejects_malformed_patch() {
        let mut steps = vec![click(1.0)];
        let patch = json!({"locators": "not-a-list"});
        assert!(matches!(
            update_by_id(&mut steps, StepId(1.0), patch.as_object().unwrap()),
            Err(RecorderError::InvalidPatch(_))
        ));
        assert_eq!(steps[0].as_step().unwrap().locators, Vec::<String>::new());
    }

    #[test]
    fn test_reorder_top_level() {
        let mut steps = vec![
            click(1.0),
            click(2.0),
            block(3.0, vec![click(4.0), click(5.0)], vec![], true),
        ];
        reorder_top_level(
            &mut steps,
            &[StepId(3.0), StepId(42.0), StepId(1.0), StepId(1.0)],
        );
        assert_eq!(ids(&steps), vec![3.0, 1.0]);
        let StepNode::Conditional(b) = &steps[0] else { panic!("expected block") };
        assert_eq!(ids(&b.then_steps), vec![4.0, 5.0]);
    }

    #[test]
    fn test_finalize_innermost_first() {
        let mut steps = vec![block(
            10.0,
            vec![block(20.0, vec![], vec![], false)],
            vec![],
            false,
        )];
        assert!(has_open_blocks(&steps));

        assert!(finalize_innermost_open_block(&mut steps));
        let StepNode::Conditional(outer) = &steps[0] else { panic!("expected block") };
        assert!(!outer.is_finalized);
        assert!(outer.then_steps[0].as_block().unwrap().is_finalized);
        assert!(has_open_blocks(&steps));

        assert!(finalize_innermost_open_block(&mut steps));
        assert!(!has_open_blocks(&steps));
        assert!(!finalize_innermost_open_block(&mut steps));
    }

    #[test]
    fn test_last_input_for_matches_xpath_on_this_level() {
        let mut first = step(1.0, StepAction::Input);
        first.data.selectors = Some(crate::step::Selectors {
            full_xpath: Some("./form/input[1]".to_string()),
            ..Default::default()
        });
        let mut second = first.clone();
        second.id = StepId(2.0);
        let steps = vec![StepNode::Step(first), click(3.0), StepNode::Step(second)];

        assert_eq!(last_input_for(&steps, "./form/input[1]"), Some(StepId(2.0)));
        assert_eq!(last_input_for(&steps, "./form/input[2]"), None);
    }

    #[test]
    fn test_for_each_step_mut_visits_conditions() {
        let mut steps = vec![click(1.0), block(10.0, vec![click(11.0)], vec![click(12.0)], true)];
        let mut seen = Vec::new();
        for_each_step_mut(&mut steps, &mut |step: &mut Step| seen.push(step.id.0));
        assert_eq!(seen, vec![1.0, 10.5, 11.0, 12.0]);
    }
}
